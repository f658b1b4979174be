use crate::dns::message;
use compact_str::CompactString;
use dashmap::DashMap;
use hickory_proto::op::ResponseCode;
use rustc_hash::FxBuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bounds of the request duration histogram, in seconds.
const DURATION_BUCKETS: [f64; 16] = [
    0.00025, 0.0005, 0.001, 0.002, 0.004, 0.008, 0.016, 0.032, 0.064, 0.128, 0.256, 0.512, 1.024,
    2.048, 4.096, 8.192,
];

/// Fixed-bucket latency histogram. Safe for concurrent observation.
#[derive(Default)]
pub struct DurationHistogram {
    count: AtomicU64,
    sum_us: AtomicU64,
    buckets: [AtomicU64; DURATION_BUCKETS.len()],
}

impl DurationHistogram {
    fn observe(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        let seconds = elapsed.as_secs_f64();
        for (i, &bound) in DURATION_BUCKETS.iter().enumerate() {
            if seconds <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_seconds(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0 / count as f64
    }
}

/// Process-wide per-upstream exchange counters.
///
/// Updated once per completed exchange by the client; never blocks a
/// worker. Shared by `Arc` between the engine and its clients so tests
/// stay isolated from each other.
#[derive(Default)]
pub struct FanoutMetrics {
    request_count: DashMap<Arc<str>, AtomicU64, FxBuildHasher>,
    rcode_count: DashMap<(CompactString, Arc<str>), AtomicU64, FxBuildHasher>,
    request_duration: DashMap<Arc<str>, DurationHistogram, FxBuildHasher>,
}

impl FanoutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed exchange with the upstream at `to`.
    pub fn observe_exchange(&self, to: &Arc<str>, rcode: ResponseCode, elapsed: Duration) {
        self.request_count
            .entry(Arc::clone(to))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        self.rcode_count
            .entry((message::rcode_text(rcode), Arc::clone(to)))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        self.request_duration
            .entry(Arc::clone(to))
            .or_default()
            .observe(elapsed);
    }

    /// Completed exchanges against `to`.
    pub fn request_count(&self, to: &str) -> u64 {
        self.request_count
            .get(to)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Completed exchanges against `to` that returned `rcode`.
    pub fn rcode_count(&self, rcode: &str, to: &str) -> u64 {
        let key = (CompactString::new(rcode), Arc::<str>::from(to));
        self.rcode_count
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Observations recorded for `to`.
    pub fn duration_count(&self, to: &str) -> u64 {
        self.request_duration
            .get(to)
            .map(|h| h.count())
            .unwrap_or(0)
    }

    /// Mean exchange latency for `to`, in seconds.
    pub fn mean_duration_seconds(&self, to: &str) -> f64 {
        self.request_duration
            .get(to)
            .map(|h| h.mean_seconds())
            .unwrap_or(0.0)
    }
}
