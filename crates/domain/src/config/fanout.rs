use super::errors::ConfigError;
use super::upstream::{resolve_endpoints, Protocol, UpstreamEndpoint};
use crate::domain_set::DomainSet;
use crate::name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const MAX_UPSTREAM_COUNT: usize = 100;
pub const MIN_WORKER_COUNT: usize = 2;
pub const MAX_WORKER_COUNT: usize = 32;
pub const MIN_LOAD_FACTOR: u32 = 1;
pub const MAX_LOAD_FACTOR: u32 = 100;

/// Upstream selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    Sequential,
    WeightedRandom,
}

/// TLS materials for `tcp-tls` upstreams. With no `ca` set, the system
/// webpki roots are used. `cert`/`key` enable client authentication and
/// must be given together. `server_name` overrides SNI (otherwise the
/// endpoint host is used).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub ca: Option<PathBuf>,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub server_name: Option<String>,
}

/// The fan-out record: which zone activates fan-out, the upstream set, and
/// the dispatch knobs. Built once at startup and read-only afterwards;
/// `validate()` normalizes names and fills derived defaults in place.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FanoutConfig {
    /// Zone suffix that activates fan-out.
    pub from: String,

    /// Upstream endpoints: `host[:port]`, `network://host[:port]`, or a
    /// resolv.conf-style file.
    pub to: Vec<String>,

    /// Default transport for endpoints without an explicit scheme.
    #[serde(default)]
    pub network: Protocol,

    #[serde(default)]
    pub tls: Option<TlsSettings>,

    /// Concurrent in-flight upstream requests per query. 0 means one per
    /// upstream; explicit values must lie in [2, 32] and are capped to the
    /// upstream count.
    #[serde(default)]
    pub worker_count: usize,

    #[serde(default)]
    pub policy: PolicyKind,

    /// Upstreams consulted per query. 0 means all of them.
    #[serde(default)]
    pub server_count: usize,

    /// Per-upstream weights for the weighted-random policy, each in
    /// [1, 100]. Empty means equal weights.
    #[serde(default)]
    pub load_factor: Vec<u32>,

    /// Per-query wall-clock budget.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// First returned response wins regardless of rcode.
    #[serde(default)]
    pub race: bool,

    /// Per-upstream retry cap; 0 retries until the query deadline.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Name patterns excluded from fan-out.
    #[serde(default)]
    pub except: Vec<String>,

    /// File with one excluded name pattern per line.
    #[serde(default)]
    pub except_file: Option<PathBuf>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_attempts() -> u32 {
    3
}

impl FanoutConfig {
    /// Minimal record for the given zone and endpoints; everything else at
    /// its default.
    pub fn new(from: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            from: from.into(),
            to,
            network: Protocol::default(),
            tls: None,
            worker_count: 0,
            policy: PolicyKind::default(),
            server_count: 0,
            load_factor: Vec::new(),
            timeout_ms: default_timeout_ms(),
            race: false,
            attempts: default_attempts(),
            except: Vec::new(),
            except_file: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Expands `to` into dialable endpoints.
    pub fn endpoints(&self) -> Result<Vec<UpstreamEndpoint>, ConfigError> {
        resolve_endpoints(&self.to, self.network)
    }

    /// Builds the exclusion trie from `except` entries and `except_file`.
    /// Entries must already be normalized by `validate()`; file lines are
    /// normalized here.
    pub fn excluded(&self) -> Result<DomainSet, ConfigError> {
        let mut set = DomainSet::new();
        for entry in &self.except {
            set.add(entry);
        }
        if let Some(path) = &self.except_file {
            let contents =
                std::fs::read_to_string(path).map_err(|err| ConfigError::ExceptFile {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let normalized = name::normalize(line)
                    .ok_or_else(|| ConfigError::InvalidName(line.to_string()))?;
                set.add(&normalized);
            }
        }
        Ok(set)
    }

    /// Normalizes names, checks bounds, and fills derived defaults. Must be
    /// called once before the record is handed to the engine.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.from = name::normalize(&self.from)
            .ok_or_else(|| ConfigError::InvalidName(self.from.clone()))?;

        for entry in &mut self.except {
            *entry =
                name::normalize(entry).ok_or_else(|| ConfigError::InvalidName(entry.clone()))?;
        }

        if self.worker_count != 0 {
            if self.worker_count < MIN_WORKER_COUNT {
                return Err(ConfigError::WorkerCountTooSmall);
            }
            if self.worker_count > MAX_WORKER_COUNT {
                return Err(ConfigError::WorkerCountTooLarge(MAX_WORKER_COUNT));
            }
        }

        if self.to.is_empty() {
            return Err(ConfigError::NoUpstreams);
        }
        let endpoints = self.endpoints()?;
        let count = endpoints.len();
        if count == 0 {
            return Err(ConfigError::NoUpstreams);
        }
        if count > MAX_UPSTREAM_COUNT {
            return Err(ConfigError::TooManyUpstreams {
                max: MAX_UPSTREAM_COUNT,
                count,
            });
        }

        if self.worker_count == 0 || self.worker_count > count {
            self.worker_count = count;
        }
        if self.server_count == 0 || self.server_count > count {
            self.server_count = count;
        }

        if self.load_factor.is_empty() {
            self.load_factor = vec![MAX_LOAD_FACTOR; count];
        }
        for &weight in &self.load_factor {
            if weight < MIN_LOAD_FACTOR {
                return Err(ConfigError::LoadFactorTooSmall);
            }
            if weight > MAX_LOAD_FACTOR {
                return Err(ConfigError::LoadFactorTooLarge(weight, MAX_LOAD_FACTOR));
            }
        }
        if self.load_factor.len() != count {
            return Err(ConfigError::LoadFactorCountMismatch);
        }

        if self.timeout_ms == 0 {
            self.timeout_ms = default_timeout_ms();
        }

        Ok(())
    }
}
