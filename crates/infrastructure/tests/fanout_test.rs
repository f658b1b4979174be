mod helpers;

use fanout_dns_domain::{FanoutConfig, FanoutError, PolicyKind};
use fanout_dns_infrastructure::dns::{DnsHandler, Fanout, ResponseWriter, TapEmitter, TapKind};
use helpers::{
    question, reply_a, reply_nxdomain, reply_with, CachedWriter, ConcurrencyGauge, MockUpstream,
};
use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TEST_QUERY: &str = "example1.";

fn config_for(addrs: &[&str]) -> FanoutConfig {
    FanoutConfig::new(".", addrs.iter().map(|s| s.to_string()).collect())
}

#[tokio::test(flavor = "multi_thread")]
async fn prefers_noerror_over_other_rcodes_udp() {
    const BAD_RCODES: [ResponseCode; 5] = [
        ResponseCode::FormErr,
        ResponseCode::ServFail,
        ResponseCode::NXDomain,
        ResponseCode::NotImp,
        ResponseCode::Refused,
    ];
    let cycling = Arc::new(AtomicUsize::new(0));
    let negative = MockUpstream::udp(move |req| {
        // cycle through non-success rcodes, like a misbehaving upstream
        let i = cycling.fetch_add(1, Ordering::SeqCst);
        Some(reply_with(req, BAD_RCODES[i % BAD_RCODES.len()]))
    })
    .await;
    let positive = MockUpstream::udp(|req| {
        Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))
    })
    .await;

    let fanout = Fanout::new(config_for(&[negative.addr(), positive.addr()])).unwrap();
    let mut writer = CachedWriter::default();
    for _ in 0..10 {
        let req = question(TEST_QUERY);
        let rcode = fanout.serve_dns(&mut writer, &req).await.unwrap();
        assert_eq!(rcode, ResponseCode::NoError);
    }
    assert_eq!(writer.answers.len(), 10);
    for reply in &writer.answers {
        assert_eq!(reply.response_code(), ResponseCode::NoError);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn prefers_noerror_over_other_rcodes_tcp() {
    let negative = MockUpstream::tcp(|req| Some(reply_nxdomain(req))).await;
    let positive =
        MockUpstream::tcp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))).await;

    let to = [
        format!("tcp://{}", negative.addr()),
        format!("tcp://{}", positive.addr()),
    ];
    let fanout = Fanout::new(FanoutConfig::new(".", to.to_vec())).unwrap();
    let mut writer = CachedWriter::default();
    for _ in 0..10 {
        let req = question(TEST_QUERY);
        fanout.serve_dns(&mut writer, &req).await.unwrap();
    }
    for reply in &writer.answers {
        assert_eq!(reply.response_code(), ResponseCode::NoError);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn returns_negative_answer_when_upstreams_agree() {
    let upstream = MockUpstream::udp(|req| Some(reply_nxdomain(req))).await;

    let fanout = Fanout::new(config_for(&[upstream.addr()])).unwrap();
    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    let rcode = fanout.serve_dns(&mut writer, &req).await.unwrap();

    assert_eq!(rcode, ResponseCode::NoError);
    assert_eq!(writer.answers.len(), 1);
    assert_eq!(writer.answers[0].response_code(), ResponseCode::NXDomain);
    assert_eq!(writer.answers[0].id(), req.id());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_consults_all_upstreams() {
    let mut silent = Vec::new();
    for _ in 0..4 {
        silent.push(MockUpstream::udp(|_| None).await);
    }
    let answers = Arc::new(AtomicUsize::new(0));
    let answers_seen = Arc::clone(&answers);
    let positive = MockUpstream::udp(move |req| {
        answers_seen.fetch_add(1, Ordering::SeqCst);
        Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))
    })
    .await;

    let mut addrs: Vec<&str> = silent.iter().map(|s| s.addr()).collect();
    addrs.push(positive.addr());
    let mut cfg = config_for(&addrs);
    cfg.attempts = 1;
    let fanout = Fanout::new(cfg).unwrap().with_worker_count(1);

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    let rcode = fanout.serve_dns(&mut writer, &req).await.unwrap();

    assert_eq!(rcode, ResponseCode::NoError);
    assert_eq!(writer.answers.len(), 1);
    assert_eq!(writer.answers[0].response_code(), ResponseCode::NoError);
    assert_eq!(writer.answers[0].answers().len(), 1);
    assert_eq!(answers.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unbounded_attempts_outlast_a_busy_upstream() {
    let requests = Arc::new(AtomicUsize::new(0));
    let answered = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&requests);
    let counted = Arc::clone(&answered);
    let busy = MockUpstream::udp(move |req| {
        // drop every other query
        if seen.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
            return None;
        }
        counted.fetch_add(1, Ordering::SeqCst);
        Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))
    })
    .await;

    let mut cfg = config_for(&[busy.addr()]);
    cfg.attempts = 0;
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    for _ in 0..5 {
        let req = question(TEST_QUERY);
        let rcode = fanout.serve_dns(&mut writer, &req).await.unwrap();
        assert_eq!(rcode, ResponseCode::NoError);
    }
    assert_eq!(answered.load(Ordering::SeqCst), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn race_mode_takes_first_arrival() {
    let fast_negative = MockUpstream::udp(|req| Some(reply_nxdomain(req))).await;
    let slow_positive = MockUpstream::udp_delayed(Duration::from_millis(500), |req| {
        Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))
    })
    .await;

    let mut cfg = config_for(&[fast_negative.addr(), slow_positive.addr()]);
    cfg.race = true;
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    fanout.serve_dns(&mut writer, &req).await.unwrap();

    assert_eq!(writer.answers.len(), 1);
    assert_eq!(writer.answers[0].response_code(), ResponseCode::NXDomain);
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_exchanges_bounded_by_worker_count() {
    let gauge = ConcurrencyGauge::new();
    let mut upstreams = Vec::new();
    for _ in 0..4 {
        upstreams.push(
            MockUpstream::udp_gauged(Duration::from_millis(200), Arc::clone(&gauge), |req| {
                Some(reply_nxdomain(req))
            })
            .await,
        );
    }

    let addrs: Vec<&str> = upstreams.iter().map(|s| s.addr()).collect();
    let mut cfg = config_for(&addrs);
    cfg.worker_count = 2;
    cfg.attempts = 1;
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    fanout.serve_dns(&mut writer, &req).await.unwrap();

    assert!(
        gauge.max() <= 2,
        "saw {} concurrent exchanges with worker_count 2",
        gauge.max()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatched_reply_answers_formerr() {
    let confused = MockUpstream::udp(|req| {
        let other = question("other.example.");
        let mut reply = reply_a(&other, "other.example.", Ipv4Addr::new(10, 0, 0, 2));
        reply.set_id(req.id());
        Some(reply)
    })
    .await;

    let mut cfg = config_for(&[confused.addr()]);
    cfg.attempts = 1;
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    let rcode = fanout.serve_dns(&mut writer, &req).await.unwrap();

    assert_eq!(rcode, ResponseCode::NoError);
    assert_eq!(writer.answers.len(), 1);
    assert_eq!(writer.answers[0].response_code(), ResponseCode::FormErr);
    assert_eq!(writer.answers[0].id(), req.id());
    assert_eq!(writer.answers[0].queries(), req.queries());
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_with_no_response_is_an_error() {
    let silent = MockUpstream::udp(|_| None).await;

    // unbounded attempts: only the per-query deadline can end this
    let mut cfg = config_for(&[silent.addr()]);
    cfg.attempts = 0;
    cfg.timeout_ms = 300;
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    let err = fanout.serve_dns(&mut writer, &req).await.unwrap_err();
    assert!(matches!(err, FanoutError::DeadlineExceeded));
    assert!(writer.answers.is_empty());
}

struct RefusedHandler;

#[async_trait]
impl DnsHandler for RefusedHandler {
    async fn serve_dns(
        &self,
        writer: &mut dyn ResponseWriter,
        req: &Message,
    ) -> Result<ResponseCode, FanoutError> {
        let reply = reply_with(req, ResponseCode::Refused);
        writer.write_msg(&reply).await?;
        Ok(ResponseCode::NoError)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn queries_outside_zone_pass_to_next_handler() {
    let upstream =
        MockUpstream::udp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))).await;

    let mut cfg = config_for(&[upstream.addr()]);
    cfg.from = "example.com.".to_string();
    let fanout = Fanout::new(cfg).unwrap().with_next(Arc::new(RefusedHandler));

    let mut writer = CachedWriter::default();
    let req = question("other.org.");
    fanout.serve_dns(&mut writer, &req).await.unwrap();
    assert_eq!(writer.answers.len(), 1);
    assert_eq!(writer.answers[0].response_code(), ResponseCode::Refused);
}

#[tokio::test(flavor = "multi_thread")]
async fn excluded_names_pass_to_next_handler() {
    let upstream =
        MockUpstream::udp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))).await;

    let mut cfg = config_for(&[upstream.addr()]);
    cfg.except = vec!["internal.".to_string()];
    let fanout = Fanout::new(cfg).unwrap().with_next(Arc::new(RefusedHandler));

    let mut writer = CachedWriter::default();
    let req = question("host.internal.");
    fanout.serve_dns(&mut writer, &req).await.unwrap();
    assert_eq!(writer.answers[0].response_code(), ResponseCode::Refused);

    // in-zone queries still fan out
    let req = question(TEST_QUERY);
    fanout.serve_dns(&mut writer, &req).await.unwrap();
    assert_eq!(writer.answers[1].response_code(), ResponseCode::NoError);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_next_handler_is_an_error() {
    let upstream = MockUpstream::udp(|_| None).await;

    let mut cfg = config_for(&[upstream.addr()]);
    cfg.from = "example.com.".to_string();
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    let req = question("other.org.");
    let err = fanout.serve_dns(&mut writer, &req).await.unwrap_err();
    assert!(matches!(err, FanoutError::NoNextHandler));
}

#[tokio::test(flavor = "multi_thread")]
async fn weighted_policy_answers_within_server_count() {
    let mut upstreams = Vec::new();
    for _ in 0..3 {
        upstreams.push(
            MockUpstream::udp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1))))
                .await,
        );
    }

    let addrs: Vec<&str> = upstreams.iter().map(|s| s.addr()).collect();
    let mut cfg = config_for(&addrs);
    cfg.policy = PolicyKind::WeightedRandom;
    cfg.server_count = 2;
    cfg.load_factor = vec![100, 50, 10];
    let fanout = Fanout::new(cfg).unwrap();

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    let rcode = fanout.serve_dns(&mut writer, &req).await.unwrap();
    assert_eq!(rcode, ResponseCode::NoError);
    assert_eq!(writer.answers[0].response_code(), ResponseCode::NoError);
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_track_completed_exchanges() {
    let upstream =
        MockUpstream::udp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))).await;
    let addr = upstream.addr().to_string();

    let fanout = Fanout::new(config_for(&[upstream.addr()])).unwrap();
    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    fanout.serve_dns(&mut writer, &req).await.unwrap();

    let metrics = fanout.metrics();
    assert_eq!(metrics.request_count(&addr), 1);
    assert_eq!(metrics.rcode_count("NOERROR", &addr), 1);
    assert_eq!(metrics.duration_count(&addr), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn tap_fires_for_the_winning_upstream() {
    let upstream =
        MockUpstream::udp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))).await;
    let addr = upstream.addr().to_string();

    let (tap, mut events) = TapEmitter::new_enabled(true);
    let fanout = Fanout::new(config_for(&[upstream.addr()]))
        .unwrap()
        .with_tap(tap);

    let mut writer = CachedWriter::default();
    let req = question(TEST_QUERY);
    fanout.serve_dns(&mut writer, &req).await.unwrap();

    let query_event = events.recv().await.unwrap();
    assert_eq!(query_event.kind, TapKind::ForwarderQuery);
    assert_eq!(query_event.upstream.as_ref(), addr);
    assert!(query_event.raw_message.is_some());

    let response_event = events.recv().await.unwrap();
    assert_eq!(response_event.kind, TapKind::ForwarderResponse);
    assert!(response_event.response_time.is_some());
    let raw = response_event.raw_message.unwrap();
    let replayed = Message::from_vec(&raw).unwrap();
    assert_eq!(replayed.id(), req.id());
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_queries_yield_identical_choices() {
    let negative = MockUpstream::udp(|req| Some(reply_nxdomain(req))).await;
    let positive =
        MockUpstream::udp(|req| Some(reply_a(req, TEST_QUERY, Ipv4Addr::new(10, 0, 0, 1)))).await;

    let fanout = Fanout::new(config_for(&[negative.addr(), positive.addr()])).unwrap();
    let mut writer = CachedWriter::default();
    for _ in 0..5 {
        let req = question(TEST_QUERY);
        fanout.serve_dns(&mut writer, &req).await.unwrap();
    }
    for reply in &writer.answers {
        assert_eq!(reply.response_code(), ResponseCode::NoError);
        assert_eq!(reply.answers().len(), 1);
    }
}
