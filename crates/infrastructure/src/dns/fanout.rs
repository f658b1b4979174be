use crate::dns::client::Client;
use crate::dns::events::{TapEmitter, TapEvent, TapKind};
use crate::dns::handler::{DnsHandler, ResponseWriter};
use crate::dns::message;
use crate::dns::metrics::FanoutMetrics;
use crate::dns::policy::SelectionPolicy;
use crate::dns::response::{is_better, UpstreamResponse};
use crate::dns::transport::tls;
use crate::dns::ATTEMPT_DELAY;
use async_trait::async_trait;
use bytes::Bytes;
use fanout_dns_domain::{name, ConfigError, DomainSet, FanoutConfig, FanoutError, Protocol};
use hickory_proto::op::{Message, ResponseCode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Span};

/// The fan-out engine: races one query against the configured upstream set
/// and answers with the best response under the per-query deadline.
pub struct Fanout {
    from: String,
    excluded: DomainSet,
    clients: Vec<Arc<Client>>,
    policy: SelectionPolicy,
    worker_count: usize,
    server_count: usize,
    race: bool,
    attempts: u32,
    timeout: Duration,
    metrics: Arc<FanoutMetrics>,
    tap: TapEmitter,
    next: Option<Arc<dyn DnsHandler>>,
}

impl Fanout {
    /// Builds the engine from a configuration record. The record is
    /// normalized here, so callers may pass it unvalidated.
    pub fn new(mut config: FanoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let excluded = config.excluded()?;
        let endpoints = config.endpoints()?;
        let metrics = Arc::new(FanoutMetrics::new());

        let tls_settings = config.tls.clone().unwrap_or_default();
        let wants_tls = config.network == Protocol::TcpTls
            || endpoints.iter().any(|e| e.protocol == Protocol::TcpTls);
        let tls_config = if wants_tls {
            Some(tls::build_client_config(&tls_settings)?)
        } else {
            None
        };

        let mut clients = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let mut client = Client::new(&endpoint.addr, endpoint.protocol, Arc::clone(&metrics));
            if endpoint.protocol == Protocol::TcpTls {
                if let Some(tls_config) = &tls_config {
                    client.set_tls(tls::params_for_endpoint(
                        tls_config,
                        &tls_settings,
                        &endpoint.addr,
                    )?);
                }
            }
            clients.push(Arc::new(client));
        }

        Ok(Self {
            from: config.from.clone(),
            excluded,
            policy: SelectionPolicy::from_config(&config),
            worker_count: config.worker_count,
            server_count: config.server_count,
            race: config.race,
            attempts: config.attempts,
            timeout: config.timeout(),
            clients,
            metrics,
            tap: TapEmitter::new_disabled(),
            next: None,
        })
    }

    /// Installs the handler consulted for queries outside the fan-out zone.
    pub fn with_next(mut self, next: Arc<dyn DnsHandler>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn with_tap(mut self, tap: TapEmitter) -> Self {
        self.tap = tap;
        self
    }

    /// Overrides the worker pool size for embedders that manage their own
    /// bounds; clamped to [1, client count].
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.clamp(1, self.clients.len().max(1));
        self
    }

    pub fn metrics(&self) -> &Arc<FanoutMetrics> {
        &self.metrics
    }

    /// A query is admitted iff its qname is under `from` and not excluded.
    fn matches(&self, qname: &str) -> bool {
        name::is_under(qname, &self.from) && !self.excluded.contains(qname)
    }

    /// Builds a fresh selector, then wires feeder -> worker pool ->
    /// results channel. The feeder pushes `server_count` picks through a
    /// channel bounded to `worker_count`, which is what throttles the
    /// number of in-flight upstream exchanges. The results channel closes
    /// once every worker has finished.
    fn run_workers(
        &self,
        token: &CancellationToken,
        req: &Arc<Message>,
    ) -> mpsc::Receiver<UpstreamResponse> {
        let mut selector = self.policy.selector(&self.clients);
        let (work_tx, work_rx) = mpsc::channel::<Arc<Client>>(self.worker_count);
        let (result_tx, result_rx) = mpsc::channel::<UpstreamResponse>(self.server_count);

        let feeder_token = token.clone();
        let server_count = self.server_count;
        tokio::spawn(async move {
            for _ in 0..server_count {
                let Some(client) = selector.pick() else { break };
                tokio::select! {
                    _ = feeder_token.cancelled() => return,
                    sent = work_tx.send(client) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        let work_rx = Arc::new(Mutex::new(work_rx));
        for _ in 0..self.worker_count {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let token = token.clone();
            let req = Arc::clone(req);
            let attempts = self.attempts;
            tokio::spawn(async move {
                loop {
                    let client = { work_rx.lock().await.recv().await };
                    let Some(client) = client else { break };
                    if token.is_cancelled() {
                        break;
                    }
                    let response = process_client(&token, client, &req, attempts).await;
                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = result_tx.send(response) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
        // Workers hold the only sender clones left, so the channel closes
        // exactly when the last worker exits.
        drop(result_tx);
        result_rx
    }

    /// Consumes responses under the deadline, keeping the running best.
    /// A NOERROR reply (any non-error reply in race mode) short-circuits.
    async fn collect(
        &self,
        deadline: Instant,
        results: &mut mpsc::Receiver<UpstreamResponse>,
    ) -> Option<UpstreamResponse> {
        let mut best: Option<UpstreamResponse> = None;
        loop {
            let received = match tokio::time::timeout_at(deadline, results.recv()).await {
                Err(_) => return best,
                Ok(None) => return best,
                Ok(Some(received)) => received,
            };
            if let Ok(reply) = &received.outcome {
                if self.race || reply.response_code() == ResponseCode::NoError {
                    return Some(received);
                }
            }
            if is_better(best.as_ref(), &received) {
                best = Some(received);
            }
        }
    }

    fn tap_result(&self, client: &Client, req: &Message, reply: &Message, start: Instant) {
        if !self.tap.is_enabled() {
            return;
        }
        let response_time = SystemTime::now();
        let query_time = response_time - start.elapsed();
        let raw = |msg: &Message| {
            self.tap
                .include_raw()
                .then(|| msg.to_vec().ok().map(Bytes::from))
                .flatten()
        };
        self.tap.emit(TapEvent {
            kind: TapKind::ForwarderQuery,
            upstream: Arc::clone(client.endpoint()),
            protocol: client.protocol(),
            query_time,
            response_time: None,
            raw_message: raw(req),
        });
        self.tap.emit(TapEvent {
            kind: TapKind::ForwarderResponse,
            upstream: Arc::clone(client.endpoint()),
            protocol: client.protocol(),
            query_time,
            response_time: Some(response_time),
            raw_message: raw(reply),
        });
    }
}

#[async_trait]
impl DnsHandler for Fanout {
    async fn serve_dns(
        &self,
        writer: &mut dyn ResponseWriter,
        req: &Message,
    ) -> Result<ResponseCode, FanoutError> {
        let qname = message::query_name(req);
        if !self.matches(&qname) {
            return match &self.next {
                Some(next) => next.serve_dns(writer, req).await,
                None => Err(FanoutError::NoNextHandler),
            };
        }

        let token = CancellationToken::new();
        let _stop_workers = token.clone().drop_guard();
        let deadline = Instant::now() + self.timeout;
        let req_shared = Arc::new(req.clone());
        let mut results = self.run_workers(&token, &req_shared);

        let Some(result) = self.collect(deadline, &mut results).await else {
            return Err(FanoutError::DeadlineExceeded);
        };
        Span::current().record("upstream", result.client.endpoint().as_ref());

        let reply = match result.outcome {
            Ok(reply) => reply,
            Err(err) => return Err(err),
        };
        self.tap_result(&result.client, req, &reply, result.start);

        if !message::matches_reply(req, &reply) {
            debug!(
                id = reply.id(),
                qname = %qname,
                upstream = %result.client.endpoint(),
                "reply does not match request, answering FORMERR"
            );
            let formerr = message::synth_reply(req, ResponseCode::FormErr);
            log_write_err(writer.write_msg(&formerr).await);
            return Ok(ResponseCode::NoError);
        }

        log_write_err(writer.write_msg(&reply).await);
        Ok(ResponseCode::NoError)
    }
}

/// One upstream's attempt loop: retry up to `attempts` times (forever when
/// 0) with an interruptible delay between attempts, and emit exactly one
/// response record.
async fn process_client(
    token: &CancellationToken,
    client: Arc<Client>,
    req: &Message,
    attempts: u32,
) -> UpstreamResponse {
    let start = Instant::now();
    let mut last_err = FanoutError::Canceled;
    let mut tried = 0u32;
    loop {
        if token.is_cancelled() {
            return UpstreamResponse {
                client,
                start,
                outcome: Err(FanoutError::Canceled),
            };
        }
        match client.request(token, req).await {
            Ok(reply) => {
                return UpstreamResponse {
                    client,
                    start,
                    outcome: Ok(reply),
                }
            }
            Err(err) => last_err = err,
        }
        if attempts != 0 {
            tried += 1;
            if tried >= attempts {
                break;
            }
        }
        tokio::select! {
            _ = token.cancelled() => {
                return UpstreamResponse {
                    client,
                    start,
                    outcome: Err(FanoutError::Canceled),
                }
            }
            _ = tokio::time::sleep(ATTEMPT_DELAY) => {}
        }
    }
    UpstreamResponse {
        client,
        start,
        outcome: Err(FanoutError::AttemptLimit(Box::new(last_err))),
    }
}

fn log_write_err(result: Result<(), FanoutError>) {
    if let Err(err) = result {
        error!(error = %err, "failed to write reply downstream");
    }
}
