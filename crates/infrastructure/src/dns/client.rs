use crate::dns::metrics::FanoutMetrics;
use crate::dns::transport::{DnsConn, TlsParams, Transport};
use crate::dns::{message, READ_TIMEOUT, WRITE_TIMEOUT};
use fanout_dns_domain::{FanoutError, Protocol};
use hickory_proto::op::Message;
use std::sync::Arc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug_span, Instrument};

/// Proxy for one remote DNS server: performs exactly one dial-write-read
/// exchange per `request` call. Retries belong to the engine.
pub struct Client {
    addr: Arc<str>,
    protocol: Protocol,
    transport: Transport,
    metrics: Arc<FanoutMetrics>,
}

impl Client {
    pub fn new(addr: &str, protocol: Protocol, metrics: Arc<FanoutMetrics>) -> Self {
        Self {
            addr: Arc::from(addr),
            protocol,
            transport: Transport::new(addr),
            metrics,
        }
    }

    /// Upstream address; the client's identity.
    pub fn endpoint(&self) -> &Arc<str> {
        &self.addr
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Binds TLS parameters; from here on every dial uses `tcp-tls`.
    /// Called at most once, before first use.
    pub fn set_tls(&mut self, params: TlsParams) {
        self.protocol = Protocol::TcpTls;
        self.transport.set_tls(params);
    }

    /// One exchange with this upstream. Cancelling `token` aborts the dial
    /// or unblocks the in-flight read by dropping the connection. Replies
    /// whose transaction id does not match the request are discarded.
    pub async fn request(
        &self,
        token: &CancellationToken,
        req: &Message,
    ) -> Result<Message, FanoutError> {
        let span = debug_span!("request", peer = %self.addr);
        async move {
            let start = Instant::now();
            let reply = tokio::select! {
                _ = token.cancelled() => return Err(FanoutError::Canceled),
                result = self.exchange(req) => result?,
            };
            self.metrics
                .observe_exchange(&self.addr, reply.response_code(), start.elapsed());
            Ok(reply)
        }
        .instrument(span)
        .await
    }

    async fn exchange(&self, req: &Message) -> Result<Message, FanoutError> {
        let mut conn = self.transport.dial(self.protocol).await?;
        conn.set_udp_size(message::requested_udp_size(req));

        timeout(WRITE_TIMEOUT, conn.send_msg(req))
            .await
            .map_err(|_| FanoutError::ExchangeTimeout(self.addr.to_string()))??;

        timeout(READ_TIMEOUT, async {
            loop {
                let reply = conn.recv_msg().await?;
                if reply.id() == req.id() {
                    return Ok(reply);
                }
            }
        })
        .await
        .map_err(|_| FanoutError::ExchangeTimeout(self.addr.to_string()))?
    }
}
