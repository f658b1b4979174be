use async_trait::async_trait;
use fanout_dns_domain::FanoutError;
use hickory_proto::op::{Message, ResponseCode};

/// Downstream side of one query: where the chosen reply is written.
#[async_trait]
pub trait ResponseWriter: Send {
    async fn write_msg(&mut self, reply: &Message) -> Result<(), FanoutError>;
}

/// A handler in the serving chain.
///
/// `Ok(NoError)` means the query was handled and the reply written through
/// `writer`. Any other rcode asks the host to synthesise a response with
/// that code. `Err` carries the cause the host should report alongside a
/// synthesised SERVFAIL.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    async fn serve_dns(
        &self,
        writer: &mut dyn ResponseWriter,
        req: &Message,
    ) -> Result<ResponseCode, FanoutError>;
}
