use crate::dns::client::Client;
use fanout_dns_domain::FanoutError;
use hickory_proto::op::{Message, ResponseCode};
use std::sync::Arc;
use tokio::time::Instant;

/// One upstream's answer to a fanned-out query: either a reply message or
/// the error that ended its attempt loop.
pub struct UpstreamResponse {
    pub client: Arc<Client>,
    pub start: Instant,
    pub outcome: Result<Message, FanoutError>,
}

/// Partial order used by the aggregator: should `candidate` replace
/// `current` as the running best?
///
/// Errors lose to replies; among replies, a NOERROR message beats a
/// non-NOERROR one. Equally-ranked records keep the incumbent, so the first
/// arrival wins ties.
pub fn is_better(current: Option<&UpstreamResponse>, candidate: &UpstreamResponse) -> bool {
    let Some(current) = current else {
        return true;
    };
    match (&current.outcome, &candidate.outcome) {
        (_, Err(_)) => false,
        (Err(_), Ok(_)) => true,
        (Ok(cur), Ok(cand)) => {
            cur.response_code() != ResponseCode::NoError
                && cand.response_code() == ResponseCode::NoError
        }
    }
}
