use bytes::Bytes;
use fanout_dns_domain::Protocol;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapKind {
    ForwarderQuery,
    ForwarderResponse,
}

/// Export event for one forwarded exchange, fired for the winning upstream
/// only. `raw_message` carries the wire bytes when the emitter is
/// configured to include them.
#[derive(Debug, Clone)]
pub struct TapEvent {
    pub kind: TapKind,
    pub upstream: Arc<str>,
    pub protocol: Protocol,
    pub query_time: SystemTime,
    pub response_time: Option<SystemTime>,
    pub raw_message: Option<Bytes>,
}
