pub mod client;
pub mod events;
pub mod fanout;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod policy;
pub mod response;
pub mod selector;
pub mod transport;

pub use client::Client;
pub use events::{TapEmitter, TapEvent, TapKind};
pub use fanout::Fanout;
pub use handler::{DnsHandler, ResponseWriter};
pub use metrics::FanoutMetrics;
pub use policy::SelectionPolicy;
pub use response::UpstreamResponse;

use std::time::Duration;

/// Deadline for opening a connection to an upstream.
pub(crate) const DIAL_TIMEOUT: Duration = Duration::from_secs(2);
/// Deadline for writing one query.
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Deadline for the id-matched read loop of one exchange.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Sleep between retry attempts against the same upstream.
pub(crate) const ATTEMPT_DELAY: Duration = Duration::from_millis(50);
