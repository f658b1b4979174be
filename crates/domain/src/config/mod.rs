//! Configuration for fanout-dns.
//!
//! - `root`: top-level config record and file loading
//! - `server`: listener binding
//! - `fanout`: the fan-out record itself (upstreams, policy, deadlines)
//! - `upstream`: endpoint grammar and transport protocols
//! - `logging`: logging settings
//! - `errors`: configuration errors

pub mod errors;
pub mod fanout;
pub mod logging;
pub mod root;
pub mod server;
pub mod upstream;

pub use errors::ConfigError;
pub use fanout::{FanoutConfig, PolicyKind, TlsSettings};
pub use logging::LoggingConfig;
pub use root::Config;
pub use server::ServerConfig;
pub use upstream::{Protocol, UpstreamEndpoint};
