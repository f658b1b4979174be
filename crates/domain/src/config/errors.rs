use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config file: {0}")]
    Parse(String),

    #[error("unable to normalize '{0}'")]
    InvalidName(String),

    #[error("no upstream hosts configured")]
    NoUpstreams,

    #[error("more than {max} upstream hosts configured: {count}")]
    TooManyUpstreams { max: usize, count: usize },

    #[error("not an IP address or file: {0}")]
    InvalidEndpoint(String),

    #[error("unknown network protocol {0}")]
    UnknownProtocol(String),

    #[error("worker count should be more or equal 2")]
    WorkerCountTooSmall,

    #[error("worker count is more than max value: {0}")]
    WorkerCountTooLarge(usize),

    #[error("load-factor should be more or equal 1")]
    LoadFactorTooSmall,

    #[error("load-factor {0} should be less than {1}")]
    LoadFactorTooLarge(u32, u32),

    #[error("load-factor params count must be the same as the number of hosts")]
    LoadFactorCountMismatch,

    #[error("unable to read except-file {path}: {reason}")]
    ExceptFile { path: String, reason: String },

    #[error("invalid TLS materials: {0}")]
    Tls(String),
}
