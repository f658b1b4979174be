use thiserror::Error;

/// Runtime failures of the fan-out engine.
///
/// Per-upstream errors are swallowed into response records and only surface
/// downstream when no usable record exists.
#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("exchange with {0} timed out")]
    ExchangeTimeout(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("malformed DNS message: {0}")]
    Proto(String),

    #[error("attempt limit has been reached: {0}")]
    AttemptLimit(#[source] Box<FanoutError>),

    #[error("request canceled")]
    Canceled,

    #[error("no response received before the deadline")]
    DeadlineExceeded,

    #[error("no next handler found")]
    NoNextHandler,

    #[error("failed to write reply: {0}")]
    Write(String),
}
