/// Errors raised by puzzle construction, solution decoding and the minting facade.
///
/// Verification never produces an error: a proof that does not check out is
/// simply `false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("malformed solution: {0}")]
    Format(String),
    #[error("unknown proof-of-work version {0}")]
    UnknownVersion(u8),
    #[error("solve cancelled")]
    Cancelled,
    #[error("solve timed out")]
    Timeout,
    #[error("mint channel closed")]
    ChannelClosed,
    #[error("solver failed: {0}")]
    SolverFailed(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
