use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpError {
    /// The two index maps cannot form an interpolant (block-size or
    /// communicator mismatch). Surfaced at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation was invoked in the wrong lifecycle state, e.g.
    /// apply before finalize or finalize twice. State is unchanged.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The underlying message layer reported a failure. Fatal; the
    /// operator is unusable afterwards.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InterpError>;
