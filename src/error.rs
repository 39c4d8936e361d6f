//! Error types for the corvid runtime.

/// Result type alias for corvid operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur at the runtime's configuration and lifecycle
/// boundaries. The scheduling data path itself has no recoverable errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Pool lifecycle error
    #[error("pool error: {0}")]
    Pool(String),

    /// Global runtime not initialized
    #[error("runtime not initialized - call corvid::init() first")]
    NotInitialized,

    /// Global runtime already initialized
    #[error("runtime already initialized")]
    AlreadyInitialized,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a pool error
    pub fn pool<S: Into<String>>(msg: S) -> Self {
        Error::Pool(msg.into())
    }
}
