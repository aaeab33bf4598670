//! Error types for storage operations.

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Errors reported by the storage backend itself.
    Storage(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
