//! Error types for record operations.

/// Error type for record operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A load of an absent record without a not-found handler.
    RecordNotFound,

    /// A key part violates the codec's length or format invariants.
    InvalidKey(String),

    /// A stored value has a malformed header or unusable payload.
    InvalidValue(String),

    /// Decompression of a stored value failed.
    InvalidGzip(String),

    /// Compression I/O or buffer error.
    MemFail(String),

    /// An error raised by a caller-supplied handler, predicate or
    /// marshaling routine; aborts the surrounding operation.
    User(String),

    /// An error forwarded from the underlying store.
    Storage(okv::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::RecordNotFound => write!(f, "Record not found"),
            Error::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            Error::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            Error::InvalidGzip(msg) => write!(f, "Invalid gzip payload: {}", msg),
            Error::MemFail(msg) => write!(f, "Compression failure: {}", msg),
            Error::User(msg) => write!(f, "{}", msg),
            Error::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl From<okv::Error> for Error {
    fn from(err: okv::Error) -> Self {
        Error::Storage(err)
    }
}

/// Result type alias for record operations.
pub type Result<T> = std::result::Result<T, Error>;
