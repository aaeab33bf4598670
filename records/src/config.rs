//! Configuration options for the record store.

/// Default compression threshold in bytes.
pub const DEFAULT_GZIP_THRESHOLD: usize = 860;

/// Default chunk size in bytes for large-value storage.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Configuration for a [`RecordStore`](crate::RecordStore).
///
/// Controls the value pipeline thresholds. Both thresholds apply to the
/// payload as it stands at that pipeline stage: a body longer than
/// `gzip_threshold` is compressed first, and only if the (possibly
/// compressed) payload still exceeds `chunk_size` is it split into chunks.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bodies longer than this many bytes are gzip-compressed.
    pub gzip_threshold: usize,

    /// Payloads longer than this many bytes are split into chunks of at
    /// most this size, stored under a fresh blob id.
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gzip_threshold: DEFAULT_GZIP_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
