//! Capability traits for ordered transactional key-value access.
//!
//! Higher layers are parameterized over these traits so that a real
//! networked backend and the in-memory test engine are interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::range::BytesRange;

/// One stored key-value pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Range-read mode hint.
///
/// The in-memory engine ignores the mode; a networked backend may use it to
/// pick a fetch strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamingMode {
    /// Fetch in order, batch by batch, as the consumer advances.
    #[default]
    Serial,
    /// Fetch the whole result eagerly.
    WantAll,
}

/// Options for range reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct RangeOptions {
    /// Maximum number of pairs to return. Zero means unlimited.
    pub limit: usize,
    /// Iterate from the end of the range towards the start.
    pub reverse: bool,
    /// Fetch strategy hint.
    pub mode: StreamingMode,
}

/// An eagerly-issued point read, awaited at the caller's convenience.
///
/// Issuing many reads before awaiting any of them lets a networked backend
/// overlap the round-trips while the caller's control flow stays sequential.
pub type ValueFuture = BoxFuture<'static, Result<Option<Bytes>>>;

/// Read operations available inside a transaction.
#[async_trait]
pub trait ReadTransaction: Send + Sync {
    /// Issues a point read for `key` and returns the awaitable immediately.
    ///
    /// The read observes the transaction's own buffered writes.
    fn get(&self, key: Bytes) -> ValueFuture;

    /// Reads the ordered pairs whose keys fall within `range`.
    ///
    /// Pairs come back in ascending key order, or descending when
    /// [`RangeOptions::reverse`] is set, truncated at
    /// [`RangeOptions::limit`] when non-zero.
    async fn get_range(&self, range: BytesRange, options: RangeOptions) -> Result<Vec<KeyValue>>;
}

/// A unit of atomicity over the store.
///
/// Mutations are buffered and take effect all together at [`commit`]; until
/// then they are visible only to this transaction's own reads. Abandoning
/// the transaction without committing discards every buffered mutation.
///
/// [`commit`]: Transaction::commit
#[async_trait]
pub trait Transaction: ReadTransaction {
    /// Buffers a write of `value` under `key`.
    fn set(&self, key: Bytes, value: Bytes);

    /// Buffers the removal of `key`. No-op if the key does not exist.
    fn clear(&self, key: Bytes);

    /// Buffers the removal of every key in `range`.
    fn clear_range(&self, range: BytesRange);

    /// Atomically applies all buffered mutations.
    async fn commit(&self) -> Result<()>;
}

/// The store itself; hands out transactions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Opens a new transaction against the current committed state.
    async fn begin(&self) -> Result<Arc<dyn Transaction>>;
}
