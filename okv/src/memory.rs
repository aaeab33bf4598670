//! In-memory implementation of the storage traits using a BTreeMap.
//!
//! This implementation stores all data in memory and is useful for testing
//! or scenarios where durability is not required.

use std::collections::BTreeMap;
use std::ops::RangeBounds;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;

use crate::error::{Error, Result};
use crate::range::BytesRange;
use crate::transaction::{
    Database, KeyValue, RangeOptions, ReadTransaction, Transaction, ValueFuture,
};

type OrderedMap = BTreeMap<Bytes, Bytes>;

/// In-memory ordered store implementing the [`Database`] trait.
///
/// Each transaction takes a full snapshot of the committed state on
/// [`begin`](Database::begin), applies its buffered mutations to the private
/// snapshot (which gives read-your-writes for both point and range reads),
/// and swaps the whole map back on commit. Transactions therefore serialize
/// by last-commit-wins whole-state replacement; there is no conflict
/// detection. A networked backend implements the same traits with real
/// optimistic concurrency control.
pub struct MemoryDatabase {
    data: Arc<RwLock<OrderedMap>>,
}

impl MemoryDatabase {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        let snapshot = self
            .data
            .read()
            .map_err(|e| Error::Internal(format!("Failed to acquire read lock: {}", e)))?
            .clone();

        Ok(Arc::new(MemoryTransaction {
            shared: Arc::clone(&self.data),
            local: Arc::new(Mutex::new(snapshot)),
        }))
    }
}

/// A transaction over [`MemoryDatabase`].
///
/// Holds a private snapshot of the committed state; mutations apply to the
/// snapshot immediately and reach the shared state only on commit.
pub(crate) struct MemoryTransaction {
    shared: Arc<RwLock<OrderedMap>>,
    local: Arc<Mutex<OrderedMap>>,
}

impl MemoryTransaction {
    fn with_local<T>(&self, f: impl FnOnce(&mut OrderedMap) -> T) -> Result<T> {
        let mut data = self
            .local
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to acquire transaction lock: {}", e)))?;
        Ok(f(&mut data))
    }
}

#[async_trait]
impl ReadTransaction for MemoryTransaction {
    fn get(&self, key: Bytes) -> ValueFuture {
        let local = Arc::clone(&self.local);
        async move {
            let data = local.lock().map_err(|e| {
                Error::Internal(format!("Failed to acquire transaction lock: {}", e))
            })?;
            Ok(data.get(&key).cloned())
        }
        .boxed()
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get_range(&self, range: BytesRange, options: RangeOptions) -> Result<Vec<KeyValue>> {
        if range.is_degenerate() {
            return Ok(Vec::new());
        }

        self.with_local(|data| {
            let pairs = data
                .range((range.start_bound().cloned(), range.end_bound().cloned()))
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone()));

            let ordered: Box<dyn Iterator<Item = KeyValue>> = if options.reverse {
                Box::new(pairs.rev())
            } else {
                Box::new(pairs)
            };

            if options.limit > 0 {
                ordered.take(options.limit).collect()
            } else {
                ordered.collect()
            }
        })
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn set(&self, key: Bytes, value: Bytes) {
        // A poisoned lock means a prior panic; the transaction is dead anyway.
        if let Ok(mut data) = self.local.lock() {
            data.insert(key, value);
        }
    }

    fn clear(&self, key: Bytes) {
        if let Ok(mut data) = self.local.lock() {
            data.remove(&key);
        }
    }

    fn clear_range(&self, range: BytesRange) {
        if range.is_degenerate() {
            return;
        }
        if let Ok(mut data) = self.local.lock() {
            let doomed: Vec<Bytes> = data
                .range((range.start_bound().cloned(), range.end_bound().cloned()))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                data.remove(&key);
            }
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn commit(&self) -> Result<()> {
        let local = self.with_local(|data| data.clone())?;
        let mut shared = self
            .shared
            .write()
            .map_err(|e| Error::Internal(format!("Failed to acquire write lock: {}", e)))?;
        *shared = local;
        Ok(())
    }
}
