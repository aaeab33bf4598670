//! The index engine: accumulating and committing secondary index entries.
//!
//! An index is simply another type id in the flat key space. A live entry
//! is the key `db || index_type || index_key || record_id || id_len` with
//! an empty value; the zero-length value is what marks a row as id-only so
//! the selector knows to fetch the record body in a second pass.

use bytes::Bytes;
use okv::{BytesRange, Transaction};

use crate::error::Result;
use crate::key;

#[derive(Clone, Debug)]
struct IndexEntry {
    type_id: u16,
    key: Bytes,
}

/// Accumulates per-record `(index type, index key)` declarations in a
/// write-scoped buffer, then commits them as set or clear operations inside
/// the current transaction.
#[derive(Debug, Default)]
pub struct Indexer {
    entries: Vec<IndexEntry>,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares one index entry.
    pub fn add(&mut self, index_type_id: u16, index_key: impl Into<Bytes>) {
        self.entries.push(IndexEntry {
            type_id: index_type_id,
            key: index_key.into(),
        });
    }

    /// Number of accumulated declarations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commits the accumulated entries for `record_id`: clears each entry
    /// key when `drop` is set, otherwise sets it with an empty value.
    pub(crate) fn commit(
        &self,
        db: u16,
        tx: &dyn Transaction,
        drop: bool,
        record_id: &str,
    ) -> Result<()> {
        for entry in &self.entries {
            let entry_key = key::index_key(db, entry.type_id, &entry.key, record_id)?;
            if drop {
                tx.clear(entry_key);
            } else {
                tx.set(entry_key, Bytes::new());
            }
        }
        Ok(())
    }

    /// Retires the accumulated index keys for every record at once: clears
    /// the whole `db || index_type || index_key` prefix of each declaration,
    /// without touching record bodies.
    pub(crate) fn clear(&self, db: u16, tx: &dyn Transaction) {
        for entry in &self.entries {
            tx.clear_range(BytesRange::half_open(
                key::raw_key(db, entry.type_id, &[entry.key.as_ref()]),
                key::raw_key(db, entry.type_id, &[entry.key.as_ref(), &[key::TAIL]]),
            ));
        }
    }
}
