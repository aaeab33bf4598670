//! Ordered transactional key-value abstraction.
//!
//! This crate defines the capability traits through which higher layers
//! consume an ordered, transactional key-value store: point reads that
//! return eagerly-issued futures, ordered range reads, buffered mutations,
//! and atomic commit. It also ships an in-memory engine implementing the
//! same traits, used as the storage seam in tests.
//!
//! # Key Concepts
//!
//! - **[`Database`]**: the store itself; hands out transactions.
//! - **[`Transaction`]** / **[`ReadTransaction`]**: one unit of atomicity.
//!   All mutations are buffered in the transaction and become visible to
//!   other transactions only at [`Transaction::commit`]. Reads see the
//!   transaction's own prior writes.
//! - **[`ValueFuture`]**: [`ReadTransaction::get`] returns immediately with
//!   an awaitable, so callers can issue many reads up front and await them
//!   in order, letting a networked backend pipeline the round-trips.
//! - **[`BytesRange`]**: half-open-capable ranges over the flat key space.
//!
//! # Example
//!
//! ```ignore
//! use okv::{Database, MemoryDatabase, RangeOptions};
//! use bytes::Bytes;
//!
//! let db = MemoryDatabase::new();
//! let tx = db.begin().await?;
//! tx.set(Bytes::from("k"), Bytes::from("v"));
//! assert_eq!(tx.get(Bytes::from("k")).await?, Some(Bytes::from("v")));
//! tx.commit().await?;
//! ```

mod error;
mod memory;
mod range;
mod transaction;

pub use error::{Error, Result};
pub use memory::MemoryDatabase;
pub use range::BytesRange;
pub use transaction::{
    Database, KeyValue, RangeOptions, ReadTransaction, StreamingMode, Transaction, ValueFuture,
};
