//! Typed record storage over an ordered, transactional key-value store.
//!
//! This crate presents records, application objects with stable identity,
//! a type tag and a serialized body, on top of any store implementing the
//! `okv` capability traits. It offers transactional CRUD, secondary
//! indexing, prefix/range selection with cursor-style iteration, and
//! transparent value compression plus chunked large-value storage.
//!
//! # Architecture
//!
//! One flat key space multiplexes record types, secondary indexes and
//! value chunks through a 2-byte database id and a 2-byte type id on every
//! key. Record bodies pass through a value pipeline that conditionally
//! gzips and chunks them; secondary indexes are kept consistent with
//! record bodies across insert, update and delete; and range selection
//! batches reads, hydrating id-only index rows through a second batched
//! fetch.
//!
//! All mutations are buffered in the caller's transaction and commit
//! atomically with it.
//!
//! # Key Concepts
//!
//! - **[`RecordStore`]**: the handle binding a database id to one
//!   transaction; entry point for every operation.
//! - **[`Record`] / [`RecordType`]**: the contract a storable type
//!   provides: identity, marshaling and index declarations.
//! - **[`Indexer`]**: accumulates a record's index entries before they
//!   commit as set/clear operations.
//! - **[`SelectOptions`]**: range, direction, limit and filter for
//!   selection.
//! - **[`Cursor`]**: a persisted pagination anchor, itself stored as a
//!   record, with paging and a streaming sequence.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use okv::{Database, MemoryDatabase};
//! use records::{RecordStore, SelectOptions};
//!
//! let db = Arc::new(MemoryDatabase::new());
//! let tx = db.begin().await?;
//! let store = RecordStore::new(1, Arc::clone(&tx));
//!
//! let mut user = User::new("u-1");
//! store.save(None, &mut [&mut user]).await?;
//! tx.commit().await?;
//! ```

mod config;
mod cursor;
mod error;
mod index;
mod key;
mod options;
mod record;
mod select;
mod store;
pub mod testing;
mod value;

pub use config::{Config, DEFAULT_CHUNK_SIZE, DEFAULT_GZIP_THRESHOLD};
pub use cursor::{Cursor, RecordStream, CURSOR_RECORD_TYPE, DEFAULT_PAGE};
pub use error::{Error, Result};
pub use index::Indexer;
pub use key::{CHUNK_TYPE_ID, CURSOR_TYPE_ID};
pub use options::SelectOptions;
pub use record::{IndexHandler, Predicate, Record, RecordHandler, RecordType};
pub use store::RecordStore;
