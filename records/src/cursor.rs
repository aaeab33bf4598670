//! Persisted pagination cursors and the streaming record sequence.
//!
//! A cursor is itself a record, stored under [`CURSOR_TYPE_ID`] with a
//! serde-marshaled state: target type, resolved bounds, page size and the
//! anchor key of the last visited row. Because the state rides the same
//! transactional machinery as every other record, a cursor survives across
//! transactions and long-running iteration survives disconnects.
//!
//! The anchor discipline: [`next`](Cursor::next) leaves the anchor at the
//! highest returned key plus the tail sentinel, [`prev`](Cursor::prev) at
//! the lowest returned key. A `next` after a `prev` resumes ascending from
//! that low-water anchor.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use okv::Database;

use crate::error::{Error, Result};
use crate::key::{self, CURSOR_TYPE_ID};
use crate::options::SelectOptions;
use crate::record::{Predicate, Record, RecordType};
use crate::select;
use crate::store::RecordStore;

/// Page size used when the creating options carry none.
pub const DEFAULT_PAGE: usize = 100;

/// The [`RecordType`] under which cursors persist themselves.
pub const CURSOR_RECORD_TYPE: RecordType = RecordType {
    id: CURSOR_TYPE_ID,
    new: cursor_record,
};

fn cursor_record(id: String) -> Box<dyn Record> {
    Box::new(Cursor {
        state: CursorState {
            id,
            ..Default::default()
        },
        target: None,
        filter: None,
    })
}

/// Everything a cursor persists between transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CursorState {
    id: String,
    db: u16,
    type_id: u16,
    index_type: Option<u16>,
    page: usize,
    from: Vec<u8>,
    to: Vec<u8>,
    anchor: Vec<u8>,
    empty: bool,
}

/// A persisted pagination anchor over one record type.
pub struct Cursor {
    state: CursorState,
    target: Option<RecordType>,
    filter: Option<Predicate>,
}

impl Cursor {
    /// Creates a fresh cursor over `record_type`, positioned at the start
    /// of the range described by `options`.
    ///
    /// The cursor is not persisted until its first page turn or an
    /// explicit save through the store.
    pub fn create(store: &RecordStore, record_type: RecordType, options: SelectOptions) -> Cursor {
        let (from, to) = select::resolve_bounds(&options);
        let page = if options.page == 0 {
            DEFAULT_PAGE
        } else {
            options.page
        };
        Cursor {
            state: CursorState {
                id: Uuid::new_v4().to_string(),
                db: store.database_id(),
                type_id: record_type.id,
                index_type: options.index_type,
                page,
                from: from.to_vec(),
                to: to.to_vec(),
                anchor: Vec::new(),
                empty: false,
            },
            target: Some(record_type),
            filter: options.filter,
        }
    }

    /// Loads a persisted cursor. The caller re-supplies the record type,
    /// since factories cannot be persisted; a type-id mismatch fails with
    /// [`Error::InvalidValue`].
    pub async fn open(store: &RecordStore, id: &str, record_type: RecordType) -> Result<Cursor> {
        let mut cursor = Cursor {
            state: CursorState {
                id: id.to_string(),
                ..Default::default()
            },
            target: None,
            filter: None,
        };
        {
            let mut slot: [&mut dyn Record; 1] = [&mut cursor as &mut dyn Record];
            store.load(None, &mut slot).await?;
        }
        if cursor.state.type_id != record_type.id {
            return Err(Error::InvalidValue(format!(
                "cursor targets type {}, requested type {}",
                cursor.state.type_id, record_type.id
            )));
        }
        cursor.state.db = store.database_id();
        cursor.target = Some(record_type);
        Ok(cursor)
    }

    /// Re-attaches a predicate after [`open`](Cursor::open); filters are
    /// not persisted.
    pub fn with_filter(
        mut self,
        predicate: impl Fn(&dyn Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// The cursor's own record id.
    pub fn id(&self) -> &str {
        &self.state.id
    }

    /// True once iteration has exhausted the range (or after
    /// [`close`](Cursor::close)).
    pub fn is_empty(&self) -> bool {
        self.state.empty
    }

    /// Returns up to `page` records following the anchor in ascending key
    /// order, first skipping `skip` whole pages. Persists the advanced
    /// position in the caller's transaction.
    pub async fn next(&mut self, store: &RecordStore, skip: u8) -> Result<Vec<Box<dyn Record>>> {
        self.turn_page(store, skip, false).await
    }

    /// Returns up to `page` records preceding the anchor in descending key
    /// order, first skipping `skip` whole pages. Persists the advanced
    /// position in the caller's transaction.
    pub async fn prev(&mut self, store: &RecordStore, skip: u8) -> Result<Vec<Box<dyn Record>>> {
        self.turn_page(store, skip, true).await
    }

    /// Marks the cursor empty and deletes its persisted record.
    pub async fn close(&mut self, store: &RecordStore) -> Result<()> {
        self.state.empty = true;
        let mut slot: [&mut dyn Record; 1] = [self as &mut dyn Record];
        store.drop(None, &mut slot).await
    }

    /// Streams every record from the current position to the end of the
    /// range as a lazy, cancellable sequence.
    ///
    /// Each page runs in its own transaction opened from `database`, with
    /// the advanced cursor state committed alongside, so iteration can
    /// resume after a disconnect. An error ends the stream as its terminal
    /// item. Cancellation via `token` stops between records.
    pub fn select_stream(self, database: Arc<dyn Database>, token: CancellationToken) -> RecordStream {
        let capacity = self.state.page.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        tokio::spawn(stream_pages(self, database, token, sender));
        RecordStream { receiver }
    }

    async fn turn_page(
        &mut self,
        store: &RecordStore,
        skip: u8,
        reverse: bool,
    ) -> Result<Vec<Box<dyn Record>>> {
        if self.state.empty {
            return Ok(Vec::new());
        }
        let target = self.target.ok_or_else(|| {
            Error::InvalidValue("cursor has no record type attached".to_string())
        })?;
        let db = store.database_id();
        let scan_type = self.state.index_type.unwrap_or(target.id);

        let low = key::raw_key(db, scan_type, &[self.state.from.as_slice()]);
        let high = key::raw_key(db, scan_type, &[self.state.to.as_slice()]);
        let (begin, end) = if self.state.anchor.is_empty() {
            (low, high)
        } else if reverse {
            (low, Bytes::copy_from_slice(&self.state.anchor))
        } else {
            (Bytes::copy_from_slice(&self.state.anchor), high)
        };

        let want = self.state.page * (skip as usize + 1);
        let selection = select::scan_range(
            db,
            store.transaction(),
            target,
            begin,
            end,
            want,
            reverse,
            self.filter.as_ref(),
        )
        .await?;

        let mut records = selection.records;
        if let Some(last) = selection.last_key {
            self.state.anchor = last.to_vec();
        }
        // an under-filled scan means the range is exhausted in this direction
        if records.len() < want {
            self.state.empty = true;
        }

        let start = self.state.page * skip as usize;
        let page = if start >= records.len() {
            Vec::new()
        } else {
            records.split_off(start)
        };

        let mut slot: [&mut dyn Record; 1] = [self as &mut dyn Record];
        store.save(None, &mut slot).await?;

        Ok(page)
    }
}

impl Record for Cursor {
    fn id(&self) -> String {
        self.state.id.clone()
    }

    fn record_type(&self) -> RecordType {
        CURSOR_RECORD_TYPE
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.state)
            .map_err(|e| Error::InvalidValue(format!("cursor state encoding: {}", e)))
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        self.state = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidValue(format!("cursor state decoding: {}", e)))?;
        Ok(())
    }
}

async fn stream_pages(
    mut cursor: Cursor,
    database: Arc<dyn Database>,
    token: CancellationToken,
    sender: mpsc::Sender<Result<Box<dyn Record>>>,
) {
    loop {
        if token.is_cancelled() {
            return;
        }

        let db_id = cursor.state.db;
        let page = async {
            let tx = database.begin().await?;
            let store = RecordStore::new(db_id, Arc::clone(&tx));
            let records = cursor.turn_page(&store, 0, false).await?;
            tx.commit().await?;
            Ok::<_, Error>(records)
        }
        .await;

        match page {
            Err(err) => {
                // terminal error item; the receiver may already be gone
                let _ = sender.send(Err(err)).await;
                return;
            }
            Ok(records) => {
                if records.is_empty() {
                    return;
                }
                tracing::debug!(count = records.len(), cursor = %cursor.state.id, "streaming page");
                for record in records {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        sent = sender.send(Ok(record)) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// A lazy, cancellable sequence of records with a terminal error slot.
pub struct RecordStream {
    receiver: mpsc::Receiver<Result<Box<dyn Record>>>,
}

impl RecordStream {
    /// Returns the next record, the terminal error, or `None` once the
    /// stream is exhausted or cancelled.
    pub async fn next(&mut self) -> Option<Result<Box<dyn Record>>> {
        self.receiver.recv().await
    }
}
