//! The record store handle: transactional CRUD, indexing and selection.
//!
//! A [`RecordStore`] binds a database id and one transaction. Every
//! mutation it issues is buffered in that transaction; the caller owns the
//! transaction and commits it, which applies record bodies, chunk rows and
//! index entries atomically.
//!
//! The multi-record operations issue all point-read futures before
//! awaiting any of them, in declaration order, so a networked backend can
//! pipeline the round-trips while control flow stays sequential.

use std::sync::Arc;

use bytes::Bytes;
use okv::{Transaction, ValueFuture};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::Indexer;
use crate::key;
use crate::options::SelectOptions;
use crate::record::{IndexHandler, Record, RecordHandler, RecordType};
use crate::select;
use crate::value;

/// A handle over one database id and one transaction.
pub struct RecordStore {
    db: u16,
    tx: Arc<dyn Transaction>,
    config: Config,
}

impl RecordStore {
    /// Binds a store handle to a transaction with default configuration.
    pub fn new(db: u16, tx: Arc<dyn Transaction>) -> Self {
        Self::with_config(db, tx, Config::default())
    }

    /// Binds a store handle with explicit value-pipeline thresholds.
    pub fn with_config(db: u16, tx: Arc<dyn Transaction>, config: Config) -> Self {
        Self { db, tx, config }
    }

    /// The database id every key of this handle is scoped to.
    pub fn database_id(&self) -> u16 {
        self.db
    }

    pub(crate) fn transaction(&self) -> &dyn Transaction {
        self.tx.as_ref()
    }

    /// Reads the raw stored bytes under `(type_id, id)`. No value pipeline.
    pub async fn get(&self, type_id: u16, id: &str) -> Result<Option<Bytes>> {
        let record_key = key::record_key(self.db, type_id, id)?;
        Ok(self.tx.get(record_key).await?)
    }

    /// Writes raw bytes under `(type_id, id)`. No value pipeline, no
    /// indexing.
    pub fn put(&self, type_id: u16, id: &str, data: impl Into<Bytes>) -> Result<()> {
        let record_key = key::record_key(self.db, type_id, id)?;
        self.tx.set(record_key, data.into());
        Ok(())
    }

    /// Removes the raw key `(type_id, id)`. No chunk or index cleanup.
    pub fn delete(&self, type_id: u16, id: &str) -> Result<()> {
        let record_key = key::record_key(self.db, type_id, id)?;
        self.tx.clear(record_key);
        Ok(())
    }

    /// Saves records: marshal, index delta against the pre-image, pack.
    ///
    /// When a record already exists, `on_exists` (if any) runs first and
    /// may abort by returning an error; then the pre-image's index entries
    /// are dropped before the new body's entries are set. An update is an
    /// unconditional delete-then-insert of index entries.
    #[tracing::instrument(level = "trace", skip_all, fields(count = records.len()))]
    pub async fn save(
        &self,
        on_exists: Option<RecordHandler<'_>>,
        records: &mut [&mut dyn Record],
    ) -> Result<()> {
        let (keys, futures) = self.prefetch(records)?;
        for ((record, future), record_key) in records.iter_mut().zip(futures).zip(keys) {
            self.save_one(on_exists, &mut **record, future, record_key)
                .await?;
        }
        Ok(())
    }

    /// Loads records in place: absent ids run `on_not_found` or fail with
    /// [`Error::RecordNotFound`]; present values are unpacked and
    /// unmarshaled into the given records.
    #[tracing::instrument(level = "trace", skip_all, fields(count = records.len()))]
    pub async fn load(
        &self,
        on_not_found: Option<RecordHandler<'_>>,
        records: &mut [&mut dyn Record],
    ) -> Result<()> {
        let (_, futures) = self.prefetch(records)?;
        for (record, future) in records.iter_mut().zip(futures) {
            match future.await?.filter(|buf| !buf.is_empty()) {
                None => match on_not_found {
                    Some(handler) => handler(&mut **record)?,
                    None => return Err(Error::RecordNotFound),
                },
                Some(buf) => {
                    let (_, body) = value::unpack(self.db, self.tx.as_ref(), &buf).await?;
                    record.unmarshal(&body)?;
                }
            }
        }
        Ok(())
    }

    /// Drops records: chunk blobs and index entries derived from the
    /// pre-image are removed along with the record key.
    ///
    /// Absent records run `on_not_exists` or succeed silently. The record
    /// key is cleared even in the absent case.
    #[tracing::instrument(level = "trace", skip_all, fields(count = records.len()))]
    pub async fn drop(
        &self,
        on_not_exists: Option<RecordHandler<'_>>,
        records: &mut [&mut dyn Record],
    ) -> Result<()> {
        let (keys, futures) = self.prefetch(records)?;
        for ((record, future), record_key) in records.iter_mut().zip(futures).zip(keys) {
            match future.await?.filter(|buf| !buf.is_empty()) {
                Some(buf) => {
                    let (blob_id, pre_image) =
                        value::unpack(self.db, self.tx.as_ref(), &buf).await?;
                    if let Some(blob_id) = blob_id {
                        value::drop_blob(self.db, self.tx.as_ref(), &blob_id);
                    }
                    self.drop_index_entries(&**record, &pre_image)?;
                }
                None => {
                    if let Some(handler) = on_not_exists {
                        handler(&mut **record)?;
                    }
                }
            }
            self.tx.clear(record_key);
        }
        Ok(())
    }

    /// Applies the index entries declared by `handler` for `record_id`:
    /// sets them, or clears them when `drop` is true.
    pub fn index(&self, handler: IndexHandler<'_>, record_id: &str, drop: bool) -> Result<()> {
        let mut indexer = Indexer::new();
        handler(&mut indexer)?;
        indexer.commit(self.db, self.tx.as_ref(), drop, record_id)
    }

    /// Retires the index keys declared by `handler` for every record,
    /// without touching record bodies.
    pub fn clear_index(&self, handler: IndexHandler<'_>) -> Result<()> {
        let mut indexer = Indexer::new();
        handler(&mut indexer)?;
        indexer.clear(self.db, self.tx.as_ref());
        Ok(())
    }

    /// Removes every key of one type.
    pub fn clear_type(&self, type_id: u16) {
        self.tx.clear_range(key::type_clear_range(self.db, type_id));
    }

    /// Selects and materializes records of `record_type` in key order.
    pub async fn select(
        &self,
        record_type: RecordType,
        options: SelectOptions,
    ) -> Result<Vec<Box<dyn Record>>> {
        let selection =
            select::select_records(self.db, self.tx.as_ref(), record_type, &options).await?;
        Ok(selection.records)
    }

    /// Recovers the ids covered by a range of `type_id` rows, in key
    /// order. No materialization and no predicate.
    pub async fn select_ids(&self, type_id: u16, options: SelectOptions) -> Result<Vec<String>> {
        select::select_ids(self.db, self.tx.as_ref(), type_id, &options).await
    }

    /// Issues all point reads up front so the backend can pipeline them.
    fn prefetch(&self, records: &[&mut dyn Record]) -> Result<(Vec<Bytes>, Vec<ValueFuture>)> {
        let mut keys = Vec::with_capacity(records.len());
        let mut futures = Vec::with_capacity(records.len());
        for record in records {
            let record_key = key::record_key(self.db, record.record_type().id, &record.id())?;
            futures.push(self.tx.get(record_key.clone()));
            keys.push(record_key);
        }
        Ok((keys, futures))
    }

    async fn save_one(
        &self,
        on_exists: Option<RecordHandler<'_>>,
        record: &mut dyn Record,
        future: ValueFuture,
        record_key: Bytes,
    ) -> Result<()> {
        if let Some(prior) = future.await?.filter(|buf| !buf.is_empty()) {
            if let Some(handler) = on_exists {
                handler(record)?;
            }
            let (_, pre_image) = value::unpack(self.db, self.tx.as_ref(), &prior).await?;
            self.drop_index_entries(record, &pre_image)?;
        }

        let body = record.marshal()?;

        let mut indexer = Indexer::new();
        record.index(&mut indexer)?;
        indexer.commit(self.db, self.tx.as_ref(), false, &record.id())?;

        let packed = value::pack(self.db, self.tx.as_ref(), &self.config, body)?;
        self.tx.set(record_key, packed);
        Ok(())
    }

    /// Re-materializes the pre-image through the record's own type factory
    /// and clears every index entry it declares.
    fn drop_index_entries(&self, record: &dyn Record, pre_image: &[u8]) -> Result<()> {
        let record_type = record.record_type();
        let mut prior = (record_type.new)(record.id());
        prior.unmarshal(pre_image)?;

        let mut indexer = Indexer::new();
        prior.index(&mut indexer)?;
        indexer.commit(self.db, self.tx.as_ref(), true, &record.id())
    }
}
