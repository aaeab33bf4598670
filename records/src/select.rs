//! The range selector: batched prefix/range scans with materialization.
//!
//! Reads run in batches of at most [`MAX_BATCH`] rows, advancing the moving
//! boundary between batches (forward scans raise the lower bound to the
//! last seen key plus the tail sentinel; reverse scans lower the exclusive
//! upper bound to the last seen key). When the first row of a batch has an
//! empty value the batch is an index scan: record ids are recovered from
//! the row keys and the bodies fetched in a second, batched pass before
//! materialization.

use bytes::{BufMut, Bytes, BytesMut};
use okv::{BytesRange, RangeOptions, StreamingMode, Transaction};

use crate::error::Result;
use crate::key;
use crate::options::SelectOptions;
use crate::record::{Predicate, Record, RecordType};
use crate::value;

/// Upper bound on rows fetched per range call.
const MAX_BATCH: usize = 1000;

/// The outcome of a scan: materialized records in visit order plus the
/// anchor key for cursor resumption. The anchor follows the last accepted
/// row: forward scans anchor at `key || TAIL`, reverse scans at the raw
/// key.
pub(crate) struct Selection {
    pub(crate) records: Vec<Box<dyn Record>>,
    pub(crate) last_key: Option<Bytes>,
}

/// Resolves option bounds to id-segment bytes, appending the tail sentinel
/// to the upper bound so the range is half-open past every key it covers.
pub(crate) fn resolve_bounds(options: &SelectOptions) -> (Bytes, Bytes) {
    let from = options
        .from
        .clone()
        .unwrap_or_else(|| Bytes::from_static(&[0x00]));
    let to = options.to.as_deref().unwrap_or(&[0xFF]);
    let mut bounded = BytesMut::with_capacity(to.len() + 1);
    bounded.extend_from_slice(to);
    bounded.put_u8(key::TAIL);
    (from, bounded.freeze())
}

/// Selects and materializes records of `record_type` per `options`.
#[tracing::instrument(level = "trace", skip_all, fields(type_id = record_type.id))]
pub(crate) async fn select_records(
    db: u16,
    tx: &dyn Transaction,
    record_type: RecordType,
    options: &SelectOptions,
) -> Result<Selection> {
    let (from, to) = resolve_bounds(options);
    let scan_type = options.index_type.unwrap_or(record_type.id);

    scan_range(
        db,
        tx,
        record_type,
        key::raw_key(db, scan_type, &[from.as_ref()]),
        key::raw_key(db, scan_type, &[to.as_ref()]),
        options.limit,
        options.reverse,
        options.filter.as_ref(),
    )
    .await
}

/// Recovers only the ids covered by the range; no materialization and no
/// predicate.
#[tracing::instrument(level = "trace", skip_all, fields(type_id = type_id))]
pub(crate) async fn select_ids(
    db: u16,
    tx: &dyn Transaction,
    type_id: u16,
    options: &SelectOptions,
) -> Result<Vec<String>> {
    let (from, to) = resolve_bounds(options);
    let rows = tx
        .get_range(
            BytesRange::half_open(
                key::raw_key(db, type_id, &[from.as_ref()]),
                key::raw_key(db, type_id, &[to.as_ref()]),
            ),
            RangeOptions {
                limit: options.limit,
                reverse: options.reverse,
                mode: StreamingMode::Serial,
            },
        )
        .await?;

    rows.iter().map(|row| key::row_id(&row.key)).collect()
}

/// The scan loop over a concrete key range.
///
/// `begin` is inclusive, `end` exclusive; both are full storage keys.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn scan_range(
    db: u16,
    tx: &dyn Transaction,
    record_type: RecordType,
    begin: Bytes,
    end: Bytes,
    limit: usize,
    reverse: bool,
    filter: Option<&Predicate>,
) -> Result<Selection> {
    let mut records: Vec<Box<dyn Record>> = Vec::new();
    let mut last_key: Option<Bytes> = None;

    let bsize = if limit > 0 { limit.min(MAX_BATCH) } else { MAX_BATCH };
    // with a filter, accepted rows per batch are unknown up front, so the
    // range limit is capped per batch; without one the full limit can be
    // fetched in a single range call
    let batch_limit = if filter.is_some() { bsize } else { limit };

    // the boundary that advances between batches
    let mut boundary = if reverse { end.clone() } else { begin.clone() };

    loop {
        if limit > 0 && records.len() >= limit {
            break;
        }

        let batch_range = if reverse {
            BytesRange::half_open(begin.clone(), boundary.clone())
        } else {
            BytesRange::half_open(boundary.clone(), end.clone())
        };

        let mut batch = tx
            .get_range(
                batch_range,
                RangeOptions {
                    limit: batch_limit,
                    reverse,
                    mode: StreamingMode::Serial,
                },
            )
            .await?;

        // zero rows means the range is exhausted
        if batch.is_empty() {
            break;
        }

        // id-only rows: an index scan, hydrate bodies in a second pass
        if batch[0].value.is_empty() {
            let mut futures = Vec::with_capacity(batch.len());
            for row in &batch {
                let id = key::row_id(&row.key)?;
                futures.push(tx.get(key::record_key(db, record_type.id, &id)?));
            }
            for (row, future) in batch.iter_mut().zip(futures) {
                row.value = future.await?.unwrap_or_default();
            }
        }

        for row in &batch {
            if limit > 0 && records.len() >= limit {
                break;
            }

            boundary = if reverse {
                row.key.clone()
            } else {
                let mut advanced = BytesMut::with_capacity(row.key.len() + 1);
                advanced.extend_from_slice(&row.key);
                advanced.put_u8(key::TAIL);
                advanced.freeze()
            };

            let mut record = (record_type.new)(key::row_id(&row.key)?);
            let (_, body) = value::unpack(db, tx, &row.value).await?;
            record.unmarshal(&body)?;

            let keep = match filter {
                Some(predicate) => predicate(record.as_ref())?,
                None => true,
            };
            if keep {
                last_key = Some(boundary.clone());
                records.push(record);
            }
        }
    }

    Ok(Selection { records, last_key })
}
