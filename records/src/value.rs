//! The value pipeline: packing record bodies for storage and back.
//!
//! Every stored record value starts with one flag byte:
//!
//! ```text
//! | flags (u8) | payload ... |
//! ```
//!
//! - `flags & 0x40`: the payload is gzip-compressed.
//! - `flags & 0x80`: the payload is a 16-byte blob uuid; the actual bytes
//!   live as chunk rows under `db || CHUNK_TYPE_ID || uuid || seq`.
//!
//! All other bits are reserved and must be zero; a value carrying unknown
//! bits is refused on read. Chunk writes ride the surrounding transaction,
//! so a packed value and its chunks commit atomically.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use okv::{RangeOptions, StreamingMode, Transaction};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::key;

pub(crate) const FLAG_GZIP: u8 = 1 << 6;
pub(crate) const FLAG_CHUNK: u8 = 1 << 7;

const RESERVED_MASK: u8 = !(FLAG_GZIP | FLAG_CHUNK);

/// Packs a marshaled body into its stored form, writing chunk rows into the
/// transaction when the payload exceeds the chunk threshold.
pub(crate) fn pack(db: u16, tx: &dyn Transaction, config: &Config, body: Vec<u8>) -> Result<Bytes> {
    let mut flags = 0u8;
    let mut payload = body;

    // so long, try to reduce
    if payload.len() > config.gzip_threshold {
        payload = gzip(&payload)?;
        flags |= FLAG_GZIP;
    }

    // still too long, split off as a chunked blob
    if payload.len() > config.chunk_size {
        payload = save_blob(db, tx, config, &payload).to_vec();
        flags |= FLAG_CHUNK;
    }

    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(flags);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Inverts [`pack`]: splits the flag byte, hydrates chunked payloads from
/// their blob rows and decompresses.
///
/// Returns the blob id (when the value was chunked, so a later drop can
/// clear the chunk range) and the original body.
pub(crate) async fn unpack(
    db: u16,
    tx: &dyn Transaction,
    value: &[u8],
) -> Result<(Option<Bytes>, Vec<u8>)> {
    let Some((&flags, payload)) = value.split_first() else {
        return Err(Error::InvalidValue(
            "stored value is missing its header byte".to_string(),
        ));
    };
    if flags & RESERVED_MASK != 0 {
        return Err(Error::InvalidValue(format!(
            "unknown reserved flag bits 0x{:02x}",
            flags & RESERVED_MASK
        )));
    }

    let mut blob_id = None;
    let mut payload = payload.to_vec();

    if flags & FLAG_CHUNK != 0 {
        let id = Bytes::copy_from_slice(&payload);
        payload = load_blob(db, tx, &id).await?;
        blob_id = Some(id);
    }

    if flags & FLAG_GZIP != 0 {
        payload = gunzip(&payload)?;
    }

    Ok((blob_id, payload))
}

/// Splits `blob` into chunk rows under a fresh blob id and returns the id.
fn save_blob(db: u16, tx: &dyn Transaction, config: &Config, blob: &[u8]) -> [u8; 16] {
    let blob_id = Uuid::new_v4();
    for (seq, part) in blob.chunks(config.chunk_size).enumerate() {
        tx.set(
            key::chunk_key(db, blob_id.as_bytes(), seq as u16),
            Bytes::copy_from_slice(part),
        );
    }
    *blob_id.as_bytes()
}

/// Concatenates the chunk rows of `blob_id` in key order.
async fn load_blob(db: u16, tx: &dyn Transaction, blob_id: &[u8]) -> Result<Vec<u8>> {
    let rows = tx
        .get_range(
            key::blob_range(db, blob_id),
            RangeOptions {
                mode: StreamingMode::Serial,
                ..Default::default()
            },
        )
        .await?;

    let mut blob = Vec::with_capacity(rows.iter().map(|kv| kv.value.len()).sum());
    for row in rows {
        blob.extend_from_slice(&row.value);
    }
    Ok(blob)
}

/// Removes every chunk row of `blob_id`.
pub(crate) fn drop_blob(db: u16, tx: &dyn Transaction, blob_id: &[u8]) {
    tx.clear_range(key::blob_range(db, blob_id));
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::MemFail(format!("gzip write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::MemFail(format!("gzip finish failed: {}", e)))
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::InvalidGzip(format!("gzip stream is malformed: {}", e)))?;
    Ok(out)
}
