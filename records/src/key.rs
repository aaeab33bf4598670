//! Key encoding and decoding for record storage.
//!
//! All keys share one flat layout that multiplexes record types, secondary
//! indexes and value chunks inside a single key space:
//!
//! ```text
//! | db (u16 BE) | type (u16 BE) | part bytes ... |
//! ```
//!
//! Keys that must be parsed back (record keys and index entry keys) end
//! with a one-byte id length so the record id can be recovered from the key
//! alone:
//!
//! ```text
//! record key: | db | type       | id bytes          | id_len (u8) |
//! index key:  | db | index type | index key | id    | id_len (u8) |
//! chunk key:  | db | 0xFFFF     | blob uuid (16)    | seq (u16 BE) |
//! ```
//!
//! Ordering is strict byte-lexicographic, so range iteration over a
//! `(db, type)` prefix yields ids in lexicographic order.

use bytes::{BufMut, Bytes, BytesMut};
use okv::BytesRange;

use crate::error::{Error, Result};

/// Reserved type id under which chunk blobs are stored.
pub const CHUNK_TYPE_ID: u16 = 0xFFFF;

/// Reserved type id under which persisted cursors are stored.
pub const CURSOR_TYPE_ID: u16 = 0xFFFE;

/// Sentinel byte appended to upper bounds to make prefix ranges half-open.
pub(crate) const TAIL: u8 = 0xFF;

/// Maximum length of a record id in bytes; the id length must fit the
/// trailing length byte.
pub(crate) const MAX_ID_LEN: usize = u8::MAX as usize;

/// Builds a raw key `db || type || part_1 || ... || part_n`.
pub(crate) fn raw_key(db: u16, type_id: u16, parts: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + parts.iter().map(|p| p.len()).sum::<usize>());
    buf.put_u16(db);
    buf.put_u16(type_id);
    for part in parts {
        buf.extend_from_slice(part);
    }
    buf.freeze()
}

/// Builds the storage key for a record: `db || type || id || id_len`.
pub(crate) fn record_key(db: u16, type_id: u16, id: &str) -> Result<Bytes> {
    let id = id.as_bytes();
    if id.len() > MAX_ID_LEN {
        return Err(Error::InvalidKey(format!(
            "record id is {} bytes, maximum is {}",
            id.len(),
            MAX_ID_LEN
        )));
    }
    Ok(raw_key(db, type_id, &[id, &[id.len() as u8]]))
}

/// Builds an index entry key: `db || index_type || index_key || id || id_len`.
pub(crate) fn index_key(db: u16, index_type_id: u16, index_key: &[u8], id: &str) -> Result<Bytes> {
    let id = id.as_bytes();
    if id.len() > MAX_ID_LEN {
        return Err(Error::InvalidKey(format!(
            "record id is {} bytes, maximum is {}",
            id.len(),
            MAX_ID_LEN
        )));
    }
    Ok(raw_key(
        db,
        index_type_id,
        &[index_key, id, &[id.len() as u8]],
    ))
}

/// Builds the key of one value chunk: `db || CHUNK_TYPE_ID || blob || seq`.
pub(crate) fn chunk_key(db: u16, blob_id: &[u8], seq: u16) -> Bytes {
    raw_key(db, CHUNK_TYPE_ID, &[blob_id, &seq.to_be_bytes()])
}

/// The half-open range covering every chunk of one blob, in sequence order.
pub(crate) fn blob_range(db: u16, blob_id: &[u8]) -> BytesRange {
    BytesRange::half_open(
        raw_key(db, CHUNK_TYPE_ID, &[blob_id]),
        raw_key(db, CHUNK_TYPE_ID, &[blob_id, &[TAIL]]),
    )
}

/// The range used to clear every key of one type.
pub(crate) fn type_clear_range(db: u16, type_id: u16) -> BytesRange {
    BytesRange::half_open(raw_key(db, type_id, &[]), raw_key(db, type_id, &[&[TAIL]]))
}

/// Recovers the record id from a parseable row key.
///
/// Reads the final byte as the id length and slices the id bytes
/// immediately before it. Fails with [`Error::InvalidKey`] when the key is
/// too short for its declared length or the id is not valid UTF-8.
pub(crate) fn row_id(key: &[u8]) -> Result<String> {
    let Some((&len_byte, rest)) = key.split_last() else {
        return Err(Error::InvalidKey("empty row key".to_string()));
    };
    let id_len = len_byte as usize;
    if rest.len() < id_len {
        return Err(Error::InvalidKey(format!(
            "row key declares an id of {} bytes but only {} precede the length byte",
            id_len,
            rest.len()
        )));
    }
    let id = &rest[rest.len() - id_len..];
    String::from_utf8(id.to_vec())
        .map_err(|e| Error::InvalidKey(format!("row id is not valid UTF-8: {}", e)))
}
