//! Selection options.
//!
//! A plain builder-struct with all fields defaulted: the full type span,
//! forward iteration, no limit, no filter.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::record::{Predicate, Record};

/// Options controlling [`select`](crate::RecordStore::select),
/// [`select_ids`](crate::RecordStore::select_ids) and cursor creation.
#[derive(Default)]
pub struct SelectOptions {
    pub(crate) from: Option<Bytes>,
    pub(crate) to: Option<Bytes>,
    pub(crate) page: usize,
    pub(crate) limit: usize,
    pub(crate) reverse: bool,
    pub(crate) filter: Option<Predicate>,
    pub(crate) index_type: Option<u16>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower bound on the id segment, inclusive. Default `0x00`.
    pub fn from(mut self, from: impl Into<Bytes>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Upper bound on the id segment. Default `0xFF`.
    pub fn to(mut self, to: impl Into<Bytes>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Selects rows whose id segment starts with `prefix`.
    pub fn query(mut self, prefix: impl Into<Bytes>) -> Self {
        let prefix = prefix.into();
        let mut to = BytesMut::with_capacity(prefix.len() + 1);
        to.extend_from_slice(&prefix);
        to.put_u8(0xFF);
        self.from = Some(prefix);
        self.to = Some(to.freeze());
        self
    }

    /// Page size for cursor iteration. The selector itself ignores this;
    /// the cursor layer is the only consumer.
    pub fn page(mut self, n: usize) -> Self {
        self.page = n;
        self
    }

    /// Maximum number of records to return. Zero (the default) fetches all.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    /// Iterate from the end of the range towards the start.
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Post-unmarshal filter. Returning `Ok(false)` skips the record; an
    /// error aborts the scan.
    pub fn filter(
        mut self,
        predicate: impl Fn(&dyn Record) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Scans the given index type instead of the record type itself; rows
    /// carry only record ids and bodies are fetched in a second batched
    /// pass.
    pub fn by_index(mut self, index_type_id: u16) -> Self {
        self.index_type = Some(index_type_id);
        self
    }
}

impl std::fmt::Debug for SelectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectOptions")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("page", &self.page)
            .field("limit", &self.limit)
            .field("reverse", &self.reverse)
            .field("filter", &self.filter.is_some())
            .field("index_type", &self.index_type)
            .finish()
    }
}
