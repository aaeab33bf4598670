//! The record contract: what a type must provide to be stored.

use crate::error::Result;
use crate::index::Indexer;

/// An application object with stable identity, a type tag and a serialized
/// body.
///
/// `(type id, id)` uniquely locates one record within a database. The body
/// travels through the value pipeline as opaque bytes; secondary index
/// entries are declared through [`index`](Record::index) and kept
/// consistent by the store across save and drop.
pub trait Record: Send {
    /// The record's identity within its type.
    fn id(&self) -> String;

    /// The type descriptor, carrying the type id and the factory used to
    /// materialize records during selection and pre-image handling.
    fn record_type(&self) -> RecordType;

    /// Serializes the body to bytes.
    fn marshal(&self) -> Result<Vec<u8>>;

    /// Fills the body from bytes previously produced by
    /// [`marshal`](Record::marshal).
    fn unmarshal(&mut self, data: &[u8]) -> Result<()>;

    /// Declares the index entries this record wants live, one
    /// [`Indexer::add`] call per entry. Omission means "not in that index".
    fn index(&self, _indexer: &mut Indexer) -> Result<()> {
        Ok(())
    }
}

/// A record type descriptor: the 16-bit type id and a factory constructing
/// an empty record of that type from an id.
#[derive(Clone, Copy, Debug)]
pub struct RecordType {
    /// Type discriminator, part of every key of this type.
    pub id: u16,

    /// Factory for an empty record with the given id.
    pub new: fn(String) -> Box<dyn Record>,
}

impl RecordType {
    /// Constructs an empty record of this type.
    pub fn new_record(&self, id: impl Into<String>) -> Box<dyn Record> {
        (self.new)(id.into())
    }
}

/// Callback invoked with a record on exists / not-found / not-exists
/// conditions; returning an error aborts the surrounding operation.
pub type RecordHandler<'a> = &'a (dyn Fn(&mut dyn Record) -> Result<()> + Send + Sync);

/// Callback declaring ad-hoc index entries into an [`Indexer`].
pub type IndexHandler<'a> = &'a (dyn Fn(&mut Indexer) -> Result<()> + Send + Sync);

/// A post-unmarshal filter applied during selection. Returning `Ok(false)`
/// skips the record; an error aborts the scan.
pub type Predicate = Box<dyn Fn(&dyn Record) -> Result<bool> + Send + Sync>;
