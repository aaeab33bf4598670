//! Testing utilities for the record layer.
//!
//! Provides a ready-made record type backed by serde_json so unit and
//! integration tests can exercise the full save/load/select path without
//! declaring their own types.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::Indexer;
use crate::record::{Record, RecordType};

/// Type id used by [`TestRecord`].
pub const TEST_RECORD_TYPE_ID: u16 = 42;

/// Index type id under which [`TestRecord`] tags are declared.
pub const TAG_INDEX_TYPE_ID: u16 = 100;

/// A serde_json-bodied record declaring one index entry per tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl TestRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}

/// The [`RecordType`] descriptor for [`TestRecord`].
pub fn test_record_type() -> RecordType {
    RecordType {
        id: TEST_RECORD_TYPE_ID,
        new: |id| Box::new(TestRecord::new(id)),
    }
}

impl Record for TestRecord {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn record_type(&self) -> RecordType {
        test_record_type()
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::User(format!("test record encoding: {}", e)))
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        *self = serde_json::from_slice(data)
            .map_err(|e| Error::User(format!("test record decoding: {}", e)))?;
        Ok(())
    }

    fn index(&self, indexer: &mut Indexer) -> Result<()> {
        for tag in &self.tags {
            indexer.add(TAG_INDEX_TYPE_ID, tag.clone().into_bytes());
        }
        Ok(())
    }
}

/// Downcasts a selected record back to a [`TestRecord`] through its
/// marshaled form.
pub fn as_test_record(record: &dyn Record) -> TestRecord {
    let mut out = TestRecord::new(record.id());
    let body = record.marshal().expect("test record marshals");
    out.unmarshal(&body).expect("test record unmarshals");
    out
}
