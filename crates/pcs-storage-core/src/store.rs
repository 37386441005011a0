//! The key/value surface exposed to higher layers.
//!
//! [`KeyValueStore`] is what the storage mutex and service code program
//! against. [`ScopedContainer`](crate::container::ScopedContainer) is the
//! document-backed implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

use crate::document::Document;
use crate::error::Result;

/// Metadata entry naming the record type.
pub const METADATA_TYPE: &str = "$type";
/// Metadata entry holding the RFC 3339 last-modified time.
pub const METADATA_MODIFIED: &str = "$modified";
/// Metadata entry holding the record's resource path.
pub const METADATA_URI: &str = "$uri";

/// Wildcard etag: matches any stored version, making an upsert
/// unconditional.
pub const ETAG_ANY: &str = "*";

/// A value stored under `(collection_id, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueRecord {
    /// Logical collection.
    pub collection_id: String,
    /// Logical key.
    pub key: String,
    /// Opaque payload.
    pub data: String,
    /// Version token for conditional upserts.
    pub etag: String,
    /// Store-assigned last write time.
    pub timestamp: DateTime<Utc>,
    /// `$type`, `$modified` and `$uri` entries.
    pub metadata: BTreeMap<String, String>,
}

impl KeyValueRecord {
    /// Builds a record from a stored document.
    #[must_use]
    pub fn from_document(document: Document) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_TYPE.to_string(), "Value".to_string());
        metadata.insert(
            METADATA_MODIFIED.to_string(),
            document
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        metadata.insert(
            METADATA_URI.to_string(),
            format!(
                "/v1/collections/{}/values/{}",
                document.collection_id, document.key
            ),
        );

        Self {
            collection_id: document.collection_id,
            key: document.key,
            data: document.data,
            etag: document.etag,
            timestamp: document.timestamp,
            metadata,
        }
    }

    /// Returns the `$modified` metadata parsed as a UTC time, if present and
    /// well-formed.
    #[must_use]
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get(METADATA_MODIFIED)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// CRUD over `(collection_id, key) -> value` for one tenant.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads one record.
    ///
    /// # Errors
    ///
    /// [`KvError::NotFound`](crate::KvError::NotFound) if absent.
    async fn get(&self, collection_id: &str, key: &str) -> Result<KeyValueRecord>;

    /// Reads every record of a logical collection.
    ///
    /// # Errors
    ///
    /// Propagates store and configuration failures.
    async fn get_all(&self, collection_id: &str) -> Result<Vec<KeyValueRecord>>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// [`KvError::Conflict`](crate::KvError::Conflict) if the key is taken.
    async fn create(&self, collection_id: &str, key: &str, data: &str) -> Result<KeyValueRecord>;

    /// Inserts or replaces a record. `expected_etag` of `None` or
    /// [`ETAG_ANY`] writes unconditionally; any other value must match the
    /// stored etag.
    ///
    /// # Errors
    ///
    /// [`KvError::Conflict`](crate::KvError::Conflict) on etag mismatch.
    async fn upsert(
        &self,
        collection_id: &str,
        key: &str,
        data: &str,
        expected_etag: Option<&str>,
    ) -> Result<KeyValueRecord>;

    /// Deletes a record. Absent records are not an error.
    ///
    /// # Errors
    ///
    /// Propagates store and configuration failures.
    async fn delete(&self, collection_id: &str, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Document {
        Document {
            id: "devicegroups.floor-1".into(),
            collection_id: "devicegroups".into(),
            key: "Floor-1".into(),
            data: "{\"name\":\"floor 1\"}".into(),
            etag: "\"e1\"".into(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T12:00:00.250Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn metadata_is_derived_from_document() {
        let record = KeyValueRecord::from_document(document());

        assert_eq!(record.metadata[METADATA_TYPE], "Value");
        assert_eq!(record.metadata[METADATA_MODIFIED], "2024-03-01T12:00:00.250Z");
        assert_eq!(
            record.metadata[METADATA_URI],
            "/v1/collections/devicegroups/values/Floor-1"
        );
        assert_eq!(record.last_modified(), Some(record.timestamp));
    }

    #[test]
    fn last_modified_tolerates_bad_metadata() {
        let mut record = KeyValueRecord::from_document(document());
        record
            .metadata
            .insert(METADATA_MODIFIED.to_string(), "yesterday".to_string());
        assert_eq!(record.last_modified(), None);

        record.metadata.remove(METADATA_MODIFIED);
        assert_eq!(record.last_modified(), None);
    }
}
