//! In-memory document store.
//!
//! Thread-safe via `RwLock`. Not suitable for production, but it keeps the
//! same semantics a document database exposes over REST: failures carry a
//! status code (404, 409, 412) and every write mints a new quoted etag.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use ulid::Ulid;

use crate::classifier::{
    STATUS_CONFLICT, STATUS_NOT_FOUND, STATUS_PRECONDITION_FAILED, StatusCodeClassifier,
    StatusCoded,
};
use crate::document::{Document, DocumentStore, NewDocument, WriteCondition};

const STATUS_INTERNAL: u16 = 500;

/// Error returned by [`MemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct MemoryStoreError {
    /// HTTP-style status code.
    pub status: u16,
    /// Human-readable description.
    pub message: String,
}

impl MemoryStoreError {
    /// Creates an error with the given status.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn poisoned() -> Self {
        Self::new(STATUS_INTERNAL, "lock poisoned")
    }
}

impl StatusCoded for MemoryStoreError {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// Classifier matching [`MemoryStoreError`].
pub type MemoryClassifier = StatusCodeClassifier<MemoryStoreError>;

type CollectionKey = (String, String);

/// In-memory document store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<CollectionKey, HashMap<String, Document>>>>,
}

impl MemoryDocumentStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a physical collection.
    #[must_use]
    pub fn document_count(&self, database_id: &str, collection_id: &str) -> usize {
        self.collections
            .read()
            .map(|c| {
                c.get(&(database_id.to_string(), collection_id.to_string()))
                    .map_or(0, HashMap::len)
            })
            .unwrap_or(0)
    }

    fn stamp(document: NewDocument) -> Document {
        Document {
            id: document.id,
            collection_id: document.collection_id,
            key: document.key,
            data: document.data,
            etag: format!("\"{}\"", Ulid::new()),
            timestamp: Utc::now(),
        }
    }
}

fn collection_key(database_id: &str, collection_id: &str) -> CollectionKey {
    (database_id.to_string(), collection_id.to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    type Error = MemoryStoreError;

    async fn read_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document, MemoryStoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| MemoryStoreError::poisoned())?;

        collections
            .get(&collection_key(database_id, collection_id))
            .and_then(|docs| docs.get(document_id))
            .cloned()
            .ok_or_else(|| {
                MemoryStoreError::new(
                    STATUS_NOT_FOUND,
                    format!("document not found: {document_id}"),
                )
            })
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: NewDocument,
    ) -> Result<Document, MemoryStoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| MemoryStoreError::poisoned())?;
        let docs = collections
            .entry(collection_key(database_id, collection_id))
            .or_default();

        if docs.contains_key(&document.id) {
            return Err(MemoryStoreError::new(
                STATUS_CONFLICT,
                format!("document already exists: {}", document.id),
            ));
        }

        let stored = Self::stamp(document);
        docs.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn upsert_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: NewDocument,
        condition: WriteCondition,
    ) -> Result<Document, MemoryStoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| MemoryStoreError::poisoned())?;
        let docs = collections
            .entry(collection_key(database_id, collection_id))
            .or_default();

        if let WriteCondition::IfMatch(expected) = &condition {
            match docs.get(&document.id) {
                Some(current) if &current.etag == expected => {}
                Some(current) => {
                    return Err(MemoryStoreError::new(
                        STATUS_PRECONDITION_FAILED,
                        format!(
                            "etag mismatch on {}: expected {expected}, found {}",
                            document.id, current.etag
                        ),
                    ));
                }
                None => {
                    return Err(MemoryStoreError::new(
                        STATUS_PRECONDITION_FAILED,
                        format!("etag {expected} given for missing document {}", document.id),
                    ));
                }
            }
        }

        let stored = Self::stamp(document);
        docs.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), MemoryStoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| MemoryStoreError::poisoned())?;

        collections
            .get_mut(&collection_key(database_id, collection_id))
            .and_then(|docs| docs.remove(document_id))
            .map(|_| ())
            .ok_or_else(|| {
                MemoryStoreError::new(
                    STATUS_NOT_FOUND,
                    format!("document not found: {document_id}"),
                )
            })
    }

    async fn query_all_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<Document>, MemoryStoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| MemoryStoreError::poisoned())?;

        Ok(collections
            .get(&collection_key(database_id, collection_id))
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }
}
