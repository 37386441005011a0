//! Document store contract consumed by the key/value container.
//!
//! A document store holds JSON-like documents addressed by
//! `(database_id, collection_id, document_id)`. Every write assigns a fresh
//! opaque `etag`, which conditional writes compare against.
//!
//! Errors are store-native (the associated [`DocumentStore::Error`] type).
//! The container never inspects them directly; it asks an
//! [`ErrorClassifier`](crate::classifier::ErrorClassifier) whether an error
//! means not-found, conflict, or precondition-failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Physical primary key.
    pub id: String,
    /// Logical collection, kept as a field so scans can filter on it.
    pub collection_id: String,
    /// Logical key, with the caller's original casing.
    pub key: String,
    /// Opaque payload.
    pub data: String,
    /// Version token assigned by the store on the last write.
    #[serde(rename = "_etag")]
    pub etag: String,
    /// Time of the last write.
    #[serde(rename = "_ts")]
    pub timestamp: DateTime<Utc>,
}

/// Document body submitted on create/upsert. The store assigns `etag` and
/// `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    /// Physical primary key.
    pub id: String,
    /// Logical collection.
    pub collection_id: String,
    /// Logical key.
    pub key: String,
    /// Opaque payload.
    pub data: String,
}

/// Condition attached to an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Insert or replace regardless of the stored version.
    Unconditional,
    /// Replace only if the stored etag equals the given one.
    IfMatch(String),
}

/// Document database contract.
///
/// Implementations must make each call atomic with respect to the document
/// it touches: `create_document` must reject a duplicate id natively and
/// `upsert_document` with [`WriteCondition::IfMatch`] must compare and
/// write in one step.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Store-native error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads one document. Absence is reported as a store error the
    /// classifier recognises as not-found.
    async fn read_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document, Self::Error>;

    /// Inserts a document, failing if the id is already taken.
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: NewDocument,
    ) -> Result<Document, Self::Error>;

    /// Inserts or replaces a document under `condition`.
    ///
    /// An `IfMatch` against a missing document fails as a precondition
    /// failure.
    async fn upsert_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: NewDocument,
        condition: WriteCondition,
    ) -> Result<Document, Self::Error>;

    /// Deletes a document. Absence is reported as a not-found error.
    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), Self::Error>;

    /// Returns every document in the physical collection.
    ///
    /// **Ordering**: arbitrary. Callers needing a stable order must sort.
    async fn query_all_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<Document>, Self::Error>;
}
