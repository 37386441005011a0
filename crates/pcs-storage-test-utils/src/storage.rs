//! Test document store with operation tracing.
//!
//! Wraps [`MemoryDocumentStore`] and records every call for test
//! assertions. Failures and lost races can be injected per document id.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pcs_storage_core::classifier::STATUS_PRECONDITION_FAILED;
use pcs_storage_core::document::{Document, DocumentStore, NewDocument, WriteCondition};
use pcs_storage_core::memory::{MemoryDocumentStore, MemoryStoreError};

/// Status used for injected failures unless told otherwise.
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Record of a store operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `read_document`.
    Read {
        /// Physical collection.
        collection_id: String,
        /// Document id.
        document_id: String,
    },
    /// `create_document`.
    Create {
        /// Physical collection.
        collection_id: String,
        /// Document id.
        document_id: String,
    },
    /// `upsert_document`.
    Upsert {
        /// Physical collection.
        collection_id: String,
        /// Document id.
        document_id: String,
        /// Condition used.
        condition: WriteCondition,
    },
    /// `delete_document`.
    Delete {
        /// Physical collection.
        collection_id: String,
        /// Document id.
        document_id: String,
    },
    /// `query_all_documents`.
    QueryAll {
        /// Physical collection.
        collection_id: String,
    },
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    document_prefix: String,
    status: u16,
}

/// In-memory document store with operation tracing.
#[derive(Debug, Clone, Default)]
pub struct TracingDocumentStore {
    inner: MemoryDocumentStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    failures: Arc<Mutex<Vec<InjectedFailure>>>,
    lost_races: Arc<Mutex<u32>>,
    latency: Option<Duration>,
}

impl TracingDocumentStore {
    /// Creates a new empty tracing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with simulated latency on every call.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns recorded upserts only.
    #[must_use]
    pub fn upserts(&self) -> Vec<StoreOp> {
        self.operations()
            .into_iter()
            .filter(|op| matches!(op, StoreOp::Upsert { .. }))
            .collect()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Fails every call touching a document id starting with `prefix`
    /// with a 503. An empty prefix also fails collection scans.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.inject_failure_with_status(prefix, STATUS_SERVICE_UNAVAILABLE);
    }

    /// Like [`TracingDocumentStore::inject_failure`] with a chosen status.
    pub fn inject_failure_with_status(&self, prefix: impl Into<String>, status: u16) {
        self.failures.lock().expect("lock").push(InjectedFailure {
            document_prefix: prefix.into(),
            status,
        });
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().expect("lock").clear();
    }

    /// Makes the next `count` conditional upserts fail with 412, as if
    /// another writer got there first, without touching stored data.
    pub fn inject_lost_races(&self, count: u32) {
        *self.lost_races.lock().expect("lock") = count;
    }

    /// Returns the current etag of a document, if stored.
    pub async fn etag(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Option<String> {
        self.inner
            .read_document(database_id, collection_id, document_id)
            .await
            .ok()
            .map(|d| d.etag)
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, document_id: &str) -> Result<(), MemoryStoreError> {
        let failures = self.failures.lock().expect("lock");
        match failures
            .iter()
            .find(|f| document_id.starts_with(&f.document_prefix))
        {
            Some(f) => Err(MemoryStoreError::new(
                f.status,
                format!("injected failure for document: {document_id}"),
            )),
            None => Ok(()),
        }
    }

    fn take_lost_race(&self) -> bool {
        let mut remaining = self.lost_races.lock().expect("lock");
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DocumentStore for TracingDocumentStore {
    type Error = MemoryStoreError;

    async fn read_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document, MemoryStoreError> {
        self.maybe_delay().await;
        self.record(StoreOp::Read {
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
        });
        self.check_failure(document_id)?;
        self.inner
            .read_document(database_id, collection_id, document_id)
            .await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: NewDocument,
    ) -> Result<Document, MemoryStoreError> {
        self.maybe_delay().await;
        self.record(StoreOp::Create {
            collection_id: collection_id.to_string(),
            document_id: document.id.clone(),
        });
        self.check_failure(&document.id)?;
        self.inner
            .create_document(database_id, collection_id, document)
            .await
    }

    async fn upsert_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: NewDocument,
        condition: WriteCondition,
    ) -> Result<Document, MemoryStoreError> {
        self.maybe_delay().await;
        self.record(StoreOp::Upsert {
            collection_id: collection_id.to_string(),
            document_id: document.id.clone(),
            condition: condition.clone(),
        });
        self.check_failure(&document.id)?;

        if matches!(condition, WriteCondition::IfMatch(_)) && self.take_lost_race() {
            return Err(MemoryStoreError::new(
                STATUS_PRECONDITION_FAILED,
                format!("injected lost race on {}", document.id),
            ));
        }

        self.inner
            .upsert_document(database_id, collection_id, document, condition)
            .await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), MemoryStoreError> {
        self.maybe_delay().await;
        self.record(StoreOp::Delete {
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
        });
        self.check_failure(document_id)?;
        self.inner
            .delete_document(database_id, collection_id, document_id)
            .await
    }

    async fn query_all_documents(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<Document>, MemoryStoreError> {
        self.maybe_delay().await;
        self.record(StoreOp::QueryAll {
            collection_id: collection_id.to_string(),
        });
        self.check_failure("")?;
        self.inner
            .query_all_documents(database_id, collection_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> NewDocument {
        NewDocument {
            id: id.to_string(),
            collection_id: "locks".to_string(),
            key: id.to_string(),
            data: "false".to_string(),
        }
    }

    #[tokio::test]
    async fn records_operations() {
        let store = TracingDocumentStore::new();

        store
            .upsert_document("db", "c", doc("locks.a"), WriteCondition::Unconditional)
            .await
            .expect("upsert");
        let _ = store.read_document("db", "c", "locks.a").await;
        let _ = store.query_all_documents("db", "c").await;

        let ops = store.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], StoreOp::Upsert { .. }));
        assert!(matches!(ops[1], StoreOp::Read { .. }));
        assert!(matches!(ops[2], StoreOp::QueryAll { .. }));
    }

    #[tokio::test]
    async fn failure_injection_by_prefix() {
        let store = TracingDocumentStore::new();
        store.inject_failure("locks.");

        let err = store.read_document("db", "c", "locks.a").await.unwrap_err();
        assert_eq!(err.status, STATUS_SERVICE_UNAVAILABLE);

        store
            .create_document("db", "c", doc("rules.a"))
            .await
            .expect("other prefixes still work");
    }

    #[tokio::test]
    async fn lost_races_only_hit_conditional_writes() {
        let store = TracingDocumentStore::new();
        let first = store
            .upsert_document("db", "c", doc("locks.a"), WriteCondition::Unconditional)
            .await
            .unwrap();
        store.inject_lost_races(1);

        store
            .upsert_document("db", "c", doc("locks.a"), WriteCondition::Unconditional)
            .await
            .expect("unconditional write is not affected");

        let current = store.etag("db", "c", "locks.a").await.unwrap();
        assert_ne!(current, first.etag);
        let err = store
            .upsert_document("db", "c", doc("locks.a"), WriteCondition::IfMatch(current.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, STATUS_PRECONDITION_FAILED);

        store
            .upsert_document("db", "c", doc("locks.a"), WriteCondition::IfMatch(current))
            .await
            .expect("race budget is spent");
    }
}
