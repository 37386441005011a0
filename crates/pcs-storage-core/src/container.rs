//! Document-backed key/value container.
//!
//! Every logical `(collection_id, key)` pair of a tenant lives in the same
//! physical document collection. The physical collection is resolved per
//! call through a [`CollectionResolver`], so relocating a tenant only needs
//! a configuration change.
//!
//! ## Document ids
//!
//! The physical primary key is `lowercase(collection_id) + "." +
//! lowercase(key)`. Two pairs that differ only in case share a document.
//! Keys containing `.` can in theory collide across collections; that is
//! accepted and not guarded against.
//!
//! ## Error translation
//!
//! Store errors go through the injected [`ErrorClassifier`]:
//!
//! | operation | not found | conflict | precondition failed | other |
//! |-----------|-----------|----------|---------------------|-------|
//! | `get`     | `NotFound` | `Storage` | `Storage` | `Storage` |
//! | `create`  | `Storage` | `Conflict` | `Conflict` | `Storage` |
//! | `upsert`  | `Conflict` (conditional) | `Conflict` | `Conflict` | `Storage` |
//! | `delete`  | success | `Storage` | `Storage` | `Storage` |
//!
//! `Storage` keeps the store's error as its source, unchanged.

use async_trait::async_trait;
use std::sync::Arc;

use crate::classifier::{ErrorClassifier, StoreErrorKind};
use crate::collection::{CachedCollectionResolver, CollectionResolver, ConfigSource};
use crate::config::Config;
use crate::document::{DocumentStore, NewDocument, WriteCondition};
use crate::error::{KvError, Result};
use crate::metrics::record_store_error;
use crate::store::{ETAG_ANY, KeyValueRecord, KeyValueStore};
use crate::tenant::{DocumentDataType, TenantId};

/// Returns the physical document id for a logical pair.
///
/// # Example
///
/// ```rust
/// use pcs_storage_core::container::document_id;
///
/// assert_eq!(document_id("Locks", "Migration-1"), "locks.migration-1");
/// assert_eq!(document_id("Coll", "Key"), document_id("coll", "key"));
/// ```
#[must_use]
pub fn document_id(collection_id: &str, key: &str) -> String {
    format!("{}.{}", collection_id.to_lowercase(), key.to_lowercase())
}

fn validate(collection_id: &str, key: Option<&str>) -> Result<()> {
    if collection_id.is_empty() {
        return Err(KvError::InvalidInput(
            "collection id cannot be empty".to_string(),
        ));
    }
    if key.is_some_and(str::is_empty) {
        return Err(KvError::InvalidInput(format!(
            "key cannot be empty (collection {collection_id})"
        )));
    }
    Ok(())
}

/// Key/value container shared by every tenant.
///
/// Generic over the document store `S` and its classifier `C`.
pub struct KeyValueContainer<S, C>
where
    S: DocumentStore,
    C: ErrorClassifier<S::Error>,
{
    store: Arc<S>,
    classifier: C,
    resolver: Arc<dyn CollectionResolver>,
    database_id: String,
    data_type: DocumentDataType,
}

impl<S, C> KeyValueContainer<S, C>
where
    S: DocumentStore,
    C: ErrorClassifier<S::Error>,
{
    /// Creates a container storing [`DocumentDataType::Pcs`] documents in
    /// `database_id`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        classifier: C,
        resolver: Arc<dyn CollectionResolver>,
        database_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            classifier,
            resolver,
            database_id: database_id.into(),
            data_type: DocumentDataType::Pcs,
        }
    }

    /// Creates a container from [`Config`], resolving tenant collections
    /// through `source` cached for the configured TTL.
    #[must_use]
    pub fn from_config<Src: ConfigSource + ?Sized>(
        store: Arc<S>,
        classifier: C,
        source: Arc<Src>,
        config: &Config,
    ) -> Self {
        let resolver = Arc::new(CachedCollectionResolver::new(
            source,
            config.collection_cache_ttl(),
        ));
        Self::new(store, classifier, resolver, config.database_id.clone())
    }

    /// Uses `data_type` for tenant collection resolution.
    #[must_use]
    pub fn with_data_type(mut self, data_type: DocumentDataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Returns the database id.
    #[must_use]
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Returns a view bound to `tenant`.
    #[must_use]
    pub fn scoped(self: &Arc<Self>, tenant: TenantId) -> ScopedContainer<S, C> {
        ScopedContainer {
            container: Arc::clone(self),
            tenant,
        }
    }

    async fn physical_collection(&self, tenant: &TenantId) -> Result<String> {
        self.resolver
            .physical_collection_id(tenant, self.data_type)
            .await
    }

    fn kind_of(&self, operation: &'static str, error: &S::Error) -> Option<StoreErrorKind> {
        let kind = self.classifier.classify(error);
        record_store_error(operation, kind.map_or("unclassified", StoreErrorKind::as_str));
        kind
    }

    fn unclassified(&self, operation: &'static str, error: S::Error) -> KvError {
        tracing::warn!(operation, error = %error, "unclassified document store error");
        KvError::storage_with_source(format!("{operation} failed"), error)
    }

    /// Reads one record.
    ///
    /// # Errors
    ///
    /// [`KvError::NotFound`] if no document exists; other store failures
    /// as [`KvError::Storage`].
    #[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn get(
        &self,
        tenant: &TenantId,
        collection_id: &str,
        key: &str,
    ) -> Result<KeyValueRecord> {
        validate(collection_id, Some(key))?;
        let physical = self.physical_collection(tenant).await?;
        let id = document_id(collection_id, key);

        match self
            .store
            .read_document(&self.database_id, &physical, &id)
            .await
        {
            Ok(document) => Ok(KeyValueRecord::from_document(document)),
            Err(e) => match self.kind_of("get", &e) {
                Some(StoreErrorKind::NotFound) => Err(KvError::not_found(collection_id, key)),
                _ => Err(self.unclassified("get", e)),
            },
        }
    }

    /// Reads every record of a logical collection.
    ///
    /// Scans the tenant's whole physical collection and filters on the
    /// `collectionId` field. There is no pagination.
    ///
    /// # Errors
    ///
    /// Store failures as [`KvError::Storage`].
    #[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn get_all(
        &self,
        tenant: &TenantId,
        collection_id: &str,
    ) -> Result<Vec<KeyValueRecord>> {
        validate(collection_id, None)?;
        let physical = self.physical_collection(tenant).await?;

        let documents = match self
            .store
            .query_all_documents(&self.database_id, &physical)
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                self.kind_of("get_all", &e);
                return Err(self.unclassified("get_all", e));
            }
        };

        Ok(documents
            .into_iter()
            .filter(|doc| doc.collection_id == collection_id)
            .map(KeyValueRecord::from_document)
            .collect())
    }

    /// Inserts a new record, relying on the store to reject duplicates.
    ///
    /// # Errors
    ///
    /// [`KvError::Conflict`] if the document id is already taken.
    #[tracing::instrument(skip(self, tenant, data), fields(tenant = %tenant))]
    pub async fn create(
        &self,
        tenant: &TenantId,
        collection_id: &str,
        key: &str,
        data: &str,
    ) -> Result<KeyValueRecord> {
        validate(collection_id, Some(key))?;
        let physical = self.physical_collection(tenant).await?;
        let document = NewDocument {
            id: document_id(collection_id, key),
            collection_id: collection_id.to_string(),
            key: key.to_string(),
            data: data.to_string(),
        };

        match self
            .store
            .create_document(&self.database_id, &physical, document)
            .await
        {
            Ok(document) => Ok(KeyValueRecord::from_document(document)),
            Err(e) => match self.kind_of("create", &e) {
                Some(StoreErrorKind::Conflict | StoreErrorKind::PreconditionFailed) => Err(
                    KvError::conflict(collection_id, key, "record already exists"),
                ),
                _ => Err(self.unclassified("create", e)),
            },
        }
    }

    /// Inserts or replaces a record.
    ///
    /// `expected_etag` of `None` or `"*"` writes unconditionally. Any other
    /// value makes the write conditional on the stored etag.
    ///
    /// # Errors
    ///
    /// [`KvError::Conflict`] when a conditional write finds a different
    /// (or no) stored version.
    #[tracing::instrument(skip(self, tenant, data), fields(tenant = %tenant))]
    pub async fn upsert(
        &self,
        tenant: &TenantId,
        collection_id: &str,
        key: &str,
        data: &str,
        expected_etag: Option<&str>,
    ) -> Result<KeyValueRecord> {
        validate(collection_id, Some(key))?;
        let physical = self.physical_collection(tenant).await?;
        let condition = match expected_etag {
            None | Some(ETAG_ANY) => WriteCondition::Unconditional,
            Some(etag) => WriteCondition::IfMatch(etag.to_string()),
        };
        let conditional = matches!(condition, WriteCondition::IfMatch(_));
        let document = NewDocument {
            id: document_id(collection_id, key),
            collection_id: collection_id.to_string(),
            key: key.to_string(),
            data: data.to_string(),
        };

        match self
            .store
            .upsert_document(&self.database_id, &physical, document, condition)
            .await
        {
            Ok(document) => Ok(KeyValueRecord::from_document(document)),
            Err(e) => match self.kind_of("upsert", &e) {
                Some(StoreErrorKind::Conflict | StoreErrorKind::PreconditionFailed) => Err(
                    KvError::conflict(collection_id, key, "etag does not match stored version"),
                ),
                Some(StoreErrorKind::NotFound) if conditional => Err(KvError::conflict(
                    collection_id,
                    key,
                    "etag given for a record that does not exist",
                )),
                _ => Err(self.unclassified("upsert", e)),
            },
        }
    }

    /// Deletes a record. Deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Store failures other than not-found as [`KvError::Storage`].
    #[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn delete(&self, tenant: &TenantId, collection_id: &str, key: &str) -> Result<()> {
        validate(collection_id, Some(key))?;
        let physical = self.physical_collection(tenant).await?;
        let id = document_id(collection_id, key);

        match self
            .store
            .delete_document(&self.database_id, &physical, &id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => match self.kind_of("delete", &e) {
                Some(StoreErrorKind::NotFound) => {
                    tracing::debug!(document_id = %id, "delete of absent record ignored");
                    Ok(())
                }
                _ => Err(self.unclassified("delete", e)),
            },
        }
    }
}

/// A [`KeyValueContainer`] bound to one tenant.
pub struct ScopedContainer<S, C>
where
    S: DocumentStore,
    C: ErrorClassifier<S::Error>,
{
    container: Arc<KeyValueContainer<S, C>>,
    tenant: TenantId,
}

// Manual Clone to avoid requiring S: Clone and C: Clone.
impl<S, C> Clone for ScopedContainer<S, C>
where
    S: DocumentStore,
    C: ErrorClassifier<S::Error>,
{
    fn clone(&self) -> Self {
        Self {
            container: Arc::clone(&self.container),
            tenant: self.tenant.clone(),
        }
    }
}

impl<S, C> ScopedContainer<S, C>
where
    S: DocumentStore,
    C: ErrorClassifier<S::Error>,
{
    /// Returns the tenant this view is bound to.
    #[must_use]
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

#[async_trait]
impl<S, C> KeyValueStore for ScopedContainer<S, C>
where
    S: DocumentStore,
    C: ErrorClassifier<S::Error>,
{
    async fn get(&self, collection_id: &str, key: &str) -> Result<KeyValueRecord> {
        self.container.get(&self.tenant, collection_id, key).await
    }

    async fn get_all(&self, collection_id: &str) -> Result<Vec<KeyValueRecord>> {
        self.container.get_all(&self.tenant, collection_id).await
    }

    async fn create(&self, collection_id: &str, key: &str, data: &str) -> Result<KeyValueRecord> {
        self.container
            .create(&self.tenant, collection_id, key, data)
            .await
    }

    async fn upsert(
        &self,
        collection_id: &str,
        key: &str,
        data: &str,
        expected_etag: Option<&str>,
    ) -> Result<KeyValueRecord> {
        self.container
            .upsert(&self.tenant, collection_id, key, data, expected_etag)
            .await
    }

    async fn delete(&self, collection_id: &str, key: &str) -> Result<()> {
        self.container.delete(&self.tenant, collection_id, key).await
    }
}
