//! Pre-built test fixtures for common test scenarios.

use std::sync::Arc;
use std::time::Duration;

use pcs_storage_core::collection::{CachedCollectionResolver, StaticConfigSource};
use pcs_storage_core::config::{DEFAULT_DATABASE_ID, MutexConfig};
use pcs_storage_core::memory::MemoryClassifier;
use pcs_storage_core::{DocumentDataType, KeyValueContainer, ScopedContainer, StorageMutex, TenantId};

use crate::storage::TracingDocumentStore;

/// Container type every fixture builds.
pub type TestContainer = KeyValueContainer<TracingDocumentStore, MemoryClassifier>;

/// Tenant view of [`TestContainer`].
pub type TestKv = ScopedContainer<TracingDocumentStore, MemoryClassifier>;

/// Retry pacing short enough to keep contention tests fast.
pub const FAST_MUTEX: MutexConfig = MutexConfig {
    backoff_base_ms: 1,
    backoff_max_ms: 10,
};

/// Test context with a tenant wired to a fresh store.
pub struct TestContext {
    /// Shared document store.
    pub store: Arc<TracingDocumentStore>,
    /// Configuration source behind the resolver.
    pub config: Arc<StaticConfigSource>,
    /// Container shared by every tenant of this context.
    pub container: Arc<TestContainer>,
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Physical collection resolved for `tenant`.
    pub physical_collection: String,
    /// Container bound to `tenant`.
    pub kv: Arc<TestKv>,
}

impl TestContext {
    /// Creates a new test context with a unique tenant.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tenant(unique_tenant())
    }

    /// Creates a context for a specific tenant.
    #[must_use]
    pub fn with_tenant(tenant: TenantId) -> Self {
        Self::with_store(tenant, TracingDocumentStore::new())
    }

    /// Creates a context whose store delays every call by `latency`,
    /// widening the window between a read and the write that follows it.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self::with_store(unique_tenant(), TracingDocumentStore::with_latency(latency))
    }

    fn with_store(tenant: TenantId, store: TracingDocumentStore) -> Self {
        let store = Arc::new(store);
        let config = Arc::new(StaticConfigSource::new());
        // Zero TTL so tests that edit the config see it immediately.
        let resolver = Arc::new(CachedCollectionResolver::new(
            Arc::clone(&config),
            Duration::ZERO,
        ));
        let container = Arc::new(KeyValueContainer::new(
            Arc::clone(&store),
            MemoryClassifier::new(),
            resolver,
            DEFAULT_DATABASE_ID,
        ));

        let physical_collection = format!("pcs-{tenant}");
        config.set_collection(&tenant, DocumentDataType::Pcs, physical_collection.clone());
        let kv = Arc::new(container.scoped(tenant.clone()));

        Self {
            store,
            config,
            container,
            tenant,
            physical_collection,
            kv,
        }
    }

    /// Registers another tenant on the same store and returns its view.
    #[must_use]
    pub fn add_tenant(&self, tenant: &TenantId) -> Arc<TestKv> {
        self.config
            .set_collection(tenant, DocumentDataType::Pcs, format!("pcs-{tenant}"));
        Arc::new(self.container.scoped(tenant.clone()))
    }

    /// Returns a mutex over this tenant with fast retry pacing.
    #[must_use]
    pub fn mutex(&self) -> StorageMutex<TestKv> {
        StorageMutex::with_config(Arc::clone(&self.kv), FAST_MUTEX)
    }

    /// Returns the stored etag of a logical record, if present.
    pub async fn stored_etag(&self, collection_id: &str, key: &str) -> Option<String> {
        self.store
            .etag(
                DEFAULT_DATABASE_ID,
                &self.physical_collection,
                &pcs_storage_core::document_id(collection_id, key),
            )
            .await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a tenant id that no other test uses.
#[must_use]
pub fn unique_tenant() -> TenantId {
    TenantId::new(format!("test-tenant-{}", ulid::Ulid::new().to_string().to_lowercase()))
        .expect("generated tenant id is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcs_storage_core::KeyValueStore;

    #[test]
    fn unique_tenants_differ() {
        assert_ne!(unique_tenant(), unique_tenant());
    }

    #[tokio::test]
    async fn context_is_ready_to_use() {
        let ctx = TestContext::new();
        let created = ctx.kv.create("rules", "r1", "v1").await.unwrap();
        assert_eq!(ctx.stored_etag("Rules", "R1").await, Some(created.etag));
    }

    #[tokio::test]
    async fn added_tenants_share_the_store() {
        let ctx = TestContext::new();
        let other = ctx.add_tenant(&unique_tenant());

        ctx.kv.create("rules", "r1", "mine").await.unwrap();
        other.create("rules", "r1", "theirs").await.unwrap();

        assert_eq!(ctx.kv.get("rules", "r1").await.unwrap().data, "mine");
        assert_eq!(other.get("rules", "r1").await.unwrap().data, "theirs");
        assert_eq!(ctx.store.operations().len(), 4);
    }
}
