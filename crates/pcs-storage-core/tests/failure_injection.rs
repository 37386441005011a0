//! Integration tests for store and configuration failures.
//!
//! Errors the classifier does not recognise must reach the caller with the
//! store's own error intact, and must never be mistaken for a lost race.

use std::sync::Arc;
use std::time::Duration;

use pcs_storage_core::collection::{CachedCollectionResolver, StaticConfigSource};
use pcs_storage_core::memory::{MemoryClassifier, MemoryStoreError};
use pcs_storage_core::{KeyValueContainer, KeyValueStore, KvError, StorageMutex, TenantId};
use pcs_storage_test_utils::{
    StoreOp, TestContext, TracingDocumentStore, assert_configuration_error, assert_storage_error,
    unique_tenant,
};

const TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::test]
async fn test_unclassified_error_keeps_store_error_as_source() {
    let ctx = TestContext::new();
    ctx.store.inject_failure("rules.");

    assert_storage_error(ctx.kv.get("rules", "r1").await, "injected failure");
    assert_storage_error(ctx.kv.create("rules", "r1", "v").await, "injected failure");
    assert_storage_error(ctx.kv.upsert("rules", "r1", "v", None).await, "injected failure");
    assert_storage_error(ctx.kv.delete("rules", "r1").await, "injected failure");

    // Other collections are unaffected.
    ctx.kv.create("devicegroups", "g1", "{}").await.unwrap();
}

#[tokio::test]
async fn test_source_downcasts_to_store_error() {
    let ctx = TestContext::new();
    ctx.store.inject_failure_with_status("rules.", 429);

    let err = ctx.kv.get("rules", "r1").await.unwrap_err();
    let KvError::Storage {
        source: Some(source),
        ..
    } = &err
    else {
        panic!("expected storage error");
    };
    let store_err = source
        .downcast_ref::<MemoryStoreError>()
        .expect("source should be the store's error");
    assert_eq!(store_err.status, 429);
}

#[tokio::test]
async fn test_delete_swallows_only_not_found() {
    let ctx = TestContext::new();
    ctx.store.inject_failure_with_status("rules.", 404);
    ctx.kv.delete("rules", "r1").await.unwrap();

    ctx.store.clear_failures();
    ctx.store.inject_failure_with_status("rules.", 500);
    assert_storage_error(ctx.kv.delete("rules", "r1").await, "injected failure");
}

#[tokio::test]
async fn test_get_all_failure_propagates() {
    let ctx = TestContext::new();
    ctx.store.inject_failure("");

    assert_storage_error(ctx.kv.get_all("rules").await, "injected failure");
}

#[tokio::test]
async fn test_missing_tenant_mapping_is_configuration_error() {
    let ctx = TestContext::new();
    let stranger = ctx.container.scoped(unique_tenant());

    assert_configuration_error(stranger.get("rules", "r1").await);
    assert_configuration_error(stranger.delete("rules", "r1").await);
    assert!(ctx.store.operations().is_empty(), "store must not be called");
}

#[tokio::test]
async fn test_blank_tenant_mapping_is_configuration_error() {
    let ctx = TestContext::new();
    ctx.config
        .set(ctx.tenant.collection_config_key(pcs_storage_core::DocumentDataType::Pcs), "  ");

    assert_configuration_error(ctx.kv.create("rules", "r1", "v").await);
}

#[tokio::test]
async fn test_resolver_caches_until_ttl() {
    let tenant = TenantId::new("contoso").unwrap();
    let config = Arc::new(StaticConfigSource::new());
    config.set_collection(&tenant, pcs_storage_core::DocumentDataType::Pcs, "first");
    let store = Arc::new(TracingDocumentStore::new());
    let container = Arc::new(KeyValueContainer::new(
        store.clone(),
        MemoryClassifier::new(),
        Arc::new(CachedCollectionResolver::new(
            config.clone(),
            Duration::from_secs(3600),
        )),
        "pcs-storage",
    ));
    let kv = container.scoped(tenant.clone());

    kv.create("rules", "r1", "v").await.unwrap();
    config.set_collection(&tenant, pcs_storage_core::DocumentDataType::Pcs, "second");
    kv.get("rules", "r1").await.unwrap();

    let collections: Vec<_> = store
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::Create { collection_id, .. } | StoreOp::Read { collection_id, .. } => {
                Some(collection_id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(collections, vec!["first", "first"]);
}

#[tokio::test]
async fn test_mutex_propagates_non_conflict_errors() {
    let ctx = TestContext::new();
    let mutex = ctx.mutex();
    ctx.store.inject_failure("locks.");

    assert_storage_error(mutex.enter("locks", "m", TIMEOUT).await, "injected failure");
    assert_storage_error(mutex.leave("locks", "m").await, "injected failure");

    // One read and one write attempt; nothing is retried.
    assert_eq!(ctx.store.operations().len(), 2);
}

#[tokio::test]
async fn test_mutex_over_trait_object() {
    let ctx = TestContext::new();
    let kv: Arc<dyn KeyValueStore> = ctx.kv.clone();
    let mutex = StorageMutex::new(kv);

    assert!(mutex.enter("locks", "m", TIMEOUT).await.unwrap());
    assert!(mutex.is_held("locks", "m", TIMEOUT).await.unwrap());
}
