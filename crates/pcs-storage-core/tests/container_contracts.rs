//! Integration tests for the key/value container contract.
//!
//! These run the tenant view against an instrumented store and check the
//! calls that actually reach it, not only the returned values.

use pcs_storage_core::document::WriteCondition;
use pcs_storage_core::{KeyValueStore, document_id};
use pcs_storage_test_utils::{
    StoreOp, TestContext, assert_conflict, assert_no_writes, assert_not_found, unique_tenant,
};
use proptest::prelude::*;

#[tokio::test]
async fn test_create_get_update_delete_lifecycle() {
    let ctx = TestContext::new();

    let created = ctx
        .kv
        .create("devicegroups", "floor-1", r#"{"name":"Floor 1"}"#)
        .await
        .unwrap();
    assert_eq!(created.metadata["$type"], "Value");
    assert_eq!(
        created.metadata["$uri"],
        "/v1/collections/devicegroups/values/floor-1"
    );

    let updated = ctx
        .kv
        .upsert(
            "devicegroups",
            "floor-1",
            r#"{"name":"First floor"}"#,
            Some(&created.etag),
        )
        .await
        .unwrap();
    assert_ne!(updated.etag, created.etag);

    ctx.kv.delete("devicegroups", "floor-1").await.unwrap();
    assert_not_found(ctx.kv.get("devicegroups", "floor-1").await);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let ctx = TestContext::new();
    ctx.kv.create("rules", "r1", "v1").await.unwrap();

    ctx.kv.delete("rules", "r1").await.unwrap();
    ctx.kv.delete("rules", "r1").await.unwrap();

    let deletes = ctx
        .store
        .operations()
        .into_iter()
        .filter(|op| matches!(op, StoreOp::Delete { .. }))
        .count();
    assert_eq!(deletes, 2, "both deletes should reach the store");
}

#[tokio::test]
async fn test_duplicate_create_conflicts_and_keeps_first_value() {
    let ctx = TestContext::new();
    ctx.kv.create("rules", "r1", "first").await.unwrap();

    assert_conflict(ctx.kv.create("RULES", "r1", "second").await);
    assert_eq!(ctx.kv.get("rules", "r1").await.unwrap().data, "first");
}

/// E1 read, E2 written by someone else, then a write with E1 must fail.
#[tokio::test]
async fn test_conditional_upsert_rejects_superseded_etag() {
    let ctx = TestContext::new();
    let e1 = ctx.kv.create("rules", "r1", "v1").await.unwrap().etag;

    let e2 = ctx
        .kv
        .upsert("rules", "r1", "theirs", Some(&e1))
        .await
        .unwrap()
        .etag;

    assert_conflict(ctx.kv.upsert("rules", "r1", "mine", Some(&e1)).await);

    let stored = ctx.kv.get("rules", "r1").await.unwrap();
    assert_eq!(stored.data, "theirs");
    assert_eq!(stored.etag, e2);
}

#[tokio::test]
async fn test_conditional_upsert_sends_if_match() {
    let ctx = TestContext::new();
    let e1 = ctx.kv.create("rules", "r1", "v1").await.unwrap().etag;
    ctx.store.clear_operations();

    ctx.kv.upsert("rules", "r1", "v2", Some(&e1)).await.unwrap();
    ctx.kv.upsert("rules", "r1", "v3", Some("*")).await.unwrap();
    ctx.kv.upsert("rules", "r1", "v4", None).await.unwrap();

    let conditions: Vec<_> = ctx
        .store
        .upserts()
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::Upsert { condition, .. } => Some(condition),
            _ => None,
        })
        .collect();
    assert_eq!(
        conditions,
        vec![
            WriteCondition::IfMatch(e1),
            WriteCondition::Unconditional,
            WriteCondition::Unconditional,
        ]
    );
}

#[tokio::test]
async fn test_mixed_case_pairs_share_one_document() {
    let ctx = TestContext::new();
    ctx.kv.create("DeviceGroups", "Floor-1", "a").await.unwrap();
    ctx.kv.upsert("devicegroups", "FLOOR-1", "b", None).await.unwrap();

    let ids: Vec<_> = ctx
        .store
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::Create { document_id, .. } | StoreOp::Upsert { document_id, .. } => {
                Some(document_id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["devicegroups.floor-1", "devicegroups.floor-1"]);
    assert_eq!(ctx.kv.get("devicegroups", "floor-1").await.unwrap().data, "b");
}

#[tokio::test]
async fn test_get_all_scans_whole_tenant_collection() {
    let ctx = TestContext::new();
    for key in ["a", "b", "c"] {
        ctx.kv.create("devicegroups", key, "{}").await.unwrap();
    }
    ctx.kv.create("rules", "r1", "{}").await.unwrap();
    ctx.store.clear_operations();

    let records = ctx.kv.get_all("devicegroups").await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.collection_id == "devicegroups"));

    let ops = ctx.store.operations();
    assert_eq!(
        ops,
        vec![StoreOp::QueryAll {
            collection_id: ctx.physical_collection.clone()
        }]
    );
    assert_no_writes(&ops);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let ctx = TestContext::new();
    let other = ctx.add_tenant(&unique_tenant());

    ctx.kv.create("rules", "r1", "mine").await.unwrap();

    assert_not_found(other.get("rules", "r1").await);
    assert!(other.get_all("rules").await.unwrap().is_empty());
    other.delete("rules", "r1").await.unwrap();
    assert_eq!(ctx.kv.get("rules", "r1").await.unwrap().data, "mine");
}

#[tokio::test]
async fn test_repointing_tenant_collection_takes_effect() {
    let ctx = TestContext::new();
    ctx.kv.create("rules", "r1", "old home").await.unwrap();

    ctx.config.set_collection(
        &ctx.tenant,
        pcs_storage_core::DocumentDataType::Pcs,
        "relocated",
    );

    assert_not_found(ctx.kv.get("rules", "r1").await);
    ctx.kv.create("rules", "r1", "new home").await.unwrap();
    assert_eq!(ctx.kv.get("rules", "r1").await.unwrap().data, "new home");
}

proptest! {
    #[test]
    fn document_id_ignores_case(collection in "[A-Za-z0-9_-]{1,16}", key in "[A-Za-z0-9_-]{1,16}") {
        let id = document_id(&collection, &key);
        prop_assert_eq!(&id, &document_id(&collection.to_uppercase(), &key.to_lowercase()));
        prop_assert_eq!(id, format!("{}.{}", collection.to_lowercase(), key.to_lowercase()));
    }
}
