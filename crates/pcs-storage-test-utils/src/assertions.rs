//! Custom assertion helpers for storage tests.

use std::fmt::Debug;

use pcs_storage_core::KvError;

use crate::storage::StoreOp;

/// Asserts that a result failed with [`KvError::NotFound`].
///
/// # Panics
///
/// Panics on success or on any other error.
pub fn assert_not_found<T: Debug>(result: Result<T, KvError>) {
    match result {
        Err(KvError::NotFound { .. }) => {}
        other => panic!("Expected NotFound, got {other:?}"),
    }
}

/// Asserts that a result failed with [`KvError::Conflict`].
///
/// # Panics
///
/// Panics on success or on any other error.
pub fn assert_conflict<T: Debug>(result: Result<T, KvError>) {
    match result {
        Err(KvError::Conflict { .. }) => {}
        other => panic!("Expected Conflict, got {other:?}"),
    }
}

/// Asserts that a result failed with [`KvError::Storage`] whose source
/// renders as something containing `needle`.
///
/// # Panics
///
/// Panics on success, on any other error, or if the source is missing.
pub fn assert_storage_error<T: Debug>(result: Result<T, KvError>, needle: &str) {
    match result {
        Err(KvError::Storage {
            source: Some(source),
            ..
        }) => assert!(
            source.to_string().contains(needle),
            "Expected storage source containing {needle:?}, got {source}"
        ),
        other => panic!("Expected Storage with source, got {other:?}"),
    }
}

/// Asserts that a result failed with [`KvError::Configuration`].
///
/// # Panics
///
/// Panics on success or on any other error.
pub fn assert_configuration_error<T: Debug>(result: Result<T, KvError>) {
    match result {
        Err(KvError::Configuration { .. }) => {}
        other => panic!("Expected Configuration, got {other:?}"),
    }
}

/// Asserts that no write reached the store.
///
/// # Panics
///
/// Panics if any create, upsert or delete was recorded.
pub fn assert_no_writes(ops: &[StoreOp]) {
    let writes: Vec<_> = ops
        .iter()
        .filter(|op| {
            matches!(
                op,
                StoreOp::Create { .. } | StoreOp::Upsert { .. } | StoreOp::Delete { .. }
            )
        })
        .collect();
    assert!(writes.is_empty(), "Expected no writes, got {writes:?}");
}
