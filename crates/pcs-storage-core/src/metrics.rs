//! Storage metrics.
//!
//! Counters for mutex contention and classified store errors. These
//! complement the structured logging already in place.

use metrics::{counter, describe_counter};

// ============================================================================
// Mutex Metrics
// ============================================================================

/// Mutex acquisitions counter.
pub const MUTEX_ACQUIRED: &str = "pcs_storage_mutex_acquired_total";

/// Mutex enter calls that found the lock held.
pub const MUTEX_BUSY: &str = "pcs_storage_mutex_busy_total";

/// Conditional writes lost to another instance during `enter`.
pub const MUTEX_CONFLICT_RETRY: &str = "pcs_storage_mutex_conflict_retry_total";

/// Held locks reclaimed after their timeout.
pub const MUTEX_RECLAIMED: &str = "pcs_storage_mutex_reclaimed_total";

// ============================================================================
// Store Metrics
// ============================================================================

/// Store errors by classified kind (`unclassified` for the rest).
pub const STORE_ERRORS: &str = "pcs_storage_store_errors_total";

/// Registers all metric descriptions.
///
/// Call this once at application startup after installing a recorder.
pub fn register_metrics() {
    describe_counter!(MUTEX_ACQUIRED, "Total storage mutex acquisitions");
    describe_counter!(MUTEX_BUSY, "Total storage mutex enter calls that found the lock held");
    describe_counter!(
        MUTEX_CONFLICT_RETRY,
        "Total storage mutex retries after a lost conditional write"
    );
    describe_counter!(MUTEX_RECLAIMED, "Total stale storage mutex locks reclaimed");
    describe_counter!(STORE_ERRORS, "Total document store errors by kind");
}

/// Records a successful `enter`.
pub fn record_mutex_acquired(collection_id: &str) {
    counter!(MUTEX_ACQUIRED, "collection" => collection_id.to_string()).increment(1);
}

/// Records an `enter` that returned busy.
pub fn record_mutex_busy(collection_id: &str) {
    counter!(MUTEX_BUSY, "collection" => collection_id.to_string()).increment(1);
}

/// Records a conflict retry inside `enter`.
pub fn record_mutex_conflict_retry(collection_id: &str) {
    counter!(MUTEX_CONFLICT_RETRY, "collection" => collection_id.to_string()).increment(1);
}

/// Records a stale lock being reclaimed.
pub fn record_mutex_reclaimed(collection_id: &str) {
    counter!(MUTEX_RECLAIMED, "collection" => collection_id.to_string()).increment(1);
}

/// Records a store error.
pub fn record_store_error(operation: &'static str, kind: &'static str) {
    counter!(STORE_ERRORS, "operation" => operation, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        register_metrics();
        record_mutex_acquired("locks");
        record_mutex_busy("locks");
        record_mutex_conflict_retry("locks");
        record_mutex_reclaimed("locks");
        record_store_error("get", "unclassified");
    }
}
