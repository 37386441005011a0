//! Advisory mutex built on a key/value store's conditional write.
//!
//! A mutex is one record, `(collection_id, key)`, whose data is `"true"`
//! while held and `"false"` once released. No separate lock service is
//! involved: mutual exclusion comes from the store's etag compare-and-swap.
//!
//! # How It Works
//!
//! 1. `enter` reads the record. A missing record counts as released.
//! 2. If it is held and was written less than `timeout` ago, `enter` returns
//!    `false` without writing.
//! 3. Otherwise `enter` writes `"true"`: a create when the record was
//!    missing, so the store rejects every duplicate, or else an upsert
//!    conditioned on the etag it read. Exactly one racing writer wins;
//!    losers see a conflict, back off, and start again from step 1.
//! 4. `leave` writes `"false"` unconditionally. Any caller may release any
//!    mutex.
//!
//! A holder that crashes never calls `leave`; its mutex becomes reclaimable
//! once `timeout` has passed since its last write. Staleness is judged with
//! the wall clock of the instance calling `enter`.
//!
//! # Example
//!
//! ```rust,ignore
//! let mutex = StorageMutex::new(Arc::new(container.scoped(tenant)));
//!
//! if mutex.enter("locks", "migration-1", Duration::from_secs(30)).await? {
//!     // ... run the migration ...
//!     mutex.leave("locks", "migration-1").await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::MutexConfig;
use crate::error::{KvError, Result};
use crate::metrics::{
    record_mutex_acquired, record_mutex_busy, record_mutex_conflict_retry, record_mutex_reclaimed,
};
use crate::observability::mutex_span;
use crate::store::{ETAG_ANY, KeyValueRecord, KeyValueStore};

/// Data of a held mutex.
pub const HELD: &str = "true";

/// Data of a released mutex.
pub const RELEASED: &str = "false";

/// Maximum random jitter added to each backoff.
const JITTER_MAX_MS: u64 = 50;

/// What `enter` observed on one read.
#[derive(Debug)]
enum Observed {
    /// Free to take, optionally reclaiming a stale holder.
    Available {
        etag: Option<String>,
        reclaim: bool,
    },
    /// Held and not yet stale.
    Busy { last_modified: DateTime<Utc> },
}

fn is_held(record: &KeyValueRecord) -> bool {
    record.data.trim().eq_ignore_ascii_case(HELD)
}

fn observe(current: Option<KeyValueRecord>, timeout: Duration, now: DateTime<Utc>) -> Observed {
    let Some(record) = current else {
        return Observed::Available {
            etag: None,
            reclaim: false,
        };
    };

    if !is_held(&record) {
        return Observed::Available {
            etag: Some(record.etag),
            reclaim: false,
        };
    }

    // Unreadable metadata counts as written at the epoch, i.e. stale.
    let last_modified = record.last_modified().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
    let fresh = now
        .checked_sub_signed(timeout)
        .is_none_or(|cutoff| last_modified > cutoff);

    if fresh {
        Observed::Busy { last_modified }
    } else {
        Observed::Available {
            etag: Some(record.etag),
            reclaim: true,
        }
    }
}

/// Distributed advisory mutex over a [`KeyValueStore`].
pub struct StorageMutex<K: KeyValueStore + ?Sized> {
    store: Arc<K>,
    config: MutexConfig,
}

// Manual Clone implementation to avoid requiring K: Clone.
impl<K: KeyValueStore + ?Sized> Clone for StorageMutex<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<K: KeyValueStore + ?Sized> StorageMutex<K> {
    /// Creates a mutex with default retry pacing.
    #[must_use]
    pub fn new(store: Arc<K>) -> Self {
        Self::with_config(store, MutexConfig::default())
    }

    /// Creates a mutex with the given retry pacing, clamped so that every
    /// retry waits at least 1 ms and the delay can grow.
    #[must_use]
    pub fn with_config(store: Arc<K>, config: MutexConfig) -> Self {
        let clamped = config.clamped();
        if clamped != config {
            tracing::warn!(?config, ?clamped, "adjusted mutex backoff settings");
        }
        Self {
            store,
            config: clamped,
        }
    }

    /// Tries to take the mutex.
    ///
    /// Returns `Ok(true)` once this caller holds it and `Ok(false)` if it is
    /// held by someone whose last write is newer than `now - timeout`.
    /// Lost races are retried with backoff until one of those two outcomes
    /// is reached; there is no retry cap, so impose a deadline with
    /// [`StorageMutex::enter_with_deadline`] if one is needed.
    ///
    /// # Errors
    ///
    /// Returns any store or configuration error other than a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn enter(&self, collection_id: &str, key: &str, timeout: Duration) -> Result<bool> {
        let mut backoff = self.config.backoff_base();

        loop {
            let current = match self.store.get(collection_id, key).await {
                Ok(record) => Some(record),
                Err(KvError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };

            let (etag, reclaim) = match observe(current, timeout, Utc::now()) {
                Observed::Busy { last_modified } => {
                    tracing::debug!(%last_modified, "mutex held by another instance");
                    record_mutex_busy(collection_id);
                    return Ok(false);
                }
                Observed::Available { etag, reclaim } => (etag, reclaim),
            };

            let written = match etag.as_deref() {
                None => self.store.create(collection_id, key, HELD).await,
                Some(etag) => {
                    self.store
                        .upsert(collection_id, key, HELD, Some(etag))
                        .await
                }
            };

            match written {
                Ok(_) => {
                    if reclaim {
                        tracing::debug!("reclaimed stale mutex");
                        record_mutex_reclaimed(collection_id);
                    }
                    record_mutex_acquired(collection_id);
                    return Ok(true);
                }
                Err(KvError::Conflict { .. }) => {
                    tracing::debug!(?backoff, "lost mutex race, retrying");
                    record_mutex_conflict_retry(collection_id);
                    tokio::time::sleep(backoff + jitter()).await;
                    backoff = backoff.saturating_mul(2).min(self.config.backoff_max());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// [`StorageMutex::enter`] bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::DeadlineExceeded`] if no decision was reached in
    /// time, plus every error `enter` can return.
    pub async fn enter_with_deadline(
        &self,
        collection_id: &str,
        key: &str,
        timeout: Duration,
        deadline: Duration,
    ) -> Result<bool> {
        tokio::time::timeout(deadline, self.enter(collection_id, key, timeout))
            .await
            .map_err(|_| KvError::DeadlineExceeded {
                collection_id: collection_id.to_string(),
                key: key.to_string(),
                deadline,
            })?
    }

    /// Releases the mutex regardless of who holds it.
    ///
    /// # Errors
    ///
    /// Returns any store or configuration error.
    #[tracing::instrument(skip(self))]
    pub async fn leave(&self, collection_id: &str, key: &str) -> Result<()> {
        self.store
            .upsert(collection_id, key, RELEASED, Some(ETAG_ANY))
            .await?;
        Ok(())
    }

    /// Returns whether the mutex is currently held and not stale under
    /// `timeout`. Read-only.
    ///
    /// # Errors
    ///
    /// Returns any store or configuration error.
    pub async fn is_held(&self, collection_id: &str, key: &str, timeout: Duration) -> Result<bool> {
        let current = match self.store.get(collection_id, key).await {
            Ok(record) => Some(record),
            Err(KvError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(matches!(
            observe(current, timeout, Utc::now()),
            Observed::Busy { .. }
        ))
    }

    /// Runs `work` while holding the mutex.
    ///
    /// Returns `Ok(None)` without running `work` if the mutex is busy.
    /// Otherwise runs it, releases the mutex, and returns its output. The
    /// mutex is released even if `work` returns an error.
    ///
    /// # Errors
    ///
    /// Returns errors from `enter`, from `work`, or from `leave`. An error
    /// from `work` takes precedence over a failed release.
    pub async fn run_exclusive<T, F, Fut>(
        &self,
        collection_id: &str,
        key: &str,
        timeout: Duration,
        work: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.enter(collection_id, key, timeout).await? {
            return Ok(None);
        }

        let outcome = work()
            .instrument(mutex_span("run_exclusive", collection_id, key))
            .await;
        let released = self.leave(collection_id, key).await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(Some(value)),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    tracing::warn!(error = %release_err, "failed to release mutex after error");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::METADATA_MODIFIED;
    use std::collections::BTreeMap;

    fn record(data: &str, modified: Option<&str>) -> KeyValueRecord {
        let mut metadata = BTreeMap::new();
        if let Some(m) = modified {
            metadata.insert(METADATA_MODIFIED.to_string(), m.to_string());
        }
        KeyValueRecord {
            collection_id: "locks".into(),
            key: "migration-1".into(),
            data: data.into(),
            etag: "\"e1\"".into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn missing_record_is_available_without_etag() {
        let observed = observe(None, Duration::from_secs(30), Utc::now());
        assert!(matches!(
            observed,
            Observed::Available { etag: None, reclaim: false }
        ));
    }

    #[test]
    fn released_record_is_available_with_etag() {
        let observed = observe(
            Some(record("false", Some("2024-01-01T00:00:00Z"))),
            Duration::from_secs(30),
            at("2024-01-01T00:00:01Z"),
        );
        assert!(matches!(
            observed,
            Observed::Available { etag: Some(_), reclaim: false }
        ));
    }

    #[test]
    fn fresh_holder_is_busy() {
        let observed = observe(
            Some(record("True", Some("2024-01-01T00:00:00Z"))),
            Duration::from_secs(30),
            at("2024-01-01T00:00:10Z"),
        );
        assert!(matches!(observed, Observed::Busy { .. }));
    }

    #[test]
    fn stale_holder_is_reclaimable() {
        let observed = observe(
            Some(record("true", Some("2024-01-01T00:00:00Z"))),
            Duration::from_secs(30),
            at("2024-01-01T00:00:31Z"),
        );
        assert!(matches!(
            observed,
            Observed::Available { etag: Some(_), reclaim: true }
        ));
    }

    #[test]
    fn unreadable_timestamp_counts_as_epoch() {
        for modified in [None, Some("not a date")] {
            let observed = observe(
                Some(record("true", modified)),
                Duration::from_secs(3600),
                Utc::now(),
            );
            assert!(matches!(
                observed,
                Observed::Available { reclaim: true, .. }
            ));
        }
    }

    #[test]
    fn huge_timeout_never_reclaims() {
        let observed = observe(
            Some(record("true", Some("1971-01-01T00:00:00Z"))),
            Duration::MAX,
            Utc::now(),
        );
        assert!(matches!(observed, Observed::Busy { .. }));
    }

    struct NoStore;

    #[async_trait::async_trait]
    impl KeyValueStore for NoStore {
        async fn get(&self, c: &str, k: &str) -> Result<KeyValueRecord> {
            Err(KvError::not_found(c, k))
        }
        async fn get_all(&self, _: &str) -> Result<Vec<KeyValueRecord>> {
            Ok(Vec::new())
        }
        async fn create(&self, c: &str, k: &str, _: &str) -> Result<KeyValueRecord> {
            Err(KvError::InvalidInput(format!("create {c}/{k}")))
        }
        async fn upsert(
            &self,
            c: &str,
            k: &str,
            _: &str,
            _: Option<&str>,
        ) -> Result<KeyValueRecord> {
            Err(KvError::InvalidInput(format!("upsert {c}/{k}")))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn with_config_clamps_degenerate_backoff() {
        let mutex = StorageMutex::with_config(
            Arc::new(NoStore),
            MutexConfig {
                backoff_base_ms: 0,
                backoff_max_ms: 0,
            },
        );
        assert_eq!(mutex.config.backoff_base(), Duration::from_millis(1));
        assert!(mutex.config.validate().is_ok());

        let mutex = StorageMutex::with_config(
            Arc::new(NoStore),
            MutexConfig {
                backoff_base_ms: 200,
                backoff_max_ms: 10,
            },
        );
        assert_eq!(mutex.config.backoff_max(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn missing_record_is_taken_with_create() {
        let mutex = StorageMutex::new(Arc::new(NoStore));
        let err = mutex
            .enter("locks", "migration-1", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidInput(ref m) if m.starts_with("create")));
    }

    #[test]
    fn jitter_is_bounded() {
        for _ in 0..100 {
            assert!(jitter() <= Duration::from_millis(JITTER_MAX_MS));
        }
    }
}
