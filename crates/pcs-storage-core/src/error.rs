//! Error types and result aliases for pcs-storage.
//!
//! The three expected outcomes of a key/value operation (found, absent,
//! lost a concurrency race) are explicit variants. Anything the store's
//! error classifier does not recognise is carried unchanged as the `source`
//! of [`KvError::Storage`].

use std::time::Duration;

/// The result type used throughout pcs-storage.
pub type Result<T> = std::result::Result<T, KvError>;

/// Boxed error used for sources we do not own.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in key/value and mutex operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// No document backs the requested `(collection_id, key)`.
    #[error("not found: {collection_id}/{key}")]
    NotFound {
        /// Logical collection that was searched.
        collection_id: String,
        /// Key that was looked up.
        key: String,
    },

    /// A write lost an optimistic-concurrency race.
    ///
    /// Raised for create-on-existing-key and for a conditional upsert whose
    /// etag no longer matches the stored one.
    #[error("conflict on {collection_id}/{key}: {message}")]
    Conflict {
        /// Logical collection of the contested record.
        collection_id: String,
        /// Key of the contested record.
        key: String,
        /// What the store reported.
        message: String,
    },

    /// The tenant-to-collection lookup failed. Never retried by the core.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the failed lookup.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A store failure the classifier did not recognise.
    #[error("storage error: {message}")]
    Storage {
        /// Operation that failed.
        message: String,
        /// The original store error.
        #[source]
        source: Option<BoxError>,
    },

    /// A caller-imposed deadline elapsed before the mutex decided.
    #[error("deadline of {deadline:?} exceeded entering {collection_id}/{key}")]
    DeadlineExceeded {
        /// Logical collection of the mutex.
        collection_id: String,
        /// Key of the mutex.
        key: String,
        /// The deadline that elapsed.
        deadline: Duration,
    },
}

impl KvError {
    /// Creates a not-found error for a logical record.
    #[must_use]
    pub fn not_found(collection_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            collection_id: collection_id.into(),
            key: key.into(),
        }
    }

    /// Creates a conflict error for a logical record.
    #[must_use]
    pub fn conflict(
        collection_id: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            collection_id: collection_id.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error with a source cause.
    #[must_use]
    pub fn configuration_with_source(message: impl Into<String>, source: BoxError) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a storage error wrapping an unclassified store error.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for [`KvError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`KvError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
