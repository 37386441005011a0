//! Translation of store-native errors into the shared outcome kinds.
//!
//! One classifier is written per concrete store. Document databases that
//! speak HTTP report outcomes as status codes, so [`StatusCodeClassifier`]
//! covers any error type exposing one through [`StatusCoded`].

use std::marker::PhantomData;

/// Outcome kinds the container handles. Anything else is unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The addressed document does not exist.
    NotFound,
    /// A document with the same id already exists.
    Conflict,
    /// A conditional write saw a different version.
    PreconditionFailed,
}

impl StoreErrorKind {
    /// Returns a stable label, used in metrics and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PreconditionFailed => "precondition_failed",
        }
    }
}

/// Classifies errors of one store's error type `E`.
pub trait ErrorClassifier<E>: Send + Sync + 'static {
    /// Returns true if `error` means the document is absent.
    fn is_not_found(&self, error: &E) -> bool;

    /// Returns true if `error` means the id is already taken.
    fn is_conflict(&self, error: &E) -> bool;

    /// Returns true if `error` means a conditional write lost its race.
    fn is_precondition_failed(&self, error: &E) -> bool;

    /// Returns the matching kind, or `None` for anything unrecognised.
    fn classify(&self, error: &E) -> Option<StoreErrorKind> {
        if self.is_not_found(error) {
            Some(StoreErrorKind::NotFound)
        } else if self.is_conflict(error) {
            Some(StoreErrorKind::Conflict)
        } else if self.is_precondition_failed(error) {
            Some(StoreErrorKind::PreconditionFailed)
        } else {
            None
        }
    }
}

/// Errors that carry an HTTP-style status code.
pub trait StatusCoded {
    /// Returns the status code, if the error came from a response.
    fn status_code(&self) -> Option<u16>;
}

/// Not found.
pub const STATUS_NOT_FOUND: u16 = 404;
/// Conflict.
pub const STATUS_CONFLICT: u16 = 409;
/// Precondition failed.
pub const STATUS_PRECONDITION_FAILED: u16 = 412;

/// Classifier for status-coded store errors (404 / 409 / 412).
pub struct StatusCodeClassifier<E> {
    _error: PhantomData<fn(&E)>,
}

impl<E> StatusCodeClassifier<E> {
    /// Creates a classifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _error: PhantomData,
        }
    }
}

impl<E> Default for StatusCodeClassifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for StatusCodeClassifier<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for StatusCodeClassifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StatusCodeClassifier")
    }
}

impl<E: StatusCoded + 'static> ErrorClassifier<E> for StatusCodeClassifier<E> {
    fn is_not_found(&self, error: &E) -> bool {
        error.status_code() == Some(STATUS_NOT_FOUND)
    }

    fn is_conflict(&self, error: &E) -> bool {
        error.status_code() == Some(STATUS_CONFLICT)
    }

    fn is_precondition_failed(&self, error: &E) -> bool {
        error.status_code() == Some(STATUS_PRECONDITION_FAILED)
    }
}
