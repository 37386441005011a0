//! Tenant identity and the document data types a tenant owns.
//!
//! The tenant is resolved per request by the caller and never stored on a
//! record. Together with a [`DocumentDataType`] it selects the physical
//! collection that holds the tenant's documents.
//!
//! # Example
//!
//! ```rust
//! use pcs_storage_core::tenant::{DocumentDataType, TenantId};
//!
//! let tenant = TenantId::new("3f1b2c9e-contoso").unwrap();
//! assert_eq!(
//!     tenant.collection_config_key(DocumentDataType::Pcs),
//!     "tenant:3f1b2c9e-contoso:pcs-collection"
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KvError, Result};

/// A unique identifier for a tenant.
///
/// Tenant IDs must be non-empty, at most 64 characters, and made of ASCII
/// alphanumerics, `-` or `_`. They end up inside configuration keys, so the
/// `:` separator is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::InvalidInput`] if the tenant ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Returns the tenant ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the configuration key naming this tenant's physical
    /// collection for `data_type`.
    #[must_use]
    pub fn collection_config_key(&self, data_type: DocumentDataType) -> String {
        format!("tenant:{}:{}-collection", self.0, data_type.as_str())
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(KvError::InvalidInput(
                "tenant ID cannot be empty".to_string(),
            ));
        }

        if id.len() > 64 {
            return Err(KvError::InvalidInput(format!(
                "tenant ID '{id}' is too long (maximum 64 characters)"
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(KvError::InvalidInput(format!(
                "tenant ID '{id}' contains invalid characters (allowed: a-z, A-Z, 0-9, '-', '_')"
            )));
        }

        Ok(())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Logical document families. Each maps to its own physical collection per
/// tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentDataType {
    /// Key/value storage-adapter documents (device groups, locks, ...).
    Pcs,
    /// Telemetry messages.
    Telemetry,
    /// Alarm documents.
    Alarms,
}

impl DocumentDataType {
    /// Returns the name used in configuration keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pcs => "pcs",
            Self::Telemetry => "telemetry",
            Self::Alarms => "alarms",
        }
    }
}

impl fmt::Display for DocumentDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
