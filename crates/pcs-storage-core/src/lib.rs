//! # pcs-storage-core
//!
//! Tenant-scoped key/value storage over a document database, and the
//! storage mutex built on top of it.
//!
//! - **Key/value container**: CRUD over `(collection_id, key)` with
//!   deterministic document ids, one physical collection per tenant, and
//!   translation of store errors into [`KvError`] kinds
//! - **Storage mutex**: advisory, timeout-reclaimable mutual exclusion
//!   across instances using the store's etag compare-and-swap
//! - **Collection resolution**: tenant-to-collection lookup through a
//!   configuration source, cached with expiry
//! - **Error classification**: one small adapter per concrete store
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pcs_storage_core::prelude::*;
//!
//! # async fn demo() -> pcs_storage_core::Result<()> {
//! let tenant = TenantId::new("contoso")?;
//! let config = StaticConfigSource::new();
//! config.set_collection(&tenant, DocumentDataType::Pcs, "pcs-contoso");
//!
//! let resolver = Arc::new(CachedCollectionResolver::new(
//!     Arc::new(config),
//!     Duration::from_secs(300),
//! ));
//! let container = Arc::new(KeyValueContainer::new(
//!     Arc::new(MemoryDocumentStore::new()),
//!     MemoryClassifier::new(),
//!     resolver,
//!     "pcs-storage",
//! ));
//! let kv = Arc::new(container.scoped(tenant));
//!
//! kv.create("devicegroups", "floor-1", "{}").await?;
//!
//! let mutex = StorageMutex::new(kv);
//! assert!(mutex.enter("locks", "migration-1", Duration::from_secs(30)).await?);
//! mutex.leave("locks", "migration-1").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod classifier;
pub mod collection;
pub mod config;
pub mod container;
pub mod document;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod mutex;
pub mod observability;
pub mod store;
pub mod tenant;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::classifier::{ErrorClassifier, StatusCodeClassifier, StatusCoded, StoreErrorKind};
    pub use crate::collection::{
        CachedCollectionResolver, CollectionResolver, ConfigSource, StaticConfigSource,
    };
    pub use crate::config::{Config, MutexConfig};
    pub use crate::container::{KeyValueContainer, ScopedContainer, document_id};
    pub use crate::document::{Document, DocumentStore, NewDocument, WriteCondition};
    pub use crate::error::{KvError, Result};
    pub use crate::memory::{MemoryClassifier, MemoryDocumentStore, MemoryStoreError};
    pub use crate::mutex::StorageMutex;
    pub use crate::store::{ETAG_ANY, KeyValueRecord, KeyValueStore};
    pub use crate::tenant::{DocumentDataType, TenantId};
}

// Re-export key types at crate root for ergonomics
pub use config::{Config, MutexConfig};
pub use container::{KeyValueContainer, ScopedContainer, document_id};
pub use error::{KvError, Result};
pub use mutex::StorageMutex;
pub use observability::{LogFormat, init_logging};
pub use store::{KeyValueRecord, KeyValueStore};
pub use tenant::{DocumentDataType, TenantId};
