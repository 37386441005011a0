//! Tenant-to-physical-collection resolution.
//!
//! Operators can shard or relocate a tenant's documents by changing one
//! configuration value, `tenant:{tenant}:{data type}-collection`. The
//! resolver reads it through a [`ConfigSource`] and caches each answer for a
//! fixed TTL. Failed lookups are surfaced as [`KvError::Configuration`] and
//! are not cached or retried here; retry policy belongs to the source.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{BoxError, KvError, Result};
use crate::tenant::{DocumentDataType, TenantId};

/// Key/value configuration service (an app-configuration store).
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Returns the value stored under `key`.
    async fn get_value(&self, key: &str) -> std::result::Result<String, BoxError>;
}

/// Resolves the physical collection holding a tenant's documents.
#[async_trait]
pub trait CollectionResolver: Send + Sync + 'static {
    /// Returns the physical collection id for `(tenant, data_type)`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Configuration`] if the lookup fails.
    async fn physical_collection_id(
        &self,
        tenant: &TenantId,
        data_type: DocumentDataType,
    ) -> Result<String>;
}

/// Fixed in-process configuration, for tests and single-node runs.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    values: Arc<StdRwLock<HashMap<String, String>>>,
}

impl StaticConfigSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        // The map holds plain strings, so a panicked writer cannot leave it
        // half-updated.
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Points `tenant`'s `data_type` documents at `collection_id`.
    pub fn set_collection(
        &self,
        tenant: &TenantId,
        data_type: DocumentDataType,
        collection_id: impl Into<String>,
    ) {
        self.set(tenant.collection_config_key(data_type), collection_id);
    }

    /// Removes `key`.
    pub fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn get_value(&self, key: &str) -> std::result::Result<String, BoxError> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values
            .get(key)
            .cloned()
            .ok_or_else(|| BoxError::from(format!("no configuration value for '{key}'")))
    }
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    fetched_at: Instant,
}

impl CachedValue {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// [`CollectionResolver`] backed by a [`ConfigSource`] with a TTL cache.
pub struct CachedCollectionResolver<C: ConfigSource + ?Sized> {
    source: Arc<C>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedValue>>,
}

impl<C: ConfigSource + ?Sized> CachedCollectionResolver<C> {
    /// Creates a resolver caching each lookup for `ttl`.
    #[must_use]
    pub fn new(source: Arc<C>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drops every cached entry.
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }

    async fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl<C: ConfigSource + ?Sized> CollectionResolver for CachedCollectionResolver<C> {
    async fn physical_collection_id(
        &self,
        tenant: &TenantId,
        data_type: DocumentDataType,
    ) -> Result<String> {
        let key = tenant.collection_config_key(data_type);

        // Fast path: fresh cached value.
        if let Some(value) = self.cached(&key).await {
            return Ok(value);
        }

        // Slow path: ask the source and refresh the entry.
        let value = self.source.get_value(&key).await.map_err(|e| {
            KvError::configuration_with_source(
                format!("unable to resolve collection for tenant {tenant} ({data_type})"),
                e,
            )
        })?;

        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(KvError::Configuration {
                message: format!("empty collection id configured under '{key}'"),
                source: None,
            });
        }

        tracing::debug!(%tenant, %data_type, collection = %value, "resolved physical collection");
        self.cache.write().await.insert(
            key,
            CachedValue {
                value: value.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(value)
    }
}
