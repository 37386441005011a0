//! Storage configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{KvError, Result};
use crate::observability::LogFormat;

/// Default document database id.
pub const DEFAULT_DATABASE_ID: &str = "pcs-storage";

/// Default TTL for cached collection lookups.
pub const DEFAULT_COLLECTION_CACHE_TTL_SECS: u64 = 300;

/// Default first backoff after a lost mutex race.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 20;

/// Default ceiling for mutex backoff.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000;

/// Retry pacing for [`StorageMutex::enter`](crate::mutex::StorageMutex::enter).
///
/// Only the delay between conflict retries is configurable. The number of
/// retries is not capped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutexConfig {
    /// Delay before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on the delay, in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl MutexConfig {
    /// Returns the base backoff.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Returns the maximum backoff.
    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Returns pacing that always backs off: the base is at least 1 ms and
    /// the maximum is at least the base.
    #[must_use]
    pub fn clamped(self) -> Self {
        let backoff_base_ms = self.backoff_base_ms.max(1);
        Self {
            backoff_base_ms,
            backoff_max_ms: self.backoff_max_ms.max(backoff_base_ms),
        }
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base exceeds the maximum.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(KvError::InvalidInput(format!(
                "PCS_STORAGE_MUTEX_BACKOFF_BASE_MS ({}) must not exceed PCS_STORAGE_MUTEX_BACKOFF_MAX_MS ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }
}

/// Configuration for the key/value container and mutex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Document database holding every tenant collection.
    pub database_id: String,

    /// How long a resolved tenant collection id stays cached.
    pub collection_cache_ttl_secs: u64,

    /// Mutex retry pacing.
    #[serde(default)]
    pub mutex: MutexConfig,

    /// Log output format.
    #[serde(skip)]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_id: DEFAULT_DATABASE_ID.to_string(),
            collection_cache_ttl_secs: DEFAULT_COLLECTION_CACHE_TTL_SECS,
            mutex: MutexConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Reads:
    /// - `PCS_STORAGE_DATABASE_ID`
    /// - `PCS_STORAGE_COLLECTION_CACHE_TTL_SECS`
    /// - `PCS_STORAGE_MUTEX_BACKOFF_BASE_MS`
    /// - `PCS_STORAGE_MUTEX_BACKOFF_MAX_MS`
    /// - `PCS_STORAGE_LOG_FORMAT` (`json` or `pretty`)
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_string = |name: &str| non_blank(lookup(name));
        let mut config = Self::default();

        if let Some(id) = env_string("PCS_STORAGE_DATABASE_ID") {
            config.database_id = id;
        }
        if let Some(ttl) = parse_u64(
            "PCS_STORAGE_COLLECTION_CACHE_TTL_SECS",
            env_string("PCS_STORAGE_COLLECTION_CACHE_TTL_SECS"),
        )? {
            config.collection_cache_ttl_secs = ttl;
        }
        if let Some(ms) = parse_u64(
            "PCS_STORAGE_MUTEX_BACKOFF_BASE_MS",
            env_string("PCS_STORAGE_MUTEX_BACKOFF_BASE_MS"),
        )? {
            config.mutex.backoff_base_ms = ms;
        }
        if let Some(ms) = parse_u64(
            "PCS_STORAGE_MUTEX_BACKOFF_MAX_MS",
            env_string("PCS_STORAGE_MUTEX_BACKOFF_MAX_MS"),
        )? {
            config.mutex.backoff_max_ms = ms;
        }
        if let Some(format) = env_string("PCS_STORAGE_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format).ok_or_else(|| {
                KvError::InvalidInput(format!(
                    "PCS_STORAGE_LOG_FORMAT must be json or pretty (got {format})"
                ))
            })?;
        }

        config.mutex.validate()?;
        Ok(config)
    }

    /// Returns the collection cache TTL.
    #[must_use]
    pub fn collection_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.collection_cache_ttl_secs)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_u64(name: &str, value: Option<String>) -> Result<Option<u64>> {
    let Some(v) = value else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| KvError::InvalidInput(format!("{name} must be a u64: {e}")))
}
