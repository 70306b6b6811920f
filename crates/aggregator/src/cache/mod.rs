//! TTL cache adapter over an external key-value store
//!
//! Values are stored as JSON. A miss (`Ok(None)`) is distinct from a store
//! failure (`Err(CacheError::Backend)`) and from a payload that no longer
//! decodes (`Err(CacheError::Serialization)`).
//!
//! Request paths should go through the fail-open helpers ([`CacheStore::lookup`],
//! [`CacheStore::store`], [`CacheStore::get_or_compute`]), which log store
//! failures and carry on as if the entry were absent.

mod key;
mod memory;
mod redis_store;
mod store;

pub use self::key::CacheKey;
pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;
pub use self::store::{glob_match, KeyValueStore, StoreError, StoreOp, StoreResult, TtlStatus};

use catalog_gateway_core::config::CacheTtlConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Error types for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key pattern: {0:?}")]
    InvalidPattern(String),
}

/// Data-set classes with their own default lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Hero,
    Detail,
    Category,
    Search,
    Default,
}

/// A value plus whether it came from the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Served<T> {
    pub data: T,
    pub cache_hit: bool,
}

impl<T> Served<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            cache_hit: false,
        }
    }

    pub fn cached(data: T) -> Self {
        Self {
            data,
            cache_hit: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            data: f(self.data),
            cache_hit: self.cache_hit,
        }
    }
}

/// JSON cache over a shared [`KeyValueStore`]
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    ttl: CacheTtlConfig,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: CacheTtlConfig) -> Self {
        Self { store, ttl }
    }

    /// Cache backed by a private [`MemoryStore`] with default lifetimes
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), CacheTtlConfig::default())
    }

    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Hero => self.ttl.hero,
            TtlClass::Detail => self.ttl.detail,
            TtlClass::Category => self.ttl.category,
            TtlClass::Search => self.ttl.search,
            TtlClass::Default => self.ttl.default,
        }
    }

    /// Get value from cache
    ///
    /// # Returns
    /// * `Ok(Some(T))` - Value found in cache
    /// * `Ok(None)` - Cache miss
    /// * `Err` - Store failure or undecodable payload
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(key).await? {
            Some(json) => {
                debug!(key = %key, "Cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Set value in cache; `ttl` of `None` applies the default lifetime
    #[instrument(skip(self, value), fields(key = %key))]
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let ttl = ttl.unwrap_or(self.ttl.default);

        self.store.set(key, json, Some(ttl)).await?;
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Delete a key, returning whether it existed
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.store.delete(&[key.to_string()]).await?;
        Ok(removed > 0)
    }

    /// Delete every key matching a glob, returning how many were removed
    #[instrument(skip(self), fields(pattern = %pattern))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        if pattern.trim().is_empty() {
            return Err(CacheError::InvalidPattern(pattern.to_string()));
        }

        let keys = self.store.keys(pattern).await?;

        if keys.is_empty() {
            debug!(pattern = %pattern, "No keys matched pattern");
            return Ok(0);
        }

        let deleted = self.store.delete(&keys).await?;
        debug!(pattern = %pattern, deleted = deleted, "Deleted keys matching pattern");
        Ok(deleted)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.exists(key).await?)
    }

    pub async fn ttl_remaining(&self, key: &str) -> Result<TtlStatus, CacheError> {
        Ok(self.store.ttl(key).await?)
    }

    /// Check whether the backing store is reachable
    pub async fn health_check(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cache health check failed");
                false
            }
        }
    }

    /// Fail-open read: any error is logged and reported as a miss
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Fail-open write: any error is logged and ignored
    pub async fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        if let Err(e) = self.set(key, value, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// Cache-aside read
    ///
    /// Returns the cached value when present. Otherwise runs `compute`,
    /// writes the result back when `should_cache` accepts it, and returns it.
    /// Store failures never surface; errors from `compute` do.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        should_cache: impl FnOnce(&T) -> bool,
        compute: F,
    ) -> Result<Served<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.lookup::<T>(key).await {
            return Ok(Served::cached(cached));
        }

        let fresh = compute().await?;
        if should_cache(&fresh) {
            self.store(key, &fresh, Some(ttl)).await;
        }
        Ok(Served::fresh(fresh))
    }
}
