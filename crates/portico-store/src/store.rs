//! Cache store trait definition.

use std::time::Duration;

use async_trait::async_trait;
use portico_core::{CacheEntry, CacheKey};

use crate::error::StoreError;

/// A key-value store holding cached responses with a TTL.
///
/// This trait abstracts over the cache backend technology so the pipeline
/// can look up, fill and invalidate entries without knowing where they live.
///
/// # Implementors
///
/// - `MemoryStore` - in-process Moka cache
/// - `RedisStore` - Redis through a deadpool connection pool
/// - `DiskStore` - files under a local directory
///
/// # Example
///
/// ```ignore
/// use portico_store::{CacheStore, StoreError};
///
/// struct NullStore;
///
/// #[async_trait]
/// impl CacheStore for NullStore {
///     async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
///         Ok(None)
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up an entry.
    ///
    /// Returns `Ok(None)` on a miss or when the stored entry has expired.
    ///
    /// # Errors
    ///
    /// - `StoreError::BackendUnavailable` if the backend cannot be reached
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Stores an entry, replacing any previous value for the key.
    ///
    /// The backend drops the entry after `ttl`.
    async fn set(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration)
    -> Result<(), StoreError>;

    /// Removes a single entry. Removing a missing key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Removes every entry owned by this store.
    async fn invalidate_all(&self) -> Result<(), StoreError>;

    /// Returns the backend type as a string identifier.
    fn backend_type(&self) -> &'static str;

    /// Verifies that the backend is reachable.
    ///
    /// The default implementation probes with a lookup of a reserved key.
    async fn health_check(&self) -> Result<(), StoreError> {
        let probe = CacheKey::from_path("/__portico_health_probe")
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        self.get(&probe).await.map(|_| ())
    }
}
