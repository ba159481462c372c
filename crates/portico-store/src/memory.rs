//! In-process cache store using Moka.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use portico_core::{CacheEntry, CacheKey};
use tracing::debug;

use crate::error::StoreError;
use crate::store::CacheStore;

/// Entry plus the TTL it was written with.
struct StoredEntry {
    entry: CacheEntry,
    ttl: Duration,
    expires_at: SystemTime,
}

/// Per-entry expiration: every write restarts the entry's TTL.
struct WriteTtl;

impl Expiry<CacheKey, Arc<StoredEntry>> for WriteTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<StoredEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &Arc<StoredEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache store backed by an in-process Moka cache.
/// Thread-safe y async-friendly; nunca falla con `BackendUnavailable`.
///
/// # Examples
///
/// ```no_run
/// use portico_store::{CacheStore, MemoryStore};
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new(10_000);
/// assert_eq!(store.backend_type(), "memory");
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Cache<CacheKey, Arc<StoredEntry>>,
}

impl MemoryStore {
    /// Crea un nuevo store con la capacidad maxima dada.
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(WriteTtl)
            .build();

        Self { inner }
    }

    /// Retorna el numero aproximado de entries en cache.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Fuerza la limpieza de tareas pendientes (para tests principalmente).
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let Some(stored) = self.inner.get(key).await else {
            return Ok(None);
        };

        // Moka expira por reloj monotonico; el deadline de pared se valida aqui
        if SystemTime::now() >= stored.expires_at {
            debug!(key = %key, "memory cache entry expired on read");
            self.inner.invalidate(key).await;
            return Ok(None);
        }

        Ok(Some(stored.entry.clone()))
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.inner
            .insert(
                key.clone(),
                Arc::new(StoredEntry {
                    entry,
                    ttl,
                    expires_at: SystemTime::now() + ttl,
                }),
            )
            .await;
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "memory cache set");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.inner.invalidate(key).await;
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
