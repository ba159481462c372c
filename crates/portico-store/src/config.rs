//! Store backend selection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::disk::DiskStore;
use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::redis::RedisStore;
use crate::store::CacheStore;

/// Which cache backend the process uses. Chosen once at boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process Moka cache.
    Memory(MemoryStoreConfig),
    /// Redis key space.
    Redis(RedisStoreConfig),
    /// Files under a local directory.
    Disk(DiskStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreConfig::default())
    }
}

impl StoreConfig {
    /// Returns the backend type identifier.
    pub fn backend_type(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
            Self::Disk(_) => "disk",
        }
    }
}

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum number of entries.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
        }
    }
}

/// Configuration for [`RedisStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Prefix of every key written by this store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Timeout for acquiring or creating a connection.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            key_prefix: default_key_prefix(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Configuration for [`DiskStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStoreConfig {
    /// Root directory of the cache files.
    #[serde(default = "default_disk_path")]
    pub path: PathBuf,

    /// Maximum number of concurrent file operations.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for DiskStoreConfig {
    fn default() -> Self {
        Self {
            path: default_disk_path(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_key_prefix() -> String {
    "portico:cache:".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/var/cache/portico")
}

/// Builds the long-lived store selected by `config`.
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn CacheStore>, StoreError> {
    let store: Arc<dyn CacheStore> = match config {
        StoreConfig::Memory(memory) => Arc::new(MemoryStore::new(memory.max_capacity)),
        StoreConfig::Redis(redis) => Arc::new(RedisStore::new(redis)?),
        StoreConfig::Disk(disk) => Arc::new(DiskStore::new(disk).await?),
    };

    info!(backend = store.backend_type(), "Cache store initialized");
    Ok(store)
}
