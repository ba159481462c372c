//! Disk-backed cache store.
//!
//! Each key maps to a body file and a JSON metadata file under
//! `<root>/<xx>/<xxh3_128(key)>`. Writes go through a uniquely named temp file
//! and an atomic rename, so a reader never observes a half-written body.
//! Concurrent writers of the same key may interleave their two renames; the
//! metadata records the body length and checksum, and a body that does not
//! match its metadata is treated as a miss.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use portico_core::{CacheEntry, CacheKey};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};
use uuid::Uuid;
use xxhash_rust::xxh3::{xxh3_64, xxh3_128};

use crate::config::DiskStoreConfig;
use crate::error::StoreError;
use crate::store::CacheStore;

const BACKEND: &str = "disk";

/// Metadata stored next to each body file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    content_type: Option<String>,
    stored_at_ms: u64,
    ttl_ms: u64,
    /// Deadline computed from the write time, checked on every read.
    expires_at_ms: u64,
    size: usize,
    /// xxh3_64 of the body.
    checksum: u64,
}

impl EntryMeta {
    fn matches(&self, body: &[u8]) -> bool {
        self.size == body.len() && self.checksum == xxh3_64(body)
    }
}

/// Cache store persisting entries as files.
pub struct DiskStore {
    root: PathBuf,
    io_permits: Arc<Semaphore>,
}

fn unavailable(e: impl ToString) -> StoreError {
    StoreError::unavailable(BACKEND, e)
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl DiskStore {
    /// Creates the store, creating the root directory if needed.
    pub async fn new(config: &DiskStoreConfig) -> Result<Self, StoreError> {
        if config.pool_size == 0 {
            return Err(StoreError::InvalidConfig(
                "disk pool_size must be at least 1".to_string(),
            ));
        }

        fs::create_dir_all(&config.path).await.map_err(unavailable)?;

        Ok(Self {
            root: config.path.clone(),
            io_permits: Arc::new(Semaphore::new(config.pool_size)),
        })
    }

    fn body_path(&self, key: &CacheKey) -> PathBuf {
        let hash = format!("{:032x}", xxh3_128(key.as_str().as_bytes()));
        self.root.join(&hash[0..2]).join(hash)
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.body_path(key).with_extension("meta")
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, StoreError> {
        self.io_permits.acquire().await.map_err(unavailable)
    }

    async fn remove_quietly(&self, key: &CacheKey) {
        for path in [self.body_path(key), self.meta_path(key)] {
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }
}

/// Temp file next to `path`, unique per write: `<name>.<uuid>.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::now_v7().simple()));
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);

    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let _permit = self.permit().await?;

        let meta_data = match fs::read(self.meta_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(e)),
        };

        let meta: EntryMeta = match serde_json::from_slice(&meta_data) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding corrupt cache metadata");
                self.remove_quietly(key).await;
                return Ok(None);
            },
        };

        // Colision de hash: la metadata pertenece a otra key
        if meta.key != key.as_str() {
            return Ok(None);
        }

        if millis_since_epoch(SystemTime::now()) > meta.expires_at_ms {
            debug!(key = %key, "disk cache entry expired");
            self.remove_quietly(key).await;
            return Ok(None);
        }

        let body = match fs::read(self.body_path(key)).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.remove_quietly(key).await;
                return Ok(None);
            },
            Err(e) => return Err(unavailable(e)),
        };

        // Otro writer reemplazo el body entre las dos lecturas
        if !meta.matches(&body) {
            debug!(
                key = %key,
                size = body.len(),
                expected = meta.size,
                "disk cache body does not match metadata"
            );
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            body: Bytes::from(body),
            status: meta.status,
            content_type: meta.content_type,
            stored_at: UNIX_EPOCH + Duration::from_millis(meta.stored_at_ms),
            ttl: Duration::from_millis(meta.ttl_ms),
        }))
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let _permit = self.permit().await?;

        let body_path = self.body_path(key);
        if let Some(parent) = body_path.parent() {
            fs::create_dir_all(parent).await.map_err(unavailable)?;
        }

        let meta = EntryMeta {
            key: key.as_str().to_string(),
            status: entry.status,
            content_type: entry.content_type,
            stored_at_ms: millis_since_epoch(entry.stored_at),
            ttl_ms: entry.ttl.as_millis() as u64,
            expires_at_ms: millis_since_epoch(SystemTime::now() + ttl),
            size: entry.body.len(),
            checksum: xxh3_64(&entry.body),
        };
        let meta_json = serde_json::to_vec(&meta).map_err(unavailable)?;

        // Body primero: la metadata es la que publica la entry
        write_atomic(&body_path, &entry.body)
            .await
            .map_err(unavailable)?;
        write_atomic(&self.meta_path(key), &meta_json)
            .await
            .map_err(unavailable)?;

        debug!(key = %key, size = meta.size, "disk cache set");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        let _permit = self.permit().await?;

        for path in [self.meta_path(key), self.body_path(key)] {
            match fs::remove_file(&path).await {
                Ok(()) => {},
                Err(e) if e.kind() == ErrorKind::NotFound => {},
                Err(e) => return Err(unavailable(e)),
            }
        }
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        let _permit = self.permit().await?;

        warn!(root = %self.root.display(), "Clearing disk cache");
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => return Err(unavailable(e)),
        }
        fs::create_dir_all(&self.root).await.map_err(unavailable)
    }

    fn backend_type(&self) -> &'static str {
        BACKEND
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let metadata = fs::metadata(&self.root).await.map_err(unavailable)?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )))
        }
    }
}
