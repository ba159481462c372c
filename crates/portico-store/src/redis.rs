//! Redis cache store through a deadpool connection pool.
//!
//! Entries are stored as Redis hashes under `<prefix><path>` and expire through
//! `PEXPIRE`, so TTL enforcement is delegated to Redis. Invalidation walks the
//! prefixed key space with `SCAN` and never issues `FLUSHDB`, which keeps
//! other tenants of a shared Redis untouched.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use portico_core::{CacheEntry, CacheKey};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::RedisStoreConfig;
use crate::error::StoreError;
use crate::store::CacheStore;

const BACKEND: &str = "redis";
const SCAN_BATCH: usize = 500;

const FIELD_BODY: &str = "body";
const FIELD_STATUS: &str = "status";
const FIELD_CONTENT_TYPE: &str = "content_type";
const FIELD_STORED_AT: &str = "stored_at_ms";
const FIELD_TTL: &str = "ttl_ms";

/// Cache store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    /// Creates a store from its configuration.
    ///
    /// Building the pool does not connect; the first operation does.
    pub fn new(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        if config.pool_size == 0 {
            return Err(StoreError::InvalidConfig(
                "redis pool_size must be at least 1".to_string(),
            ));
        }

        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(config.connect_timeout),
            create: Some(config.connect_timeout),
            recycle: Some(config.connect_timeout),
        };

        let mut redis_config = Config::from_url(config.url.clone());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        Ok(Self::from_pool(pool, config.key_prefix.clone()))
    }

    /// Creates a store over an existing pool.
    pub fn from_pool(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn redis_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            warn!(error = %e, "Failed to get Redis connection");
            StoreError::unavailable(BACKEND, e)
        })
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::unavailable(BACKEND, e)
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn parse_field<T: std::str::FromStr>(fields: &HashMap<String, Vec<u8>>, name: &str) -> Option<T> {
    fields
        .get(name)
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|s| s.parse().ok())
}

/// Rebuilds an entry from a Redis hash, `None` if the hash is incomplete.
fn decode_entry(mut fields: HashMap<String, Vec<u8>>) -> Option<CacheEntry> {
    let status: u16 = parse_field(&fields, FIELD_STATUS)?;
    let stored_at_ms: u64 = parse_field(&fields, FIELD_STORED_AT)?;
    let ttl_ms: u64 = parse_field(&fields, FIELD_TTL)?;
    let content_type = fields
        .remove(FIELD_CONTENT_TYPE)
        .and_then(|raw| String::from_utf8(raw).ok())
        .filter(|s| !s.is_empty());
    let body = fields.remove(FIELD_BODY)?;

    Some(CacheEntry {
        body: Bytes::from(body),
        status,
        content_type,
        stored_at: UNIX_EPOCH + Duration::from_millis(stored_at_ms),
        ttl: Duration::from_millis(ttl_ms),
    })
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, Vec<u8>> = conn
            .hgetall(self.redis_key(key))
            .await
            .map_err(unavailable)?;

        if fields.is_empty() {
            debug!(key = %key, "redis cache miss");
            return Ok(None);
        }

        match decode_entry(fields) {
            Some(entry) => Ok(Some(entry)),
            None => {
                warn!(key = %key, "Discarding malformed Redis cache entry");
                Ok(None)
            },
        }
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let redis_key = self.redis_key(key);
        let ttl_ms = ttl.as_millis().max(1) as i64;

        let fields: [(&str, Vec<u8>); 5] = [
            (FIELD_STATUS, entry.status.to_string().into_bytes()),
            (
                FIELD_STORED_AT,
                millis_since_epoch(entry.stored_at).to_string().into_bytes(),
            ),
            (FIELD_TTL, (entry.ttl.as_millis() as u64).to_string().into_bytes()),
            (
                FIELD_CONTENT_TYPE,
                entry.content_type.unwrap_or_default().into_bytes(),
            ),
            (FIELD_BODY, entry.body.to_vec()),
        ];

        let mut conn = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .del(&redis_key)
            .ignore()
            .hset_multiple(&redis_key, &fields)
            .ignore()
            .pexpire(&redis_key, ttl_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        debug!(key = %key, ttl_ms = ttl_ms, "redis cache set");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(self.redis_key(key)).await.map_err(unavailable)?;
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            if !keys.is_empty() {
                removed += keys.len();
                let _: () = conn.del(&keys).await.map_err(unavailable)?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix = %self.key_prefix, count = removed, "redis cache invalidated");
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        BACKEND
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
