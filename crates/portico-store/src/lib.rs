//! # Portico Store
//!
//! Cache store abstraction for the Portico edge cache.
//!
//! The request pipeline only ever talks to [`CacheStore`]. Three adapters are
//! provided and selected once at boot through [`StoreConfig`]:
//!
//! - [`MemoryStore`] - in-process Moka cache, the default and the test double
//! - [`RedisStore`] - shared Redis key space through a deadpool connection pool
//! - [`DiskStore`] - body and metadata files under a local directory
//!
//! Every operation can fail with [`StoreError::BackendUnavailable`]. A plain
//! miss is `Ok(None)`, never an error.
//!
//! ## Example
//!
//! ```ignore
//! use portico_store::{StoreConfig, build_store};
//!
//! let store = build_store(&StoreConfig::default()).await?;
//! let entry = store.get(&key).await?;
//! ```

pub mod config;
pub mod disk;
pub mod error;
pub mod memory;
pub mod redis;
pub mod store;

// Re-exports
pub use config::{DiskStoreConfig, MemoryStoreConfig, RedisStoreConfig, StoreConfig, build_store};
pub use disk::DiskStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use store::CacheStore;

// Re-export portico_core for consumers
pub use portico_core;
