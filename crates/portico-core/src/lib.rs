//! Portico Core - Domain types
//!
//! This crate provides the foundational types shared by the Portico store
//! adapters and the edge server: cache keys, cache entries, backend
//! addresses and the clock used for TTL checks.

pub mod clock;
pub mod entry;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use error::{AddressError, KeyError};
pub use types::{BackendAddress, CacheKey};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
