#![allow(dead_code)]
use std::time::{Duration, UNIX_EPOCH};

use portico_core::{BackendAddress, CacheEntry};

/// Helper to build the canonical three-server pool.
pub fn default_pool() -> Vec<BackendAddress> {
    ["server1:80", "server2:80", "server3:80"]
        .iter()
        .map(|s| s.parse().expect("Failed to parse test backend address"))
        .collect()
}

/// Returns an entry stored at `secs` after the epoch.
pub fn entry(body: &'static str, secs: u64, ttl_secs: u64) -> CacheEntry {
    CacheEntry::new(
        body,
        200,
        Some("text/plain".to_string()),
        UNIX_EPOCH + Duration::from_secs(secs),
        Duration::from_secs(ttl_secs),
    )
}
