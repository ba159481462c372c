//! Cached response entries.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A response stored in a cache backend.
///
/// An entry is never served once `now > stored_at + ttl`. Stores enforce
/// this on read and the pipeline checks it again against its own clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response body.
    pub body: Bytes,
    /// HTTP status returned by the origin.
    pub status: u16,
    /// Content type returned by the origin, if any.
    pub content_type: Option<String>,
    /// When the entry was filled.
    pub stored_at: SystemTime,
    /// How long the entry stays fresh.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Creates a new entry filled at `stored_at`.
    pub fn new(
        body: impl Into<Bytes>,
        status: u16,
        content_type: Option<String>,
        stored_at: SystemTime,
        ttl: Duration,
    ) -> Self {
        Self {
            body: body.into(),
            status,
            content_type,
            stored_at,
            ttl,
        }
    }

    /// Returns the instant after which the entry is stale.
    pub fn expires_at(&self) -> SystemTime {
        self.stored_at + self.ttl
    }

    /// Returns true if the entry must not be served at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now > self.expires_at()
    }

    /// Returns how long the entry stays fresh after `now`, or zero once stale.
    pub fn remaining_ttl(&self, now: SystemTime) -> Duration {
        self.expires_at()
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}
