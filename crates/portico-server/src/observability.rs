//! Reporting of backend errors and fill failures.

use std::fmt;

use metrics::counter;
use tracing::warn;

/// Kind of event reported to an [`ObservabilitySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `CacheStore::get` failed; the request bypassed the cache.
    CacheReadFailed,
    /// Writing a filled entry failed; the response was still served.
    CacheWriteFailed,
    /// An invalidation tick or admin invalidation failed.
    CacheInvalidateFailed,
    /// The origin could not produce a response.
    OriginFetchFailed,
    /// A follower gave up waiting on the leader and fetched itself.
    FollowerWaitElapsed,
    /// Forwarding to a pool backend failed.
    ProxyFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheReadFailed => "cache_read_failed",
            Self::CacheWriteFailed => "cache_write_failed",
            Self::CacheInvalidateFailed => "cache_invalidate_failed",
            Self::OriginFetchFailed => "origin_fetch_failed",
            Self::FollowerWaitElapsed => "follower_wait_elapsed",
            Self::ProxyFailed => "proxy_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborator that receives operational events.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, kind: EventKind, detail: &str);
}

/// Default sink: one structured log line and one Prometheus counter per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl ObservabilitySink for MetricsSink {
    fn record(&self, kind: EventKind, detail: &str) {
        warn!(event = %kind, detail = %detail, "Operational event");
        counter!("portico_events_total", "kind" => kind.as_str()).increment(1);
    }
}

/// Registers the event counter description.
pub fn register_event_metrics() {
    metrics::describe_counter!(
        "portico_events_total",
        "Backend and fill failures reported by the edge server"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_labels() {
        assert_eq!(EventKind::CacheReadFailed.to_string(), "cache_read_failed");
        assert_eq!(EventKind::ProxyFailed.as_str(), "proxy_failed");
    }

    #[test]
    fn test_metrics_sink_without_recorder() {
        // Sin recorder instalado las macros son no-op.
        MetricsSink.record(EventKind::OriginFetchFailed, "connection refused");
    }
}
