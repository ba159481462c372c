//! Cache metrics recording.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registra las metricas del pipeline de cache.
/// Llamar una vez al inicio para registrar las metricas.
pub fn register_cache_metrics() {
    metrics::describe_counter!("portico_cache_hits_total", "Total number of cache hits");
    metrics::describe_counter!("portico_cache_misses_total", "Total number of cache misses");
    metrics::describe_counter!(
        "portico_cache_coalesced_total",
        "Requests served from another request's fill"
    );
    metrics::describe_counter!(
        "portico_cache_bypass_total",
        "Requests served without the cache because the store was unavailable"
    );
    metrics::describe_counter!(
        "portico_request_timeouts_total",
        "Requests that exceeded the request timeout"
    );
    metrics::describe_gauge!("portico_cache_fills_in_flight", "Origin fills currently running");
    metrics::describe_histogram!(
        "portico_cache_fill_seconds",
        "Time spent fetching from the origin on a miss"
    );
}

/// Recorder de metricas de cache.
/// Usa atomic counters internos para poder consultarlos sin el exporter.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    coalesced: Arc<AtomicU64>,
    bypassed: Arc<AtomicU64>,
    timeouts: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("portico_cache_hits_total").increment(1);
    }

    /// Registra un cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("portico_cache_misses_total").increment(1);
    }

    /// Registra un follower servido por el fill de otro request
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
        counter!("portico_cache_coalesced_total").increment(1);
    }

    /// Registra un request que salto la cache
    pub fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
        counter!("portico_cache_bypass_total").increment(1);
    }

    /// Registra un request que excedio el timeout
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("portico_request_timeouts_total").increment(1);
    }

    /// Actualiza el gauge de fills en curso
    pub fn update_fills_in_flight(&self, count: usize) {
        gauge!("portico_cache_fills_in_flight").set(count as f64);
    }

    /// Registra la duracion de un fill contra el origin
    pub fn record_fill_duration(&self, origin: &'static str, duration: Duration) {
        histogram!("portico_cache_fill_seconds", "origin" => origin).record(duration.as_secs_f64());
    }

    /// Calcula hit rate (para logging/debugging)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    pub fn bypassed(&self) -> u64 {
        self.bypassed.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}
