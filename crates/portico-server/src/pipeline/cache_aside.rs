//! Lookup, fill and invalidation of cached responses.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use portico_core::{CacheEntry, CacheKey, Clock, KeyError, SystemClock};
use portico_store::{CacheStore, StoreError};
use tracing::{debug, instrument};

use super::inflight::{FillGuard, FillOutcome, FillRole, InFlightFillSet};
use crate::metrics::CacheMetrics;
use crate::observability::{EventKind, MetricsSink, ObservabilitySink};
use crate::origin::{OriginError, OriginFetcher, OriginRequest, OriginResponse};

/// Tunables of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// TTL applied to every cache write.
    pub ttl: Duration,
    /// How long a follower waits on the leader before fetching itself.
    pub follower_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            follower_wait: Duration::from_secs(5),
        }
    }
}

/// How a response was obtained. Sent to clients as `x-cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the store.
    Hit,
    /// Fetched from the origin by this request.
    Miss,
    /// Received from a concurrent request's fill.
    Coalesced,
    /// Fetched from the origin because the store was unreachable.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Coalesced => "COALESCED",
            Self::Bypass => "BYPASS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response returned by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache: CacheStatus,
}

impl PipelineResponse {
    fn from_entry(entry: CacheEntry, cache: CacheStatus) -> Self {
        Self {
            status: entry.status,
            body: entry.body,
            content_type: entry.content_type,
            cache,
        }
    }

    fn from_origin(response: OriginResponse, cache: CacheStatus) -> Self {
        Self {
            status: response.status,
            body: response.body,
            content_type: response.content_type,
            cache,
        }
    }
}

/// Errors surfaced to the client. Cache store failures never appear here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request path: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("origin unavailable: {0}")]
    OriginUnavailable(String),

    #[error("request timed out")]
    Timeout,
}

impl From<OriginError> for PipelineError {
    fn from(err: OriginError) -> Self {
        match err {
            OriginError::Unavailable { reason } => Self::OriginUnavailable(reason),
        }
    }
}

/// Whether a fill may write to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillMode {
    /// The store answered the lookup: fill it.
    Fill,
    /// The store failed the lookup: serve from the origin only.
    Bypass,
}

impl FillMode {
    fn leader_status(self) -> CacheStatus {
        match self {
            Self::Fill => CacheStatus::Miss,
            Self::Bypass => CacheStatus::Bypass,
        }
    }
}

enum Lookup {
    Hit(CacheEntry),
    Miss,
    Unavailable,
}

/// Cache-aside pipeline over a long-lived store and origin.
///
/// A miss is filled by exactly one request per key at a time; concurrent
/// requests for the same key wait on that fill, up to `follower_wait`.
pub struct CacheAsidePipeline {
    store: Arc<dyn CacheStore>,
    origin: Arc<dyn OriginFetcher>,
    sink: Arc<dyn ObservabilitySink>,
    clock: Arc<dyn Clock>,
    fills: InFlightFillSet,
    config: PipelineConfig,
    metrics: CacheMetrics,
}

impl CacheAsidePipeline {
    pub fn new(
        store: Arc<dyn CacheStore>,
        origin: Arc<dyn OriginFetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            origin,
            sink: Arc::new(MetricsSink),
            clock: Arc::new(SystemClock),
            fills: InFlightFillSet::new(),
            config,
            metrics: CacheMetrics::new(),
        }
    }

    /// Replaces the observability sink.
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the clock used for TTL checks and entry timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn ObservabilitySink> {
        &self.sink
    }

    pub fn fills(&self) -> &InFlightFillSet {
        &self.fills
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Normalizes `raw_path` and handles it within `timeout`.
    pub async fn handle_path(
        &self,
        raw_path: &str,
        timeout: Duration,
    ) -> Result<PipelineResponse, PipelineError> {
        let key = CacheKey::from_path(raw_path)?;
        self.handle_within(&key, timeout).await
    }

    /// Handles `key`, giving up after `timeout`.
    ///
    /// On timeout every wait is dropped; a leader's registration goes with it,
    /// so its followers take over the fill.
    pub async fn handle_within(
        &self,
        key: &CacheKey,
        timeout: Duration,
    ) -> Result<PipelineResponse, PipelineError> {
        match tokio::time::timeout(timeout, self.handle(key)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_timeout();
                debug!(key = %key, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                Err(PipelineError::Timeout)
            },
        }
    }

    /// Serves `key` from the cache, filling it from the origin on a miss.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn handle(&self, key: &CacheKey) -> Result<PipelineResponse, PipelineError> {
        match self.lookup(key).await {
            Lookup::Hit(entry) => {
                self.metrics.record_hit();
                Ok(PipelineResponse::from_entry(entry, CacheStatus::Hit))
            },
            Lookup::Miss => self.fill(key, FillMode::Fill).await,
            Lookup::Unavailable => self.fill(key, FillMode::Bypass).await,
        }
    }

    /// Removes one entry.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.store.delete(key).await.inspect_err(|e| {
            self.sink
                .record(EventKind::CacheInvalidateFailed, &format!("{}: {}", key, e));
        })
    }

    /// Removes every entry.
    pub async fn invalidate_all(&self) -> Result<(), StoreError> {
        self.store.invalidate_all().await.inspect_err(|e| {
            self.sink
                .record(EventKind::CacheInvalidateFailed, &e.to_string());
        })
    }

    async fn lookup(&self, key: &CacheKey) -> Lookup {
        match self.store.get(key).await {
            Ok(Some(entry)) if !entry.is_expired_at(self.clock.now()) => Lookup::Hit(entry),
            Ok(Some(_)) => {
                debug!(key = %key, "Stored entry is past its TTL");
                Lookup::Miss
            },
            Ok(None) => Lookup::Miss,
            Err(e) => {
                self.sink
                    .record(EventKind::CacheReadFailed, &format!("{}: {}", key, e));
                Lookup::Unavailable
            },
        }
    }

    async fn fill(
        &self,
        key: &CacheKey,
        mode: FillMode,
    ) -> Result<PipelineResponse, PipelineError> {
        loop {
            let mut waiter = match self.fills.join(key) {
                FillRole::Leader(guard) => return self.lead(key, guard, mode).await,
                FillRole::Follower(waiter) => waiter,
            };

            match tokio::time::timeout(self.config.follower_wait, waiter.outcome()).await {
                Ok(Some(outcome)) => {
                    self.metrics.record_coalesced();
                    return outcome
                        .map(|response| {
                            PipelineResponse::from_origin(response, CacheStatus::Coalesced)
                        })
                        .map_err(PipelineError::from);
                },
                Ok(None) => {
                    // El leader se fue sin publicar: reintentar el join
                    debug!(key = %key, "Fill abandoned by its leader, retrying");
                },
                Err(_) => {
                    self.sink.record(
                        EventKind::FollowerWaitElapsed,
                        &format!("{} after {:?}", key, self.config.follower_wait),
                    );
                    return self.fetch_and_store(key, mode).await;
                },
            }
        }
    }

    async fn lead(
        &self,
        key: &CacheKey,
        guard: FillGuard,
        mode: FillMode,
    ) -> Result<PipelineResponse, PipelineError> {
        // Otro fill pudo terminar entre el lookup y el registro
        if mode == FillMode::Fill
            && let Ok(Some(entry)) = self.store.get(key).await
            && !entry.is_expired_at(self.clock.now())
        {
            guard.complete(Ok(OriginResponse::new(
                entry.status,
                entry.body.clone(),
                entry.content_type.clone(),
            )));
            self.metrics.record_hit();
            return Ok(PipelineResponse::from_entry(entry, CacheStatus::Hit));
        }

        self.metrics.update_fills_in_flight(self.fills.len());
        let outcome = self.fetch(key, mode).await;

        // Orden: escritura en store, publicacion, deregistro
        guard.complete(outcome.clone());
        self.metrics.update_fills_in_flight(self.fills.len());

        outcome
            .map(|response| PipelineResponse::from_origin(response, mode.leader_status()))
            .map_err(PipelineError::from)
    }

    async fn fetch_and_store(
        &self,
        key: &CacheKey,
        mode: FillMode,
    ) -> Result<PipelineResponse, PipelineError> {
        self.fetch(key, mode)
            .await
            .map(|response| PipelineResponse::from_origin(response, mode.leader_status()))
            .map_err(PipelineError::from)
    }

    /// Fetches from the origin and, when allowed, writes the result.
    async fn fetch(&self, key: &CacheKey, mode: FillMode) -> FillOutcome {
        match mode {
            FillMode::Fill => self.metrics.record_miss(),
            FillMode::Bypass => self.metrics.record_bypass(),
        }

        let started = Instant::now();
        let response = self
            .origin
            .fetch(&OriginRequest::new(key.clone()))
            .await
            .inspect_err(|e| {
                self.sink
                    .record(EventKind::OriginFetchFailed, &format!("{}: {}", key, e));
            })?;
        self.metrics
            .record_fill_duration(self.origin.name(), started.elapsed());

        if mode == FillMode::Fill {
            self.write(key, &response).await;
        }
        Ok(response)
    }

    async fn write(&self, key: &CacheKey, response: &OriginResponse) {
        let entry = CacheEntry::new(
            response.body.clone(),
            response.status,
            response.content_type.clone(),
            self.clock.now(),
            self.config.ttl,
        );

        if let Err(e) = self.store.set(key, entry, self.config.ttl).await {
            self.sink
                .record(EventKind::CacheWriteFailed, &format!("{}: {}", key, e));
        }
    }
}
