//! Dobles de store, origin y sink para tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use portico_core::{CacheEntry, CacheKey};
use portico_server::AppState;
use portico_server::invalidation::InvalidationState;
use portico_server::metrics::detached_handle;
use portico_server::observability::{EventKind, ObservabilitySink};
use portico_server::origin::{OriginError, OriginFetcher, OriginRequest, OriginResponse};
use portico_server::pipeline::{CacheAsidePipeline, PipelineConfig};
use portico_store::{CacheStore, MemoryStore, StoreError};

pub fn key(path: &str) -> CacheKey {
    CacheKey::from_path(path).unwrap()
}

/// Origin que cuenta llamadas, con latencia y fallo configurables.
pub struct CountingOrigin {
    body: String,
    delay: Duration,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingOrigin {
    pub fn new(body: &str) -> Arc<Self> {
        Self::with_delay(body, Duration::ZERO)
    }

    pub fn with_delay(body: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_string(),
            delay,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        let origin = Self::with_delay("", delay);
        origin.set_failing(true);
        origin
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginFetcher for CountingOrigin {
    async fn fetch(&self, _request: &OriginRequest) -> Result<OriginResponse, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(OriginError::unavailable("origin exploded at 10.0.0.9"));
        }
        Ok(OriginResponse::new(
            200,
            self.body.clone(),
            Some("text/plain".to_string()),
        ))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Store en memoria con fallos de lectura/escritura activables.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_invalidations: AtomicBool,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store completamente caido.
    pub fn down() -> Arc<Self> {
        let store = Self::new();
        store.fail_reads(true);
        store.fail_writes(true);
        store.fail_invalidations(true);
        store
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_invalidations(&self, fail: bool) {
        self.fail_invalidations.store(fail, Ordering::SeqCst);
    }

    /// Numero de `set` intentados.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("faulty", "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FaultyStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_writes)?;
        self.inner.set(key, entry, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        Self::check(&self.fail_invalidations)?;
        self.inner.delete(key).await
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        Self::check(&self.fail_invalidations)?;
        self.inner.invalidate_all().await
    }

    fn backend_type(&self) -> &'static str {
        "faulty"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Self::check(&self.fail_reads)
    }
}

/// Sink que guarda los eventos reportados.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(EventKind, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn events(&self) -> Vec<(EventKind, String)> {
        self.events.lock().clone()
    }
}

impl ObservabilitySink for RecordingSink {
    fn record(&self, kind: EventKind, detail: &str) {
        self.events.lock().push((kind, detail.to_string()));
    }
}

pub fn config(ttl_secs: u64, follower_wait: Duration) -> PipelineConfig {
    PipelineConfig {
        ttl: Duration::from_secs(ttl_secs),
        follower_wait,
    }
}

pub fn pipeline(
    store: Arc<dyn CacheStore>,
    origin: Arc<dyn OriginFetcher>,
    sink: Arc<RecordingSink>,
) -> Arc<CacheAsidePipeline> {
    Arc::new(
        CacheAsidePipeline::new(store, origin, config(3600, Duration::from_secs(5)))
            .with_sink(sink),
    )
}

/// Router de cache completo sobre el pipeline dado, con invalidacion admin.
pub fn cache_app(pipeline: Arc<CacheAsidePipeline>, request_timeout: Duration) -> Router {
    cache_app_with_admin(pipeline, request_timeout, true)
}

pub fn cache_app_with_admin(
    pipeline: Arc<CacheAsidePipeline>,
    request_timeout: Duration,
    admin_invalidation: bool,
) -> Router {
    let state = AppState::new(
        pipeline,
        Arc::new(InvalidationState::new()),
        request_timeout,
    )
    .with_admin_invalidation(admin_invalidation);
    portico_server::create_router_with_state(state, detached_handle())
}
