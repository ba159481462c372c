//! Application state.

use std::sync::Arc;
use std::time::Duration;

use portico_store::CacheStore;

use crate::balancer::BackendRouter;
use crate::invalidation::InvalidationState;
use crate::observability::{MetricsSink, ObservabilitySink};
use crate::pipeline::CacheAsidePipeline;

/// State shared by the handlers of the cache listeners.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<CacheAsidePipeline>,
    invalidation: Arc<InvalidationState>,
    request_timeout: Duration,
    admin_invalidation: bool,
}

impl AppState {
    pub fn new(
        pipeline: Arc<CacheAsidePipeline>,
        invalidation: Arc<InvalidationState>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            invalidation,
            request_timeout,
            admin_invalidation: false,
        }
    }

    /// Enables the `DELETE /_portico/cache` endpoints.
    pub fn with_admin_invalidation(mut self, enabled: bool) -> Self {
        self.admin_invalidation = enabled;
        self
    }

    pub fn pipeline(&self) -> &CacheAsidePipeline {
        self.pipeline.as_ref()
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.pipeline.store().as_ref()
    }

    pub fn invalidation(&self) -> &InvalidationState {
        self.invalidation.as_ref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn admin_invalidation(&self) -> bool {
        self.admin_invalidation
    }
}

/// State shared by the handlers of the load-balancer listener.
#[derive(Clone)]
pub struct BalancerState {
    router: Arc<BackendRouter>,
    client: reqwest::Client,
    sink: Arc<dyn ObservabilitySink>,
    request_timeout: Duration,
}

impl BalancerState {
    pub fn new(router: BackendRouter, client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            router: Arc::new(router),
            client,
            sink: Arc::new(MetricsSink),
            request_timeout,
        }
    }

    /// Replaces the observability sink.
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn router(&self) -> &BackendRouter {
        self.router.as_ref()
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn sink(&self) -> &dyn ObservabilitySink {
        self.sink.as_ref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
