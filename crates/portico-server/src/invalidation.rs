//! Background cache invalidation loop.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use portico_store::CacheStore;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::observability::{EventKind, ObservabilitySink};

/// Tracks the outcome of invalidation ticks for the health endpoint.
#[derive(Debug, Default)]
pub struct InvalidationState {
    ticks: RwLock<u64>,
    /// Consecutive failed ticks.
    failure_count: RwLock<u32>,
    last_success: RwLock<Option<SystemTime>>,
    last_error: RwLock<Option<String>>,
}

/// Serializable view of [`InvalidationState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationSnapshot {
    pub ticks: u64,
    pub consecutive_failures: u32,
    /// Milliseconds since the Unix epoch.
    pub last_success_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl InvalidationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful tick.
    pub fn record_success(&self) {
        let mut ticks = self.ticks.write();
        let mut failure_count = self.failure_count.write();
        let mut last_success = self.last_success.write();
        let mut last_error = self.last_error.write();

        *ticks += 1;
        *failure_count = 0;
        *last_success = Some(SystemTime::now());
        *last_error = None;
    }

    /// Records a failed tick.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut ticks = self.ticks.write();
        let mut failure_count = self.failure_count.write();
        let mut last_error = self.last_error.write();

        *ticks += 1;
        *failure_count += 1;
        *last_error = Some(error.into());
    }

    pub fn ticks(&self) -> u64 {
        *self.ticks.read()
    }

    pub fn failure_count(&self) -> u32 {
        *self.failure_count.read()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn last_success(&self) -> Option<SystemTime> {
        *self.last_success.read()
    }

    pub fn snapshot(&self) -> InvalidationSnapshot {
        InvalidationSnapshot {
            ticks: self.ticks(),
            consecutive_failures: self.failure_count(),
            last_success_ms: self.last_success().and_then(|t| {
                t.duration_since(UNIX_EPOCH)
                    .ok()
                    .map(|d| d.as_millis() as u64)
            }),
            last_error: self.last_error(),
        }
    }
}

/// Handle for controlling a running invalidation loop.
pub struct InvalidationHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl InvalidationHandle {
    /// Signals the loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for InvalidationHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Process-wide task clearing the store on a fixed schedule.
///
/// A failed tick is recorded and reported; the next tick still fires on time.
pub struct InvalidationLoop {
    store: Arc<dyn CacheStore>,
    interval: Duration,
    sink: Arc<dyn ObservabilitySink>,
    state: Arc<InvalidationState>,
}

impl InvalidationLoop {
    pub fn new(
        store: Arc<dyn CacheStore>,
        interval: Duration,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            store,
            interval,
            sink,
            state: Arc::new(InvalidationState::new()),
        }
    }

    /// Returns the shared state, updated after every tick.
    pub fn state(&self) -> Arc<InvalidationState> {
        Arc::clone(&self.state)
    }

    /// Starts the background task. The first tick fires one interval from now.
    ///
    /// Returns a handle that can be used to stop the loop.
    pub fn start(self) -> InvalidationHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = InvalidationHandle { shutdown_tx };

        tokio::spawn(self.run(shutdown_rx));

        handle
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            backend = self.store.backend_type(),
            "Starting cache invalidation loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Cache invalidation loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Performs a single invalidation tick.
    pub async fn run_once(&self) {
        debug!("Starting scheduled cache invalidation");

        match self.store.invalidate_all().await {
            Ok(()) => {
                self.state.record_success();
                info!("Cache invalidated");
            },
            Err(e) => {
                self.state.record_failure(e.to_string());
                self.sink
                    .record(EventKind::CacheInvalidateFailed, &e.to_string());
                warn!(error = %e, "Scheduled cache invalidation failed");
            },
        }
    }
}
