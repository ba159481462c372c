//! Coordination record of the origin fills currently running.
//!
//! The first request that misses on a key registers a slot and becomes the
//! leader; later requests for the same key subscribe to that slot. A slot is a
//! `watch` channel holding `None` until the leader publishes its outcome.
//! Dropping the leader's [`FillGuard`] removes the slot, which closes the
//! channel: followers that were still waiting wake up with no outcome and
//! retry, so a cancelled leader never strands its followers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use portico_core::CacheKey;
use tokio::sync::watch;

use crate::origin::{OriginError, OriginResponse};

/// Result of a fill, shared by the leader with its followers.
pub type FillOutcome = Result<OriginResponse, OriginError>;

type Slot = Arc<watch::Sender<Option<FillOutcome>>>;
type SlotMap = HashMap<CacheKey, Slot>;

/// Set of keys being filled from the origin.
#[derive(Clone, Default)]
pub struct InFlightFillSet {
    fills: Arc<Mutex<SlotMap>>,
}

/// Role assigned by [`InFlightFillSet::join`].
pub enum FillRole {
    /// No fill was running: the caller must fetch and publish.
    Leader(FillGuard),
    /// A fill is running: the caller waits for its outcome.
    Follower(FillWaiter),
}

impl InFlightFillSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the caller as leader for `key`, or attaches it to the running fill.
    ///
    /// Check and registration happen under one lock, so two concurrent callers
    /// can never both become leader for the same key.
    pub fn join(&self, key: &CacheKey) -> FillRole {
        let mut fills = self.fills.lock();

        if let Some(slot) = fills.get(key) {
            return FillRole::Follower(FillWaiter {
                rx: slot.subscribe(),
            });
        }

        let (tx, _rx) = watch::channel(None);
        let slot = Arc::new(tx);
        fills.insert(key.clone(), Arc::clone(&slot));

        FillRole::Leader(FillGuard {
            key: key.clone(),
            slot,
            fills: Arc::clone(&self.fills),
        })
    }

    /// Returns true if a fill for `key` is running.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.fills.lock().contains_key(key)
    }

    /// Number of fills currently running.
    pub fn len(&self) -> usize {
        self.fills.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Leader side of a fill. Deregisters the key when dropped.
pub struct FillGuard {
    key: CacheKey,
    slot: Slot,
    fills: Arc<Mutex<SlotMap>>,
}

impl FillGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Publishes the outcome to every follower, then deregisters the key.
    pub fn complete(self, outcome: FillOutcome) {
        self.slot.send_replace(Some(outcome));
    }
}

impl Drop for FillGuard {
    fn drop(&mut self) {
        let mut fills = self.fills.lock();
        if fills
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
        {
            fills.remove(&self.key);
        }
    }
}

/// Follower side of a fill.
pub struct FillWaiter {
    rx: watch::Receiver<Option<FillOutcome>>,
}

impl FillWaiter {
    /// Waits for the leader's outcome.
    ///
    /// Returns `None` if the leader went away without publishing.
    pub async fn outcome(&mut self) -> Option<FillOutcome> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}
