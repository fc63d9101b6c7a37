//! In-flight computations: one per missing key, shared by every caller
//! that misses on that key while it runs.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Serialized value, or the failure message of the computation.
pub(crate) type Outcome = Result<Arc<Vec<u8>>, String>;

#[derive(Debug, Default)]
pub(crate) struct Flight {
    state: Mutex<Option<Outcome>>,
    ready: Condvar,
    /// Set when an invalidation covers this key while it is computing.
    stale: AtomicBool,
}

impl Flight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until the leader publishes.
    pub(crate) fn wait(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut state);
        }
    }

    /// Publish once; later calls are ignored.
    pub(crate) fn publish(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(outcome);
            self.ready.notify_all();
        }
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}
