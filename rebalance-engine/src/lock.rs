//! The per-portfolio rebalance lock (spec §5): a `(is_rebalancing,
//! started_at)` pair guarded by a mutex held only around the two field
//! transitions, never across a broker call.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct LockState {
    is_rebalancing: bool,
    started_at: Option<Instant>,
}

/// Outcome of [`RebalanceLock::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The lock was free, or stuck past its TTL and taken over.
    Acquired,
    /// Another rebalance holds the lock and it has not expired; the caller
    /// must return without side effects.
    Skip,
}

#[derive(Debug)]
pub struct RebalanceLock {
    state: Mutex<LockState>,
}

impl Default for RebalanceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RebalanceLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                is_rebalancing: false,
                started_at: None,
            }),
        }
    }

    /// Implements spec §5's four-step acquire protocol. A lock held longer
    /// than `ttl` is considered stuck and taken over rather than skipped —
    /// a liveness guarantee, not a correctness one.
    pub fn try_acquire(&self, ttl: Duration) -> Acquisition {
        let mut state = self.state.lock();

        if !state.is_rebalancing {
            state.is_rebalancing = true;
            state.started_at = Some(Instant::now());
            return Acquisition::Acquired;
        }

        let started_at = state
            .started_at
            .expect("is_rebalancing implies started_at is set");

        if started_at.elapsed() < ttl {
            return Acquisition::Skip;
        }

        state.started_at = Some(Instant::now());
        Acquisition::Acquired
    }

    pub fn release(&self) {
        let mut state = self.state.lock();
        state.is_rebalancing = false;
        state.started_at = None;
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().is_rebalancing
    }
}
