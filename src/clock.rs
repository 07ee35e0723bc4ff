//! Millisecond clocks
//!
//! Every timestamp in the pipeline is a millisecond count from an arbitrary
//! per-process origin. Only differences between two readings of the same
//! clock are ever compared, so sender and receiver never need to agree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of "now" for the sampler, batcher and replayer
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's origin. Never decreases.
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `Instant`, origin at construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
