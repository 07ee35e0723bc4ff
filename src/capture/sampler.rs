//! Pointer sampling
//!
//! Movement events are throttled to one per `sampling_interval_ms`; clicks
//! are always recorded. Each action carries its offset from the start of the
//! current batch.

use crate::capture::types::Action;
use crate::clock::Clock;
use crate::config::SharedSettings;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;

/// Actions recorded since the last batch tick.
///
/// Shared between the sampler (writer on every pointer event) and the
/// batcher (drains it on every tick).
#[derive(Debug)]
pub struct CaptureBuffer {
    actions: Vec<Action>,
    batch_start_ms: u64,
    last_sample_ms: Option<u64>,
}

pub type SharedCapture = Arc<ParkingMutex<CaptureBuffer>>;

impl CaptureBuffer {
    pub fn new(batch_start_ms: u64) -> Self {
        Self {
            actions: Vec::new(),
            batch_start_ms,
            last_sample_ms: None,
        }
    }

    pub fn shared(batch_start_ms: u64) -> SharedCapture {
        Arc::new(ParkingMutex::new(Self::new(batch_start_ms)))
    }

    pub fn batch_start_ms(&self) -> u64 {
        self.batch_start_ms
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Snapshot and clear the recorded actions, starting a new batch at `now_ms`
    pub fn take(&mut self, now_ms: u64) -> Vec<Action> {
        self.batch_start_ms = now_ms;
        std::mem::take(&mut self.actions)
    }

    fn offset(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.batch_start_ms)
    }
}

/// What happened to a movement event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Recorded(Action),
    /// Arrived within the sampling interval of the previous sample
    Throttled,
}

/// Turns raw pointer events into batch-relative actions
pub struct Sampler {
    buffer: SharedCapture,
    clock: Arc<dyn Clock>,
    settings: SharedSettings,
    local_cursor: ParkingMutex<Option<(f64, f64)>>,
}

impl Sampler {
    pub fn new(buffer: SharedCapture, clock: Arc<dyn Clock>, settings: SharedSettings) -> Self {
        Self {
            buffer,
            clock,
            settings,
            local_cursor: ParkingMutex::new(None),
        }
    }

    /// Record a movement sample unless the previous one is too recent.
    ///
    /// The local cursor position is updated either way.
    pub fn on_pointer_move(&self, x: f64, y: f64) -> SampleOutcome {
        *self.local_cursor.lock() = Some((x, y));

        let now = self.clock.now_ms();
        let interval = self.settings.get().sampling_interval_ms;

        let mut buffer = self.buffer.lock();
        if let Some(last) = buffer.last_sample_ms {
            if now.saturating_sub(last) < interval {
                return SampleOutcome::Throttled;
            }
        }

        let action = Action::movement(x, y, buffer.offset(now));
        buffer.actions.push(action);
        buffer.last_sample_ms = Some(now);
        tracing::trace!("Sampled movement ({}, {}) at +{}ms", x, y, action.time_since_batch_start);
        SampleOutcome::Recorded(action)
    }

    /// Record a click. Clicks are never throttled.
    pub fn on_click(&self, x: f64, y: f64) -> Action {
        *self.local_cursor.lock() = Some((x, y));

        let now = self.clock.now_ms();
        let mut buffer = self.buffer.lock();
        let action = Action::click(x, y, buffer.offset(now));
        buffer.actions.push(action);
        tracing::debug!("Recorded click ({}, {}) at +{}ms", x, y, action.time_since_batch_start);
        action
    }

    /// Where the local pointer was last seen, sampled or not
    pub fn local_cursor(&self) -> Option<(f64, f64)> {
        *self.local_cursor.lock()
    }

    pub fn buffer(&self) -> &SharedCapture {
        &self.buffer
    }
}
