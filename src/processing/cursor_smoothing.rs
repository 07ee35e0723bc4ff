//! Render-side smoothing of remote cursors
//!
//! Replay produces discrete positions at the sender's sampling rate. When
//! smoothing is enabled each remote cursor chases its latest replayed
//! position through a spring, stepped once per animation frame. Batch
//! boundaries and long jumps snap the spring instead of easing across them.

use crate::capture::types::IdentityId;
use crate::config::SpringConfig;
use crate::processing::spring::Spring2D;
use crate::receiver::replayer::ReplayEvent;
use std::collections::HashMap;

/// Jumps longer than this (in pixels) snap instead of easing
pub const DEFAULT_TELEPORT_THRESHOLD: f64 = 500.0;

/// Distance under which a spring counts as having arrived
const SETTLE_THRESHOLD: f64 = 0.5;

pub fn detect_teleport(from: (f64, f64), to: (f64, f64), threshold_px: f64) -> bool {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    (dx * dx + dy * dy).sqrt() > threshold_px
}

#[derive(Debug)]
struct TrackedCursor {
    spring: Spring2D,
    target: (f64, f64),
    snap_next: bool,
}

/// Springs for every remote cursor
#[derive(Debug)]
pub struct CursorSmoother {
    config: SpringConfig,
    teleport_threshold: f64,
    cursors: HashMap<IdentityId, TrackedCursor>,
}

impl CursorSmoother {
    pub fn new(config: SpringConfig) -> Self {
        Self::with_teleport_threshold(config, DEFAULT_TELEPORT_THRESHOLD)
    }

    pub fn with_teleport_threshold(config: SpringConfig, teleport_threshold: f64) -> Self {
        Self {
            config,
            teleport_threshold,
            cursors: HashMap::new(),
        }
    }

    /// Feed one replay event into the matching cursor's target
    pub fn observe(&mut self, event: &ReplayEvent) {
        match *event {
            ReplayEvent::BatchStarted { identity, .. } => {
                if let Some(cursor) = self.cursors.get_mut(&identity) {
                    cursor.snap_next = true;
                }
            }
            ReplayEvent::Moved { identity, x, y } | ReplayEvent::Clicked { identity, x, y, .. } => {
                self.retarget(identity, (x, y));
            }
        }
    }

    fn retarget(&mut self, identity: IdentityId, target: (f64, f64)) {
        let threshold = self.teleport_threshold;
        let cursor = self.cursors.entry(identity).or_insert_with(|| TrackedCursor {
            spring: Spring2D::at_rest(target.0, target.1),
            target,
            snap_next: false,
        });

        if cursor.snap_next || detect_teleport(cursor.target, target, threshold) {
            cursor.spring.snap(target.0, target.1);
            cursor.snap_next = false;
        }
        cursor.target = target;
    }

    /// Step every spring by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        for cursor in self.cursors.values_mut() {
            cursor.spring.step(cursor.target, &self.config, dt);
        }
    }

    /// Smoothed position, if the cursor has been seen
    pub fn position(&self, identity: IdentityId) -> Option<(f64, f64)> {
        self.cursors.get(&identity).map(|c| c.spring.position())
    }

    pub fn forget(&mut self, identity: IdentityId) {
        self.cursors.remove(&identity);
    }

    pub fn is_settled(&self) -> bool {
        self.cursors
            .values()
            .all(|c| c.spring.is_settled(c.target, SETTLE_THRESHOLD))
    }
}
