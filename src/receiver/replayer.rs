//! Per-identity batch playback
//!
//! Each remote identity owns a FIFO of received batches. One batch plays at
//! a time: its actions are applied once the local time elapsed since the
//! batch started playing reaches their recorded offset. When a batch runs
//! dry the next queued batch starts immediately.

use crate::capture::types::{Action, ActionKind, Batch, IdentityId, Profile};
use crate::config::AppConfig;
use crate::receiver::watcher::WatchEvent;
use std::collections::{HashMap, VecDeque};

/// Delay before asking again for a profile the directory did not have
const PROFILE_RETRY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Offsets above this are treated as this when deciding whether an action is due
    pub max_action_offset_ms: u64,
    pub pulse_duration_ms: u64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            max_action_offset_ms: 1000,
            pulse_duration_ms: 350,
        }
    }
}

impl From<&AppConfig> for ReplayOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_action_offset_ms: config.max_action_offset_ms,
            pulse_duration_ms: config.pulse_duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Visible effect of replaying one action
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayEvent {
    /// A batch became active; its first position is a jump, not a continuation
    BatchStarted { identity: IdentityId, version: u64 },
    Moved { identity: IdentityId, x: f64, y: f64 },
    /// Click applied; a pulse is shown until `pulse_until_ms`
    Clicked {
        identity: IdentityId,
        x: f64,
        y: f64,
        pulse_until_ms: u64,
    },
}

/// A remote cursor ready to be drawn
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleCursor {
    pub identity: IdentityId,
    pub profile: Profile,
    pub x: f64,
    pub y: f64,
    pub pulsing: bool,
}

#[derive(Debug)]
struct ActiveBatch {
    version: u64,
    actions: VecDeque<Action>,
    playback_start_ms: u64,
}

#[derive(Debug, Clone)]
enum ProfileStatus {
    Missing { retry_at_ms: u64 },
    Pending,
    Loaded(Profile),
}

#[derive(Debug)]
struct ReplayState {
    queue: VecDeque<Batch>,
    active: Option<ActiveBatch>,
    position: Option<(f64, f64)>,
    pulse_until_ms: Option<u64>,
    profile: ProfileStatus,
}

impl ReplayState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            active: None,
            position: None,
            pulse_until_ms: None,
            profile: ProfileStatus::Missing { retry_at_ms: 0 },
        }
    }

    fn has_pending_batches(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    fn advance(
        &mut self,
        identity: IdentityId,
        now_ms: u64,
        options: &ReplayOptions,
        out: &mut Vec<ReplayEvent>,
    ) {
        loop {
            if self.active.is_none() {
                let Some(batch) = self.queue.pop_front() else {
                    return;
                };
                out.push(ReplayEvent::BatchStarted {
                    identity,
                    version: batch.version,
                });
                self.active = Some(ActiveBatch {
                    version: batch.version,
                    actions: batch.actions.into(),
                    playback_start_ms: now_ms,
                });
            }

            let Some(active) = self.active.as_mut() else {
                return;
            };
            let elapsed = now_ms.saturating_sub(active.playback_start_ms);

            while let Some(action) = active.actions.front().copied() {
                if action.time_since_batch_start.min(options.max_action_offset_ms) > elapsed {
                    break;
                }
                active.actions.pop_front();

                self.position = Some((action.x, action.y));
                match action.kind {
                    ActionKind::Movement => out.push(ReplayEvent::Moved {
                        identity,
                        x: action.x,
                        y: action.y,
                    }),
                    ActionKind::Click => {
                        let pulse_until_ms = now_ms + options.pulse_duration_ms;
                        self.pulse_until_ms = Some(pulse_until_ms);
                        out.push(ReplayEvent::Clicked {
                            identity,
                            x: action.x,
                            y: action.y,
                            pulse_until_ms,
                        });
                    }
                }
            }

            if !active.actions.is_empty() {
                return;
            }
            tracing::trace!("Finished batch v{} of {}", active.version, identity);
            self.active = None;
        }
    }
}

/// Playback state of every remote identity
#[derive(Debug, Default)]
pub struct Replayer {
    options: ReplayOptions,
    states: HashMap<IdentityId, ReplayState>,
}

impl Replayer {
    pub fn new(options: ReplayOptions) -> Self {
        Self {
            options,
            states: HashMap::new(),
        }
    }

    /// Queue a batch behind whatever its identity is already playing
    pub fn enqueue(&mut self, batch: Batch) {
        let state = self
            .states
            .entry(batch.identity)
            .or_insert_with(ReplayState::new);
        tracing::trace!(
            "Queued batch v{} for {} (queue length {})",
            batch.version,
            batch.identity,
            state.queue.len() + 1
        );
        state.queue.push_back(batch);
    }

    /// Discard everything known about an identity
    pub fn remove(&mut self, identity: IdentityId) {
        if self.states.remove(&identity).is_some() {
            tracing::debug!("Discarded replay state of {}", identity);
        }
    }

    pub fn apply(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Batch(batch) => self.enqueue(batch),
            WatchEvent::Departed(identity) => self.remove(identity),
        }
    }

    /// Advance every identity to `now_ms` and report what changed
    pub fn tick(&mut self, now_ms: u64) -> Vec<ReplayEvent> {
        let mut out = Vec::new();
        for (identity, state) in self.states.iter_mut() {
            state.advance(*identity, now_ms, &self.options, &mut out);
        }
        out
    }

    /// Whether another frame could change anything
    pub fn has_work(&self, now_ms: u64) -> bool {
        self.states.values().any(|state| {
            state.has_pending_batches() || state.pulse_until_ms.is_some_and(|until| until > now_ms)
        })
    }

    pub fn playback_state(&self, identity: IdentityId) -> PlaybackState {
        match self.states.get(&identity) {
            Some(state) if state.active.is_some() => PlaybackState::Playing,
            _ => PlaybackState::Idle,
        }
    }

    /// Batches waiting behind the active one
    pub fn queue_len(&self, identity: IdentityId) -> usize {
        self.states.get(&identity).map_or(0, |state| state.queue.len())
    }

    pub fn position(&self, identity: IdentityId) -> Option<(f64, f64)> {
        self.states.get(&identity).and_then(|state| state.position)
    }

    pub fn is_pulsing(&self, identity: IdentityId, now_ms: u64) -> bool {
        self.states
            .get(&identity)
            .and_then(|state| state.pulse_until_ms)
            .is_some_and(|until| until > now_ms)
    }

    pub fn identities(&self) -> Vec<IdentityId> {
        let mut ids: Vec<IdentityId> = self.states.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Identities whose profile should be fetched now. They are marked pending.
    pub fn take_missing_profiles(&mut self, now_ms: u64) -> Vec<IdentityId> {
        let mut due = Vec::new();
        for (identity, state) in self.states.iter_mut() {
            if let ProfileStatus::Missing { retry_at_ms } = state.profile {
                if retry_at_ms <= now_ms {
                    state.profile = ProfileStatus::Pending;
                    due.push(*identity);
                }
            }
        }
        due
    }

    /// Earliest time a missing profile becomes due for another lookup
    pub fn next_profile_retry_ms(&self) -> Option<u64> {
        self.states
            .values()
            .filter_map(|state| match state.profile {
                ProfileStatus::Missing { retry_at_ms } => Some(retry_at_ms),
                _ => None,
            })
            .min()
    }

    pub fn set_profile(&mut self, identity: IdentityId, profile: Profile) {
        if let Some(state) = self.states.get_mut(&identity) {
            state.profile = ProfileStatus::Loaded(profile);
        }
    }

    /// The profile lookup came back empty or failed; ask again later
    pub fn profile_unavailable(&mut self, identity: IdentityId, now_ms: u64) {
        if let Some(state) = self.states.get_mut(&identity) {
            state.profile = ProfileStatus::Missing {
                retry_at_ms: now_ms + PROFILE_RETRY_MS,
            };
        }
    }

    /// Cursors with a known position and a loaded profile
    pub fn visible_cursors(&self, now_ms: u64) -> Vec<VisibleCursor> {
        let mut cursors: Vec<VisibleCursor> = self
            .states
            .iter()
            .filter_map(|(identity, state)| {
                let ProfileStatus::Loaded(profile) = &state.profile else {
                    return None;
                };
                let (x, y) = state.position?;
                Some(VisibleCursor {
                    identity: *identity,
                    profile: profile.clone(),
                    x,
                    y,
                    pulsing: state.pulse_until_ms.is_some_and(|until| until > now_ms),
                })
            })
            .collect();
        cursors.sort_by(|a, b| a.identity.cmp(&b.identity));
        cursors
    }
}
