//! Receiver frame loop
//!
//! Applies watch events to the replayer, fetches profiles of new
//! participants, optionally runs spring smoothing and publishes one
//! `CursorFrame` list per tick. With nothing left to animate it suspends
//! until the next event or the next profile retry.

use crate::capture::types::{IdentityId, Profile};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::processing::cursor_smoothing::CursorSmoother;
use crate::receiver::replayer::{ReplayEvent, ReplayOptions, Replayer};
use crate::receiver::watcher::WatchEvent;
use crate::store::traits::{IdentityDirectory, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// One remote cursor as it should appear on screen this frame
#[derive(Debug, Clone, PartialEq)]
pub struct CursorFrame {
    pub identity: IdentityId,
    pub profile: Profile,
    /// Position of the last replayed action
    pub position: (f64, f64),
    /// Where to draw it; equals `position` unless smoothing is on
    pub displayed: (f64, f64),
    pub pulsing: bool,
}

type ProfileLookup = (IdentityId, StoreResult<Option<Profile>>);

/// Per-frame driver of the replayer.
///
/// Runs while there is playback, a pulse, a moving spring or a profile
/// lookup in flight, and otherwise waits for the next watch event or
/// profile retry.
pub struct Animator {
    replayer: Replayer,
    smoother: Option<CursorSmoother>,
    directory: Arc<dyn IdentityDirectory>,
    clock: Arc<dyn Clock>,
    frame_interval: Duration,
    lookups_tx: mpsc::UnboundedSender<ProfileLookup>,
    lookups_rx: mpsc::UnboundedReceiver<ProfileLookup>,
    outstanding_lookups: usize,
    frames: watch::Sender<Vec<CursorFrame>>,
    last_frame_ms: Option<u64>,
}

impl Animator {
    pub fn new(
        config: &AppConfig,
        directory: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
        frames: watch::Sender<Vec<CursorFrame>>,
    ) -> Self {
        let (lookups_tx, lookups_rx) = mpsc::unbounded_channel();
        Self {
            replayer: Replayer::new(ReplayOptions::from(config)),
            smoother: config.smoothing.map(CursorSmoother::new),
            directory,
            clock,
            frame_interval: Duration::from_millis(config.frame_interval_ms),
            lookups_tx,
            lookups_rx,
            outstanding_lookups: 0,
            frames,
            last_frame_ms: None,
        }
    }

    pub fn replayer(&self) -> &Replayer {
        &self.replayer
    }

    pub fn apply(&mut self, event: WatchEvent) {
        if let WatchEvent::Departed(identity) = &event {
            if let Some(smoother) = self.smoother.as_mut() {
                smoother.forget(*identity);
            }
        }
        self.replayer.apply(event);
    }

    fn is_active(&self, now_ms: u64) -> bool {
        self.replayer.has_work(now_ms)
            || self.outstanding_lookups > 0
            || self.smoother.as_ref().is_some_and(|s| !s.is_settled())
    }

    fn request_profile(&mut self, identity: IdentityId) {
        let directory = self.directory.clone();
        let tx = self.lookups_tx.clone();
        self.outstanding_lookups += 1;
        tokio::spawn(async move {
            let result = directory.get_identity(identity).await;
            let _ = tx.send((identity, result));
        });
    }

    fn absorb_lookups(&mut self, now_ms: u64) {
        while let Ok((identity, result)) = self.lookups_rx.try_recv() {
            self.outstanding_lookups = self.outstanding_lookups.saturating_sub(1);
            match result {
                Ok(Some(profile)) => {
                    tracing::debug!("Loaded profile of {} ({} {})", identity, profile.emoji, profile.name);
                    self.replayer.set_profile(identity, profile);
                }
                Ok(None) => {
                    tracing::debug!("Profile of {} not available yet", identity);
                    self.replayer.profile_unavailable(identity, now_ms);
                }
                Err(e) => {
                    tracing::warn!("Profile lookup for {} failed: {}", identity, e);
                    self.replayer.profile_unavailable(identity, now_ms);
                }
            }
        }
    }

    /// Render one frame and publish it
    pub fn frame(&mut self) -> Vec<CursorFrame> {
        let now = self.clock.now_ms();

        self.absorb_lookups(now);
        for identity in self.replayer.take_missing_profiles(now) {
            self.request_profile(identity);
        }

        let events = self.replayer.tick(now);
        for event in &events {
            if let ReplayEvent::Clicked { identity, x, y, .. } = event {
                tracing::debug!("Click from {} at ({}, {})", identity, x, y);
            }
        }

        if let Some(smoother) = self.smoother.as_mut() {
            for event in &events {
                smoother.observe(event);
            }
            let dt = self
                .last_frame_ms
                .map_or(0.0, |last| now.saturating_sub(last) as f64 / 1000.0);
            smoother.step(dt);
        }
        self.last_frame_ms = Some(now);

        let frames: Vec<CursorFrame> = self
            .replayer
            .visible_cursors(now)
            .into_iter()
            .map(|cursor| {
                let position = (cursor.x, cursor.y);
                let displayed = self
                    .smoother
                    .as_ref()
                    .and_then(|s| s.position(cursor.identity))
                    .unwrap_or(position);
                CursorFrame {
                    identity: cursor.identity,
                    profile: cursor.profile,
                    position,
                    displayed,
                    pulsing: cursor.pulsing,
                }
            })
            .collect();

        self.frames.send_replace(frames.clone());
        frames
    }

    /// Drive frames until `shutdown` turns true or the watcher goes away
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("Animation loop started ({:?} per frame)", self.frame_interval);

        'outer: loop {
            loop {
                match events.try_recv() {
                    Ok(event) => self.apply(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }

            if !self.is_active(self.clock.now_ms()) {
                // Publish the settled state, then sleep until an event or a profile retry is due
                self.frame();
                self.last_frame_ms = None;
                if self.is_active(self.clock.now_ms()) {
                    // The frame started a profile lookup
                    continue;
                }
                let retry_in = self
                    .replayer
                    .next_profile_retry_ms()
                    .map(|at| Duration::from_millis(at.saturating_sub(self.clock.now_ms())));
                tracing::trace!("Animation loop suspended");

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Some(event) => self.apply(event),
                        None => break,
                    },
                    _ = retry_timer(retry_in) => {}
                }
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.frame();
                }
            }
        }

        tracing::info!("Animation loop stopped");
    }
}

async fn retry_timer(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::{Action, Batch};
    use crate::clock::ManualClock;
    use crate::config::SpringConfig;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Rig {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryStore>,
        animator: Animator,
        frames: watch::Receiver<Vec<CursorFrame>>,
    }

    fn rig(config: AppConfig) -> Rig {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryStore::new(clock.clone(), 200, 30_000));
        let (tx, frames) = watch::channel(Vec::new());
        let animator = Animator::new(&config, store.clone(), clock.clone(), tx);
        Rig {
            clock,
            store,
            animator,
            frames,
        }
    }

    // Lets the spawned profile lookups run on the test runtime
    async fn settle_lookups() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_frames_wait_for_profile() {
        let mut rig = rig(AppConfig::default());
        let alice = rig.store.create_identity("alice", "🦊");
        rig.animator.apply(WatchEvent::Batch(Batch {
            identity: alice,
            version: 1,
            actions: vec![Action::movement(10.0, 20.0, 0), Action::click(30.0, 40.0, 100)],
        }));

        // Position is known but the profile is still loading
        assert!(rig.animator.frame().is_empty());
        assert_eq!(rig.animator.replayer().position(alice), Some((10.0, 20.0)));

        settle_lookups().await;
        rig.clock.set(100);
        let frames = rig.animator.frame();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].profile.name, "alice");
        assert_eq!(frames[0].position, (30.0, 40.0));
        assert_eq!(frames[0].displayed, (30.0, 40.0));
        assert!(frames[0].pulsing);
        assert_eq!(*rig.frames.borrow(), frames);
    }

    #[tokio::test]
    async fn test_smoothing_eases_displayed_position() {
        let config = AppConfig {
            smoothing: Some(SpringConfig::default()),
            ..AppConfig::default()
        };
        let mut rig = rig(config);
        let alice = rig.store.create_identity("alice", "🦊");
        rig.animator.apply(WatchEvent::Batch(Batch {
            identity: alice,
            version: 1,
            actions: vec![Action::movement(0.0, 0.0, 0), Action::movement(100.0, 0.0, 16)],
        }));

        rig.animator.frame();
        settle_lookups().await;
        rig.clock.set(16);
        let frames = rig.animator.frame();
        assert_eq!(frames[0].position, (100.0, 0.0));
        assert!(frames[0].displayed.0 > 0.0 && frames[0].displayed.0 < 100.0);
    }

    #[tokio::test]
    async fn test_departure_clears_frames() {
        let mut rig = rig(AppConfig::default());
        let alice = rig.store.create_identity("alice", "🦊");
        rig.animator.apply(WatchEvent::Batch(Batch {
            identity: alice,
            version: 1,
            actions: vec![Action::movement(1.0, 1.0, 0)],
        }));
        rig.animator.frame();
        settle_lookups().await;
        assert_eq!(rig.animator.frame().len(), 1);

        rig.animator.apply(WatchEvent::Departed(alice));
        assert!(rig.animator.frame().is_empty());
    }

    #[tokio::test]
    async fn test_run_exits_when_watcher_drops() {
        let rig = rig(AppConfig::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(rig.animator.run(events_rx, shutdown_rx));
        drop(events_tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    /// Follows tokio's clock so paused-time tests drive it
    struct RuntimeClock(tokio::time::Instant);

    impl Clock for RuntimeClock {
        fn now_ms(&self) -> u64 {
            self.0.elapsed().as_millis() as u64
        }
    }

    /// Knows the profile only once `ready` is set
    #[derive(Default)]
    struct LateDirectory {
        ready: AtomicBool,
    }

    #[async_trait]
    impl IdentityDirectory for LateDirectory {
        async fn get_identity(&self, _identity: IdentityId) -> StoreResult<Option<Profile>> {
            Ok(self.ready.load(Ordering::SeqCst).then(|| Profile {
                name: "alice".to_string(),
                emoji: "🦊".to_string(),
            }))
        }

        async fn list_active_identities(&self) -> StoreResult<Vec<IdentityId>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_loop_retries_missing_profile() {
        let directory = Arc::new(LateDirectory::default());
        let clock = Arc::new(RuntimeClock(tokio::time::Instant::now()));
        let (frames_tx, mut frames) = watch::channel(Vec::new());
        let animator = Animator::new(&AppConfig::default(), directory.clone(), clock, frames_tx);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(animator.run(events_rx, shutdown_rx));

        let alice = IdentityId::new_random();
        events_tx
            .send(WatchEvent::Batch(Batch {
                identity: alice,
                version: 1,
                actions: vec![Action::movement(5.0, 6.0, 0)],
            }))
            .unwrap();

        // First lookup comes back empty and playback is over
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(frames.borrow().is_empty());

        // No further watch events: only the retry can bring the cursor in
        directory.ready.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), frames.wait_for(|f| !f.is_empty()))
            .await
            .expect("profile was never retried")
            .unwrap();
        let frame = frames.borrow().clone();
        assert_eq!(frame[0].identity, alice);
        assert_eq!(frame[0].profile.name, "alice");
        assert_eq!(frame[0].position, (5.0, 6.0));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
