//! Running pipelines for one participant
//!
//! `SenderSession` owns the sampler and the batch timer, `ReceiverSession`
//! owns the batch watcher and the animation loop. Stopping a session (or
//! dropping it) signals every loop it started.

use crate::capture::sampler::{CaptureBuffer, Sampler};
use crate::capture::types::IdentityId;
use crate::clock::Clock;
use crate::config::{AppConfig, SharedSettings};
use crate::receiver::animator::{Animator, CursorFrame};
use crate::receiver::watcher::BatchWatcher;
use crate::sender::batcher::Batcher;
use crate::sender::transmitter::{TransmitStats, Transmitter};
use crate::store::traits::{BatchStore, IdentityDirectory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                tracing::warn!("Session task ended abnormally: {}", e);
            }
        }
    }
}

/// Capture side of a participant
pub struct SenderSession {
    identity: IdentityId,
    sampler: Arc<Sampler>,
    settings: SharedSettings,
    stats: Arc<TransmitStats>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SenderSession {
    /// Start sampling and the batch timer. Must be called inside a tokio runtime.
    pub fn start(
        identity: IdentityId,
        store: Arc<dyn BatchStore>,
        clock: Arc<dyn Clock>,
        settings: SharedSettings,
    ) -> Self {
        let buffer = CaptureBuffer::shared(clock.now_ms());
        let sampler = Arc::new(Sampler::new(buffer.clone(), clock.clone(), settings.clone()));
        let transmitter = Transmitter::new(identity, store);
        let stats = transmitter.stats();
        let batcher = Batcher::new(buffer, clock, settings.clone(), transmitter);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![tokio::spawn(batcher.run(shutdown_rx))];

        let current = settings.get();
        tracing::info!(
            "Sender session started for {} (sampling={}ms, batch={}ms)",
            identity,
            current.sampling_interval_ms,
            current.batch_interval_ms
        );

        Self {
            identity,
            sampler,
            settings,
            stats,
            shutdown,
            tasks,
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    /// Entry point for raw pointer events
    pub fn sampler(&self) -> Arc<Sampler> {
        self.sampler.clone()
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn stats(&self) -> Arc<TransmitStats> {
        self.stats.clone()
    }

    /// Stop the batch timer and wait for it. Unsent actions are discarded.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        join_all(std::mem::take(&mut self.tasks)).await;
        tracing::info!(
            "Sender session stopped for {} (sent={}, failed={})",
            self.identity,
            self.stats.sent(),
            self.stats.failed()
        );
    }
}

impl Drop for SenderSession {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Playback side of a participant
pub struct ReceiverSession {
    me: IdentityId,
    frames: watch::Receiver<Vec<CursorFrame>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReceiverSession {
    /// Start watching every other participant and replaying their batches.
    /// Must be called inside a tokio runtime.
    pub fn start<S>(me: IdentityId, store: Arc<S>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self
    where
        S: BatchStore + IdentityDirectory + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames) = watch::channel(Vec::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let watcher = BatchWatcher::new(me, store.clone(), store.clone(), events_tx);
        let animator = Animator::new(config, store, clock, frames_tx);

        let tasks = vec![
            tokio::spawn(watcher.run(
                Duration::from_millis(config.presence_poll_ms),
                shutdown_rx.clone(),
            )),
            tokio::spawn(animator.run(events_rx, shutdown_rx)),
        ];

        tracing::info!("Receiver session started for {}", me);

        Self {
            me,
            frames,
            shutdown,
            tasks,
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.me
    }

    /// Latest rendered frame; `changed()` fires on every new frame
    pub fn frames(&self) -> watch::Receiver<Vec<CursorFrame>> {
        self.frames.clone()
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        join_all(std::mem::take(&mut self.tasks)).await;
        tracing::info!("Receiver session stopped for {}", self.me);
    }
}

impl Drop for ReceiverSession {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
