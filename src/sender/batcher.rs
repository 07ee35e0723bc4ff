//! Batch timer
//!
//! Every `batch_interval_ms` the batcher drains the capture buffer and hands
//! the actions to the transmitter. Empty ticks send nothing but still restart
//! the batch clock.

use crate::capture::sampler::SharedCapture;
use crate::capture::types::Action;
use crate::clock::Clock;
use crate::config::SharedSettings;
use crate::sender::transmitter::Transmitter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cuts the capture buffer into batches on a fixed cadence
pub struct Batcher {
    buffer: SharedCapture,
    clock: Arc<dyn Clock>,
    settings: SharedSettings,
    transmitter: Transmitter,
}

impl Batcher {
    pub fn new(
        buffer: SharedCapture,
        clock: Arc<dyn Clock>,
        settings: SharedSettings,
        transmitter: Transmitter,
    ) -> Self {
        Self {
            buffer,
            clock,
            settings,
            transmitter,
        }
    }

    /// Snapshot and clear the buffer, restarting the batch clock.
    ///
    /// The batch start is reset even when nothing was captured.
    pub fn tick(&self) -> Option<Vec<Action>> {
        let now = self.clock.now_ms();
        let actions = self.buffer.lock().take(now);
        if actions.is_empty() {
            None
        } else {
            Some(actions)
        }
    }

    /// One timer tick: cut a batch and hand it to the transmitter
    pub fn flush(&self) -> Option<JoinHandle<()>> {
        let actions = self.tick()?;
        tracing::debug!("Batch ready with {} actions", actions.len());
        Some(self.transmitter.transmit(actions))
    }

    /// Tick every `batch_interval_ms` until `shutdown` turns true.
    ///
    /// The interval is re-read before each sleep.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Batcher started for {}", self.transmitter.identity());

        loop {
            let period = Duration::from_millis(self.settings.get().batch_interval_ms);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(period) => {
                    self.flush();
                }
            }
        }

        tracing::info!("Batcher stopped for {}", self.transmitter.identity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sampler::{CaptureBuffer, Sampler};
    use crate::clock::ManualClock;
    use crate::store::memory::InMemoryStore;
    use crate::store::traits::BatchStore;

    struct Rig {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryStore>,
        settings: SharedSettings,
        sampler: Sampler,
        batcher: Batcher,
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryStore::new(clock.clone(), 200, 30_000));
        let alice = store.create_identity("alice", "🦊");
        let settings = SharedSettings::default();
        let buffer = CaptureBuffer::shared(0);
        let sampler = Sampler::new(buffer.clone(), clock.clone(), settings.clone());
        let batcher = Batcher::new(
            buffer,
            clock.clone(),
            settings.clone(),
            Transmitter::new(alice, store.clone()),
        );
        Rig {
            clock,
            store,
            settings,
            sampler,
            batcher,
        }
    }

    #[test]
    fn test_one_second_of_motion_makes_one_batch() {
        let rig = rig();
        for i in 0..500u64 {
            rig.clock.set(i * 2);
            rig.sampler.on_pointer_move(i as f64, 0.0);
        }
        rig.clock.set(1000);

        let batch = rig.batcher.tick().unwrap();
        assert_eq!(batch.len(), 100);
        assert_eq!(batch[0].time_since_batch_start, 0);
        assert!(batch.last().unwrap().time_since_batch_start <= 1000);
        assert!(rig.batcher.tick().is_none());
    }

    #[test]
    fn test_empty_tick_still_resets_batch_start() {
        let rig = rig();
        rig.clock.set(1000);
        assert!(rig.batcher.tick().is_none());
        assert_eq!(rig.sampler.buffer().lock().batch_start_ms(), 1000);

        rig.clock.set(2000);
        assert!(rig.batcher.tick().is_none());
        assert_eq!(rig.sampler.buffer().lock().batch_start_ms(), 2000);

        rig.clock.set(2100);
        let click = rig.sampler.on_click(1.0, 1.0);
        assert_eq!(click.time_since_batch_start, 100);
    }

    #[tokio::test]
    async fn test_flush_transmits_only_non_empty_batches() {
        let rig = rig();

        rig.clock.set(1000);
        assert!(rig.batcher.flush().is_none());
        assert_eq!(rig.store.batch_count(), 0);

        rig.sampler.on_click(5.0, 5.0);
        rig.clock.set(2000);
        rig.batcher.flush().unwrap().await.unwrap();
        assert_eq!(rig.store.batch_count(), 1);
        assert_eq!(rig.batcher.transmitter.stats().sent(), 1);

        let batch = rig
            .store
            .find_batch(rig.batcher.transmitter.identity())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.actions, vec![Action::click(5.0, 5.0, 0)]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let rig = rig();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(rig.batcher.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_on_next_cycle() {
        let rig = rig();
        let stats = rig.batcher.transmitter.stats();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(rig.batcher.run(rx));
        tokio::task::yield_now().await;

        // Halfway through the first 1000 ms cycle
        tokio::time::sleep(Duration::from_millis(500)).await;
        rig.settings.set_batch_interval(200).unwrap();
        rig.sampler.on_click(1.0, 1.0);

        // The running cycle keeps its length
        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(stats.sent(), 1);

        // The next one is already 200 ms long
        rig.clock.set(1001);
        rig.sampler.on_click(2.0, 2.0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(stats.sent(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(stats.sent(), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
