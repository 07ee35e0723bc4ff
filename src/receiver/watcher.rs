//! Change-driven batch subscriptions
//!
//! One task per remote participant follows that participant's current batch
//! in the store and forwards each new version to the replayer. Versions
//! already forwarded are remembered for the life of the watcher, so a
//! participant that leaves and comes back does not replay its old batch.

use crate::capture::types::{Batch, IdentityId};
use crate::store::traits::{BatchStore, IdentityDirectory, StoreResult};
use parking_lot::Mutex as ParkingMutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// What the watcher tells the replayer
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A batch not seen before for its identity
    Batch(Batch),
    /// The identity is no longer active
    Departed(IdentityId),
}

/// Admits a batch only when its version moves past the last one admitted
/// for the same identity. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct VersionGate {
    last_seen: Arc<ParkingMutex<HashMap<IdentityId, u64>>>,
}

impl VersionGate {
    pub fn admit(&self, batch: &Batch) -> bool {
        let mut last_seen = self.last_seen.lock();
        match last_seen.get(&batch.identity) {
            Some(&last) if batch.version <= last => false,
            _ => {
                last_seen.insert(batch.identity, batch.version);
                true
            }
        }
    }
}

/// Subscribes to the current batch of every other active participant
pub struct BatchWatcher {
    me: IdentityId,
    store: Arc<dyn BatchStore>,
    directory: Arc<dyn IdentityDirectory>,
    events: mpsc::UnboundedSender<WatchEvent>,
    gate: VersionGate,
    subscriptions: HashMap<IdentityId, JoinHandle<()>>,
}

impl BatchWatcher {
    pub fn new(
        me: IdentityId,
        store: Arc<dyn BatchStore>,
        directory: Arc<dyn IdentityDirectory>,
        events: mpsc::UnboundedSender<WatchEvent>,
    ) -> Self {
        Self {
            me,
            store,
            directory,
            events,
            gate: VersionGate::default(),
            subscriptions: HashMap::new(),
        }
    }

    /// Identities currently subscribed to
    pub fn watched(&self) -> Vec<IdentityId> {
        let mut ids: Vec<IdentityId> = self.subscriptions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Subscribe to newcomers and drop participants that left
    pub fn sync_participants(&mut self, active: &[IdentityId]) {
        let wanted: HashSet<IdentityId> = active.iter().copied().filter(|id| *id != self.me).collect();

        let departed: Vec<IdentityId> = self
            .subscriptions
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        for identity in departed {
            if let Some(task) = self.subscriptions.remove(&identity) {
                task.abort();
            }
            tracing::info!("Stopped watching {}", identity);
            let _ = self.events.send(WatchEvent::Departed(identity));
        }

        for identity in wanted {
            if self.subscriptions.contains_key(&identity) {
                continue;
            }
            let rx = self.store.watch_batch(identity);
            let task = tokio::spawn(forward_batches(
                identity,
                rx,
                self.gate.clone(),
                self.events.clone(),
            ));
            self.subscriptions.insert(identity, task);
            tracing::info!("Watching batches of {}", identity);
        }
    }

    /// Re-list active participants and resync subscriptions
    pub async fn refresh(&mut self) -> StoreResult<()> {
        let active = self.directory.list_active_identities().await?;
        self.sync_participants(&active);
        Ok(())
    }

    /// Poll the participant list until `shutdown` turns true
    pub async fn run(mut self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Batch watcher started for {}", self.me);

        loop {
            if let Err(e) = self.refresh().await {
                tracing::warn!("Failed to list active participants: {}", e);
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        self.unsubscribe_all();
        tracing::info!("Batch watcher stopped for {}", self.me);
    }

    fn unsubscribe_all(&mut self) {
        for (_, task) in self.subscriptions.drain() {
            task.abort();
        }
    }
}

impl Drop for BatchWatcher {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

async fn forward_batches(
    identity: IdentityId,
    mut rx: watch::Receiver<Option<Batch>>,
    gate: VersionGate,
    events: mpsc::UnboundedSender<WatchEvent>,
) {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(batch) = current {
            if gate.admit(&batch) {
                tracing::debug!(
                    "New batch v{} from {} ({} actions)",
                    batch.version,
                    identity,
                    batch.actions.len()
                );
                if events.send(WatchEvent::Batch(batch)).is_err() {
                    return;
                }
            }
        }

        if rx.changed().await.is_err() {
            tracing::debug!("Batch channel for {} closed", identity);
            return;
        }
    }
}
