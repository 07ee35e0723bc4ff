//! In-process store
//!
//! Keeps one current batch per identity plus the participant registry.
//! All mutations happen under a single lock, so the find-then-replace in
//! `store_batch` cannot race with itself.

use crate::capture::types::{Action, Batch, IdentityId, Profile};
use crate::clock::Clock;
use crate::store::traits::{BatchStore, IdentityDirectory, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex as ParkingMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

struct IdentityRecord {
    profile: Profile,
    last_active_ms: u64,
}

struct StoreState {
    next_version: u64,
    identities: HashMap<IdentityId, IdentityRecord>,
    batches: HashMap<IdentityId, watch::Sender<Option<Batch>>>,
}

impl StoreState {
    fn slot(&mut self, identity: IdentityId) -> &watch::Sender<Option<Batch>> {
        self.batches
            .entry(identity)
            .or_insert_with(|| watch::channel(None).0)
    }
}

pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    max_actions_per_batch: usize,
    active_window_ms: u64,
    state: ParkingMutex<StoreState>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>, max_actions_per_batch: usize, active_window_ms: u64) -> Self {
        Self {
            clock,
            max_actions_per_batch,
            active_window_ms,
            state: ParkingMutex::new(StoreState {
                next_version: 1,
                identities: HashMap::new(),
                batches: HashMap::new(),
            }),
        }
    }

    /// Register a participant and return its new handle
    pub fn create_identity(&self, name: &str, emoji: &str) -> IdentityId {
        let id = IdentityId::new_random();
        let now = self.clock.now_ms();
        self.state.lock().identities.insert(
            id,
            IdentityRecord {
                profile: Profile {
                    name: name.to_string(),
                    emoji: emoji.to_string(),
                },
                last_active_ms: now,
            },
        );
        tracing::info!("Created identity {} ({} {})", id, emoji, name);
        id
    }

    /// Forget an identity and its batch. Open watches observe the channel closing.
    pub fn remove_identity(&self, identity: IdentityId) {
        let mut state = self.state.lock();
        state.identities.remove(&identity);
        state.batches.remove(&identity);
        tracing::info!("Removed identity {}", identity);
    }

    /// Number of identities holding a batch
    pub fn batch_count(&self) -> usize {
        self.state
            .lock()
            .batches
            .values()
            .filter(|slot| slot.borrow().is_some())
            .count()
    }

    pub fn max_actions_per_batch(&self) -> usize {
        self.max_actions_per_batch
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn store_batch(&self, identity: IdentityId, mut actions: Vec<Action>) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let record = state
            .identities
            .get_mut(&identity)
            .ok_or(StoreError::UnknownIdentity(identity))?;
        record.last_active_ms = now;

        if actions.len() > self.max_actions_per_batch {
            tracing::debug!(
                "Truncating batch from {} to {} actions for {}",
                actions.len(),
                self.max_actions_per_batch,
                identity
            );
            actions.truncate(self.max_actions_per_batch);
        }

        let version = state.next_version;
        state.next_version += 1;

        let count = actions.len();
        let previous = state.slot(identity).send_replace(Some(Batch {
            identity,
            version,
            actions,
        }));

        tracing::debug!(
            "{} batch v{} for {} ({} actions)",
            if previous.is_some() { "Replaced" } else { "Inserted" },
            version,
            identity,
            count
        );
        Ok(())
    }

    async fn find_batch(&self, identity: IdentityId) -> StoreResult<Option<Batch>> {
        let state = self.state.lock();
        Ok(state
            .batches
            .get(&identity)
            .and_then(|slot| slot.borrow().clone()))
    }

    fn watch_batch(&self, identity: IdentityId) -> watch::Receiver<Option<Batch>> {
        self.state.lock().slot(identity).subscribe()
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryStore {
    async fn get_identity(&self, identity: IdentityId) -> StoreResult<Option<Profile>> {
        Ok(self
            .state
            .lock()
            .identities
            .get(&identity)
            .map(|record| record.profile.clone()))
    }

    async fn list_active_identities(&self) -> StoreResult<Vec<IdentityId>> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        let mut active: Vec<IdentityId> = state
            .identities
            .iter()
            .filter(|(_, record)| now.saturating_sub(record.last_active_ms) < self.active_window_ms)
            .map(|(id, _)| *id)
            .collect();
        active.sort();
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (InMemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (InMemoryStore::new(clock.clone(), 200, 30_000), clock)
    }

    #[tokio::test]
    async fn test_store_batch_replaces_previous() {
        let (store, _) = store();
        let alice = store.create_identity("alice", "🦊");

        for i in 0..5 {
            store
                .store_batch(alice, vec![Action::movement(i as f64, 0.0, 0)])
                .await
                .unwrap();
        }

        assert_eq!(store.batch_count(), 1);
        let batch = store.find_batch(alice).await.unwrap().unwrap();
        assert_eq!(batch.actions, vec![Action::movement(4.0, 0.0, 0)]);
        assert_eq!(batch.identity, alice);
    }

    #[tokio::test]
    async fn test_versions_strictly_increase() {
        let (store, _) = store();
        let alice = store.create_identity("alice", "🦊");
        let bob = store.create_identity("bob", "🐼");

        store.store_batch(alice, vec![Action::click(0.0, 0.0, 0)]).await.unwrap();
        let v1 = store.find_batch(alice).await.unwrap().unwrap().version;
        store.store_batch(bob, vec![Action::click(0.0, 0.0, 0)]).await.unwrap();
        store.store_batch(alice, vec![Action::click(1.0, 0.0, 0)]).await.unwrap();
        let v2 = store.find_batch(alice).await.unwrap().unwrap().version;
        assert!(v2 > v1);
    }

    #[tokio::test]
    async fn test_truncates_to_earliest_actions() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryStore::new(clock, 3, 30_000);
        let alice = store.create_identity("alice", "🦊");

        let actions: Vec<Action> = (0..10).map(|i| Action::movement(i as f64, 0.0, i * 10)).collect();
        store.store_batch(alice, actions).await.unwrap();

        let batch = store.find_batch(alice).await.unwrap().unwrap();
        let offsets: Vec<u64> = batch.actions.iter().map(|a| a.time_since_batch_start).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_unknown_identity_rejected() {
        let (store, _) = store();
        let stranger = IdentityId::new_random();
        let result = store.store_batch(stranger, vec![Action::click(0.0, 0.0, 0)]).await;
        assert!(matches!(result, Err(StoreError::UnknownIdentity(id)) if id == stranger));
        assert!(store.find_batch(stranger).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_single_record() {
        let (store, _) = store();
        let store = Arc::new(store);
        let alice = store.create_identity("alice", "🦊");

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .store_batch(alice, vec![Action::movement(i as f64, 0.0, 0)])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.batch_count(), 1);
        let batch = store.find_batch(alice).await.unwrap().unwrap();
        assert_eq!(batch.version, 32);
    }

    #[tokio::test]
    async fn test_watch_sees_replacements() {
        let (store, _) = store();
        let alice = store.create_identity("alice", "🦊");
        let mut rx = store.watch_batch(alice);
        assert!(rx.borrow_and_update().is_none());

        store.store_batch(alice, vec![Action::click(3.0, 4.0, 0)]).await.unwrap();
        rx.changed().await.unwrap();
        let batch = rx.borrow_and_update().clone().unwrap();
        assert_eq!(batch.actions[0], Action::click(3.0, 4.0, 0));
    }

    #[tokio::test]
    async fn test_active_window() {
        let (store, clock) = store();
        let alice = store.create_identity("alice", "🦊");
        clock.advance(20_000);
        let bob = store.create_identity("bob", "🐼");

        let mut expected = vec![alice, bob];
        expected.sort();
        assert_eq!(store.list_active_identities().await.unwrap(), expected);

        clock.advance(15_000);
        assert_eq!(store.list_active_identities().await.unwrap(), vec![bob]);

        // Sending a batch counts as activity
        store.store_batch(alice, vec![Action::click(0.0, 0.0, 0)]).await.unwrap();
        assert_eq!(store.list_active_identities().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_profile_lookup() {
        let (store, _) = store();
        let alice = store.create_identity("alice", "🦊");
        let profile = store.get_identity(alice).await.unwrap().unwrap();
        assert_eq!(profile.name, "alice");
        assert_eq!(profile.emoji, "🦊");

        store.remove_identity(alice);
        assert!(store.get_identity(alice).await.unwrap().is_none());
    }
}
