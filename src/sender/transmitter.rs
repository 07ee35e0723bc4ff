//! Batch transmission to the shared store

use crate::capture::types::{Action, IdentityId};
use crate::store::traits::{BatchStore, StoreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Outcome counters of batch sends
#[derive(Debug, Default)]
pub struct TransmitStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl TransmitStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Pushes finished batches to the store on behalf of one identity.
///
/// Sends are fire-and-forget: a failed batch is logged and dropped, the next
/// tick supersedes it anyway.
#[derive(Clone)]
pub struct Transmitter {
    identity: IdentityId,
    store: Arc<dyn BatchStore>,
    stats: Arc<TransmitStats>,
}

impl Transmitter {
    pub fn new(identity: IdentityId, store: Arc<dyn BatchStore>) -> Self {
        Self {
            identity,
            store,
            stats: Arc::new(TransmitStats::default()),
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    pub fn stats(&self) -> Arc<TransmitStats> {
        self.stats.clone()
    }

    /// Send one batch and wait for the store to accept it
    pub async fn send(&self, actions: Vec<Action>) -> StoreResult<()> {
        let count = actions.len();
        match self.store.store_batch(self.identity, actions).await {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Sent batch of {} actions for {}", count, self.identity);
                Ok(())
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Send in the background without blocking the caller
    pub fn transmit(&self, actions: Vec<Action>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let count = actions.len();
            if let Err(e) = this.send(actions).await {
                tracing::warn!(
                    "Dropped batch of {} actions for {}: {}",
                    count,
                    this.identity,
                    e
                );
            }
        })
    }
}
