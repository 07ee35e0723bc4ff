//! Store-facing contracts
//!
//! The pipeline only talks to the shared store through these traits, so the
//! in-memory store can be swapped for a networked one.

use crate::capture::types::{Action, Batch, IdentityId, Profile};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that can occur while talking to the store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown identity: {0}")]
    UnknownIdentity(IdentityId),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Holds the current batch of every identity
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Replace the identity's current batch, creating it if absent
    async fn store_batch(&self, identity: IdentityId, actions: Vec<Action>) -> StoreResult<()>;

    /// Current batch of the identity, if it ever sent one
    async fn find_batch(&self, identity: IdentityId) -> StoreResult<Option<Batch>>;

    /// Live view of the identity's current batch, notified on every replacement
    fn watch_batch(&self, identity: IdentityId) -> watch::Receiver<Option<Batch>>;
}

/// Read-only participant metadata
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_identity(&self, identity: IdentityId) -> StoreResult<Option<Profile>>;

    /// Identities currently considered present
    async fn list_active_identities(&self) -> StoreResult<Vec<IdentityId>>;
}
