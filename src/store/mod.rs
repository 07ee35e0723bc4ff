//! Shared batch store
//!
//! Holds at most one current batch per identity (last write wins) and the
//! participant directory the receiver consults.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{BatchStore, IdentityDirectory, StoreError, StoreResult};
