//! Wire types shared by the sender, the store and the receiver

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque participant handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display attributes of a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Movement,
    Click,
}

/// One captured pointer event.
///
/// `time_since_batch_start` is relative to the start of the batch that
/// recorded it, never a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub kind: ActionKind,
    pub x: f64,
    pub y: f64,
    pub time_since_batch_start: u64,
}

impl Action {
    pub fn movement(x: f64, y: f64, time_since_batch_start: u64) -> Self {
        Self {
            kind: ActionKind::Movement,
            x,
            y,
            time_since_batch_start,
        }
    }

    pub fn click(x: f64, y: f64, time_since_batch_start: u64) -> Self {
        Self {
            kind: ActionKind::Click,
            x,
            y,
            time_since_batch_start,
        }
    }

    pub fn is_click(&self) -> bool {
        self.kind == ActionKind::Click
    }
}

/// The current batch of one identity as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub identity: IdentityId,
    /// Store-assigned change marker, strictly increasing across writes
    pub version: u64,
    pub actions: Vec<Action>,
}
