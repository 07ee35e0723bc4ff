//! Receiver side of the pipeline
//!
//! The watcher turns store changes into queued batches, the replayer plays
//! them back per identity, and the animator drives the replayer once per
//! frame and publishes what should be drawn.

pub mod animator;
pub mod replayer;
pub mod watcher;

pub use animator::{Animator, CursorFrame};
pub use replayer::{PlaybackState, ReplayEvent, ReplayOptions, Replayer, VisibleCursor};
pub use watcher::{BatchWatcher, VersionGate, WatchEvent};
