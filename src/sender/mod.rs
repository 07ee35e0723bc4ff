//! Sender side of the pipeline
//!
//! The batcher periodically drains what the sampler captured and the
//! transmitter pushes each non-empty batch to the store.

pub mod batcher;
pub mod transmitter;

pub use batcher::Batcher;
pub use transmitter::{TransmitStats, Transmitter};
