//! Pointer capture
//!
//! Turns raw pointer movement and clicks into batch-relative actions,
//! throttling movement to the configured sampling interval.

pub mod sampler;
pub mod types;

pub use sampler::{CaptureBuffer, SampleOutcome, Sampler, SharedCapture};
pub use types::{Action, ActionKind, Batch, IdentityId, Profile};
