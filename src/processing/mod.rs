//! Processing applied to replayed cursor positions before they are drawn
//!
//! This module contains the spring physics used to smooth remote cursors
//! between the discrete positions the replayer produces.

pub mod cursor_smoothing;
pub mod spring;

pub use cursor_smoothing::CursorSmoother;
pub use spring::{Spring2D, SpringAxis};
