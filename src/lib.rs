//! Live Cursors - see everyone's pointer move in real time.
//!
//! This is the main library crate. Each participant samples its own pointer
//! into batches that are pushed to a shared store, and replays the batches
//! of every other participant with the timing they were recorded with.

pub mod capture;
pub mod clock;
pub mod config;
pub mod processing;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod store;

pub use capture::{Action, ActionKind, Batch, IdentityId, Profile};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{AppConfig, PipelineSettings, SharedSettings};
pub use receiver::CursorFrame;
pub use session::{ReceiverSession, SenderSession};
pub use store::{BatchStore, IdentityDirectory, InMemoryStore, StoreError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_cursors=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
