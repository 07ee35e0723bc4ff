//! Live Cursors demo
//!
//! Runs two participants against one in-process store: one moves a synthetic
//! pointer around a circle and clicks now and then, the other replays it and
//! logs what it would draw.
//!
//! Usage: `live-cursors [config.json]`

use anyhow::Context;
use live_cursors::{
    AppConfig, Clock, InMemoryStore, MonotonicClock, ReceiverSession, SenderSession,
    SharedSettings,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEMO_DURATION: Duration = Duration::from_secs(5);
const POINTER_EVENT_SPACING: Duration = Duration::from_millis(2);
const CLICK_EVERY_EVENTS: u64 = 375;
const FRAME_LOG_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    live_cursors::init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => AppConfig::default(),
    };

    tracing::info!("Starting Live Cursors v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let store = Arc::new(InMemoryStore::new(
        clock.clone(),
        config.max_actions_per_batch,
        config.active_window_ms,
    ));

    let alice = store.create_identity("Alice", "🦊");
    let bob = store.create_identity("Bob", "🐼");

    let settings = SharedSettings::new(config.settings)?;
    let sender = SenderSession::start(alice, store.clone(), clock.clone(), settings);
    let receiver = ReceiverSession::start(bob, store.clone(), clock.clone(), &config);

    let sampler = sender.sampler();
    let pointer = tokio::spawn(async move {
        let steps = (DEMO_DURATION.as_millis() / POINTER_EVENT_SPACING.as_millis()) as u64;
        for step in 0..steps {
            let angle = step as f64 * 0.004;
            let x = 400.0 + 200.0 * angle.cos();
            let y = 300.0 + 200.0 * angle.sin();
            if step % CLICK_EVERY_EVENTS == 0 {
                sampler.on_click(x, y);
            } else {
                sampler.on_pointer_move(x, y);
            }
            tokio::time::sleep(POINTER_EVENT_SPACING).await;
        }
    });

    let mut frames = receiver.frames();
    let logger = tokio::spawn(async move {
        let mut last_logged: Option<Instant> = None;
        let mut was_pulsing = false;
        while frames.changed().await.is_ok() {
            let frame = frames.borrow_and_update().clone();
            let pulsing = frame.iter().any(|c| c.pulsing);
            let click_started = pulsing && !was_pulsing;
            was_pulsing = pulsing;
            if !click_started && last_logged.is_some_and(|t| t.elapsed() < FRAME_LOG_INTERVAL) {
                continue;
            }
            last_logged = Some(Instant::now());
            for cursor in frame {
                tracing::info!(
                    "{} {} at ({:.0}, {:.0}){}",
                    cursor.profile.emoji,
                    cursor.profile.name,
                    cursor.displayed.0,
                    cursor.displayed.1,
                    if cursor.pulsing { " *click*" } else { "" }
                );
            }
        }
    });

    pointer.await.context("Pointer simulation panicked")?;

    // Let the last batch reach the receiver and finish playing
    let batch_interval = Duration::from_millis(sender.settings().get().batch_interval_ms);
    tokio::time::sleep(batch_interval * 2 + Duration::from_millis(config.presence_poll_ms)).await;

    sender.stop().await;
    receiver.stop().await;
    logger.abort();

    tracing::info!("Demo finished");
    Ok(())
}
