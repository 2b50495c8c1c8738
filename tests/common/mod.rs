//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use cadence::Scheduler;
use cadence::testing::{PausedClock, RecordingHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A scheduler on a [`PausedClock`] with a recording handler attached.
///
/// Tests using it must run with `start_paused = true` so the clock and
/// tokio's timers advance together.
pub async fn paused_scheduler(capacity: usize) -> (Scheduler, Arc<RecordingHandler>) {
    let scheduler = Scheduler::new(capacity)
        .unwrap()
        .with_clock(Arc::new(PausedClock::default()));
    let handler = Arc::new(RecordingHandler::new());
    scheduler.event_bus().register(handler.clone()).await;
    (scheduler, handler)
}

/// Cancel `token` after `delay`.
pub fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

/// Run `scheduler` until `delay` has passed, then cancel and wait for it.
///
/// Returns how long `start` took, including the drain of in-flight jobs.
pub async fn run_for(scheduler: &Scheduler, delay: Duration) -> Duration {
    let token = CancellationToken::new();
    cancel_after(&token, delay);
    let started = tokio::time::Instant::now();
    scheduler.start(token).await.unwrap();
    started.elapsed()
}
