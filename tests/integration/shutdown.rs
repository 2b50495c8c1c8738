//! Graceful shutdown integration tests.
//!
//! Cancelling the token halts every loop: waiting loops stop at once, queued
//! loops give up their place, and running jobs finish before `start` returns.

use cadence::testing::SlowJob;
use cadence::{Event, JobContext, JobError, every, job_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::{paused_scheduler, run_for};

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_returns_promptly() {
    let (scheduler, handler) = paused_scheduler(2).await;
    let hourly = Arc::new(SlowJob::new("hourly", Duration::ZERO));
    let daily = Arc::new(SlowJob::new("daily", Duration::ZERO));
    scheduler
        .schedule(every(Duration::from_secs(3600)), Arc::clone(&hourly))
        .unwrap();
    scheduler
        .schedule(every(Duration::from_secs(86_400)), Arc::clone(&daily))
        .unwrap();

    let elapsed = run_for(&scheduler, Duration::from_secs(1)).await;

    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(hourly.runs() + daily.runs(), 0);
    assert_eq!(handler.count("queued").await, 0);
    assert_eq!(handler.count_for("hourly", "halted").await, 1);
    assert_eq!(handler.count_for("daily", "halted").await, 1);
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_running_job_completes_before_start_returns() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let job = Arc::new(SlowJob::new("long", Duration::from_secs(5)));
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&job))
        .unwrap();

    let elapsed = run_for(&scheduler, Duration::from_millis(1500)).await;

    assert!(elapsed >= Duration::from_secs(6));
    assert_eq!(job.runs(), 1);
    assert_eq!(job.completed(), 1);

    let kinds: Vec<&str> = handler
        .events_for("long")
        .await
        .iter()
        .map(Event::kind)
        .collect();
    assert_eq!(kinds[kinds.len() - 2..], ["completed", "halted"]);
}

#[tokio::test(start_paused = true)]
async fn test_queued_job_gives_up_on_cancel() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let hog = Arc::new(SlowJob::new("hog", Duration::from_secs(10)));
    let starved = Arc::new(SlowJob::new("starved", Duration::ZERO));
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&hog))
        .unwrap();
    scheduler
        .schedule(every(Duration::from_secs(2)), Arc::clone(&starved))
        .unwrap();

    let elapsed = run_for(&scheduler, Duration::from_secs(3)).await;

    assert_eq!(hog.runs(), 1);
    assert_eq!(starved.runs(), 0);
    assert_eq!(handler.count_for("starved", "queued").await, 1);
    assert_eq!(handler.count_for("starved", "running").await, 0);
    assert_eq!(handler.count_for("starved", "halted").await, 1);
    // The hog's run still drains.
    assert!(elapsed >= Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn test_pre_cancelled_token_runs_nothing() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let job = Arc::new(SlowJob::new("never", Duration::ZERO));
    scheduler
        .schedule(every(Duration::ZERO), Arc::clone(&job))
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    scheduler.start(token).await.unwrap();

    assert_eq!(job.runs(), 0);
    assert_eq!(handler.count("halted").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_job_observes_cancellation_through_context() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let observed = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&observed);
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            job_fn("cooperative", move |ctx: JobContext| {
                let seen = Arc::clone(&seen);
                async move {
                    tokio::select! {
                        _ = ctx.cancelled() => {
                            seen.store(true, Ordering::SeqCst);
                            Err(JobError::Cancelled)
                        }
                        _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
                    }
                }
            }),
        )
        .unwrap();

    let elapsed = run_for(&scheduler, Duration::from_secs(2)).await;

    assert!(observed.load(Ordering::SeqCst));
    assert!(elapsed < Duration::from_secs(3));
    assert_eq!(handler.count_for("cooperative", "failed").await, 1);
}
