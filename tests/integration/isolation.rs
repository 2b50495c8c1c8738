//! Failure and panic isolation between jobs.

use async_trait::async_trait;
use cadence::testing::{FailingJob, PanickingJob, SlowJob};
use cadence::{Event, EventHandler, EventLevel, JobContext, JobError, every, job_fn};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{paused_scheduler, run_for};

#[tokio::test(start_paused = true)]
async fn test_panicking_job_does_not_stop_others() {
    let (scheduler, handler) = paused_scheduler(2).await;
    let boom = Arc::new(PanickingJob::new("boom", "disk on fire"));
    let steady = Arc::new(SlowJob::new("steady", Duration::from_millis(100)));
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&boom))
        .unwrap();
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&steady))
        .unwrap();

    run_for(&scheduler, Duration::from_millis(3500)).await;

    assert_eq!(boom.call_count(), 3);
    assert_eq!(steady.runs(), 3);
    assert_eq!(handler.count_for("boom", "recovered").await, 3);
    assert_eq!(handler.count_for("boom", "completed").await, 3);
    assert_eq!(handler.count_for("steady", "recovered").await, 0);

    for event in handler.events_for("boom").await {
        match event {
            Event::JobRecovered { message, .. } => {
                assert_eq!(message.as_deref(), Some("disk on fire"));
            }
            Event::JobCompleted { success, .. } => assert!(!success),
            _ => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_panic_releases_the_slot() {
    let (scheduler, _handler) = paused_scheduler(1).await;
    let boom = Arc::new(PanickingJob::new("boom", "again"));
    let steady = Arc::new(SlowJob::new("steady", Duration::ZERO));
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&boom))
        .unwrap();
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&steady))
        .unwrap();

    run_for(&scheduler, Duration::from_millis(2500)).await;

    assert_eq!(boom.call_count(), 2);
    assert_eq!(steady.runs(), 2);
    assert_eq!(scheduler.gate().available(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_job_keeps_its_schedule() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let flaky = Arc::new(FailingJob::always("flaky"));
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&flaky))
        .unwrap();

    run_for(&scheduler, Duration::from_millis(3500)).await;

    assert_eq!(flaky.call_count().await, 3);
    assert_eq!(handler.count_for("flaky", "failed").await, 3);
    assert_eq!(handler.count_for("flaky", "completed").await, 3);
    assert!(
        handler
            .events_for("flaky")
            .await
            .iter()
            .filter(|event| event.kind() == "failed")
            .all(|event| event.level() == EventLevel::Error)
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_warnings() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let job = Arc::new(FailingJob::new("network", 2).transient());
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&job))
        .unwrap();

    run_for(&scheduler, Duration::from_millis(4500)).await;

    assert_eq!(job.call_count().await, 4);
    assert_eq!(job.failures_remaining().await, 0);

    let events = handler.events_for("network").await;
    let failures: Vec<&Event> = events.iter().filter(|e| e.kind() == "failed").collect();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|e| e.level() == EventLevel::Warn));

    let successes = events
        .iter()
        .filter(|e| matches!(e, Event::JobCompleted { success: true, .. }))
        .count();
    assert_eq!(successes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_job_cancelling_its_context_does_not_stop_scheduler() {
    let (scheduler, handler) = paused_scheduler(2).await;
    let steady = Arc::new(SlowJob::new("steady", Duration::ZERO));
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            job_fn("rogue", |ctx: JobContext| async move {
                ctx.cancellation().cancel();
                Ok::<(), JobError>(())
            }),
        )
        .unwrap();
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&steady))
        .unwrap();

    let elapsed = run_for(&scheduler, Duration::from_millis(5500)).await;

    assert!(elapsed >= Duration::from_millis(5500));
    assert_eq!(steady.runs(), 5);
    assert_eq!(handler.count_for("rogue", "completed").await, 5);
    assert_eq!(handler.count("halted").await, 2);
}

struct ExplodingHandler;

#[async_trait]
impl EventHandler for ExplodingHandler {
    async fn handle(&self, event: &Event) {
        if event.kind() == "running" {
            panic!("handler bug");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_event_handler_does_not_kill_the_loop() {
    let (scheduler, handler) = paused_scheduler(1).await;
    scheduler
        .event_bus()
        .register(Arc::new(ExplodingHandler))
        .await;
    let job = Arc::new(SlowJob::new("observed", Duration::ZERO));
    scheduler
        .schedule(every(Duration::from_secs(1)), Arc::clone(&job))
        .unwrap();

    run_for(&scheduler, Duration::from_millis(3500)).await;

    assert_eq!(job.runs(), 3);
    assert_eq!(handler.count_for("observed", "completed").await, 3);
    assert_eq!(handler.count_for("observed", "halted").await, 1);
}
