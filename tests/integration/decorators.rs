//! Decorators applied at registration time, driven by the scheduler.

use cadence::extensions::{
    InMemoryLocker, JobCounter, JobExt, Locker, RUN_ID_KEY, consecutive_failures,
};
use cadence::testing::{FailingJob, PanickingJob, SlowJob};
use cadence::{JobContext, JobError, every, job_fn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::{paused_scheduler, run_for};

#[tokio::test(start_paused = true)]
async fn test_counter_tracks_scheduled_runs() {
    let (scheduler, _handler) = paused_scheduler(1).await;
    let counter = JobCounter::new();
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            SlowJob::new("counted", Duration::ZERO).counted(counter.clone()),
        )
        .unwrap();

    run_for(&scheduler, Duration::from_millis(3500)).await;

    assert_eq!(counter.count(), 3);
    assert_eq!(scheduler.job_names().unwrap(), vec!["counted"]);
}

#[tokio::test(start_paused = true)]
async fn test_each_run_gets_a_fresh_run_label() {
    let (scheduler, _handler) = paused_scheduler(1).await;
    let labels = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&labels);
    let job = job_fn("report", move |ctx: JobContext| {
        let sink = Arc::clone(&sink);
        async move {
            let label: String = ctx.get(RUN_ID_KEY)?;
            sink.lock().unwrap().push(label);
            Ok::<(), JobError>(())
        }
    })
    .with_run_id();
    scheduler.schedule(every(Duration::from_secs(1)), job).unwrap();

    run_for(&scheduler, Duration::from_millis(2500)).await;

    let labels = labels.lock().unwrap().clone();
    assert_eq!(labels.len(), 2);
    assert!(labels.iter().all(|label| label.starts_with("report-")));
    assert_ne!(labels[0], labels[1]);
}

#[tokio::test(start_paused = true)]
async fn test_error_handler_swallows_failures() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let flaky = Arc::new(FailingJob::always("quiet"));
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            Arc::clone(&flaky).with_error_handler(|_| Ok(())),
        )
        .unwrap();

    run_for(&scheduler, Duration::from_millis(2500)).await;

    assert_eq!(flaky.call_count().await, 2);
    assert_eq!(handler.count_for("quiet", "failed").await, 0);
    assert_eq!(handler.count_for("quiet", "completed").await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_stops_the_scheduler() {
    let (scheduler, handler) = paused_scheduler(2).await;
    let token = CancellationToken::new();
    let fragile = Arc::new(FailingJob::always("fragile"));
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            Arc::clone(&fragile).with_circuit_breaker(consecutive_failures(2), token.clone()),
        )
        .unwrap();
    scheduler
        .schedule(
            every(Duration::from_secs(5)),
            SlowJob::new("bystander", Duration::ZERO),
        )
        .unwrap();

    tokio::time::timeout(Duration::from_secs(60), scheduler.start(token.clone()))
        .await
        .expect("breaker should halt the scheduler")
        .unwrap();

    assert!(token.is_cancelled());
    assert_eq!(fragile.call_count().await, 2);
    assert_eq!(handler.count("halted").await, 2);
    assert_eq!(handler.count_for("bystander", "queued").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_held_lock_skips_inner_job() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let locker = InMemoryLocker::new();
    locker.lock("guarded").await.unwrap();

    let inner_runs = JobCounter::new();
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            SlowJob::new("guarded", Duration::ZERO)
                .counted(inner_runs.clone())
                .locked(locker.clone()),
        )
        .unwrap();

    run_for(&scheduler, Duration::from_millis(2500)).await;

    assert_eq!(inner_runs.count(), 0);
    assert_eq!(handler.count_for("guarded", "failed").await, 2);
    assert!(locker.is_locked("guarded"));
}

#[tokio::test(start_paused = true)]
async fn test_lock_released_after_panic() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let locker = InMemoryLocker::new();
    scheduler
        .schedule(
            every(Duration::from_secs(1)),
            PanickingJob::new("boom", "locked and loaded").locked(locker.clone()),
        )
        .unwrap();

    run_for(&scheduler, Duration::from_millis(2500)).await;

    assert_eq!(handler.count_for("boom", "recovered").await, 2);
    assert!(!locker.is_locked("boom"));
}
