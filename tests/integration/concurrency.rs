//! Concurrency ceiling enforced by the admission gate.

use cadence::testing::{ConcurrencyGauge, SlowJob};
use cadence::{Scheduler, every};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{paused_scheduler, run_for};

fn register_gauged(
    scheduler: &Scheduler,
    names: &[&str],
    duration: Duration,
    gauge: &Arc<ConcurrencyGauge>,
) -> Vec<Arc<SlowJob>> {
    names
        .iter()
        .map(|name| {
            let job = Arc::new(SlowJob::with_gauge(*name, duration, Arc::clone(gauge)));
            scheduler
                .schedule(every(Duration::from_secs(1)), Arc::clone(&job))
                .unwrap();
            job
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_single_slot_serializes_coinciding_jobs() {
    let (scheduler, _handler) = paused_scheduler(1).await;
    let gauge = ConcurrencyGauge::new();
    let jobs = register_gauged(
        &scheduler,
        &["a", "b", "c"],
        Duration::from_millis(300),
        &gauge,
    );

    run_for(&scheduler, Duration::from_millis(5950)).await;

    assert_eq!(gauge.peak(), 1);
    for job in &jobs {
        assert_eq!(job.runs(), 5);
    }
}

#[tokio::test(start_paused = true)]
async fn test_capacity_two_caps_three_jobs() {
    let (scheduler, _handler) = paused_scheduler(2).await;
    let gauge = ConcurrencyGauge::new();
    let jobs = register_gauged(
        &scheduler,
        &["a", "b", "c"],
        Duration::from_millis(500),
        &gauge,
    );

    run_for(&scheduler, Duration::from_millis(3900)).await;

    assert_eq!(gauge.peak(), 2);
    assert_eq!(gauge.active(), 0);
    assert!(jobs.iter().all(|job| job.runs() >= 2));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_above_job_count_runs_all_together() {
    let (scheduler, _handler) = paused_scheduler(8).await;
    let gauge = ConcurrencyGauge::new();
    register_gauged(
        &scheduler,
        &["a", "b", "c"],
        Duration::from_millis(500),
        &gauge,
    );

    run_for(&scheduler, Duration::from_millis(1700)).await;

    assert_eq!(gauge.peak(), 3);
    assert_eq!(scheduler.gate().available(), 8);
    assert_eq!(scheduler.gate().in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queued_runs_are_counted_before_running() {
    let (scheduler, handler) = paused_scheduler(1).await;
    let gauge = ConcurrencyGauge::new();
    register_gauged(&scheduler, &["a", "b"], Duration::from_millis(400), &gauge);

    run_for(&scheduler, Duration::from_millis(1900)).await;

    // Both fire at 1s; the second waits for the first to finish.
    assert_eq!(handler.count("queued").await, 2);
    assert_eq!(handler.count("running").await, 2);
    assert_eq!(handler.count("completed").await, 2);
    assert_eq!(gauge.peak(), 1);
}
