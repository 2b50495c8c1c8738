//! Building and running a scheduler from a YAML file.
//!
//! These tests spawn real processes, so they run on the real clock.

use cadence::testing::RecordingHandler;
use cadence::{ConfigError, Event, EventBus, SchedulerConfigBuilder};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::cancel_after;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

async fn recording_bus() -> (EventBus, Arc<RecordingHandler>) {
    let bus = EventBus::new();
    let handler = Arc::new(RecordingHandler::new());
    bus.register(handler.clone()).await;
    (bus, handler)
}

#[tokio::test]
async fn test_runs_commands_from_file() {
    let file = write_config(
        r#"
max_concurrent_jobs: 2
jobs:
  - name: ok
    schedule: "@every 200ms"
    command: "true"
  - name: broken
    schedule: "@every 200ms"
    command: sh
    args: ["-c", "echo nope >&2; exit 3"]
  - name: parked
    schedule: "@every 200ms"
    command: "true"
    enabled: false
"#,
    );
    let (bus, handler) = recording_bus().await;
    let scheduler = SchedulerConfigBuilder::from_file(file.path())
        .unwrap()
        .with_event_bus(bus)
        .build()
        .unwrap();
    assert_eq!(scheduler.job_names().unwrap(), vec!["broken", "ok"]);

    let token = CancellationToken::new();
    cancel_after(&token, Duration::from_millis(700));
    scheduler.start(token).await.unwrap();

    assert!(handler.count_for("ok", "completed").await >= 2);
    assert_eq!(handler.count_for("ok", "failed").await, 0);
    assert_eq!(handler.count_for("parked", "queued").await, 0);

    let errors: Vec<String> = handler
        .events_for("broken")
        .await
        .into_iter()
        .filter_map(|event| match event {
            Event::JobFailed { error, .. } => Some(error),
            _ => None,
        })
        .collect();
    assert!(errors.len() >= 2);
    assert!(
        errors
            .iter()
            .all(|e| e == "command exited with code 3: nope")
    );
}

#[tokio::test]
async fn test_configured_circuit_breaker_halts_scheduler() {
    let file = write_config(
        r#"
jobs:
  - name: doomed
    schedule: "@every 100ms"
    command: "false"
    circuit_breaker:
      max_consecutive_failures: 2
"#,
    );
    let (bus, handler) = recording_bus().await;
    let token = CancellationToken::new();
    let scheduler = SchedulerConfigBuilder::from_file(file.path())
        .unwrap()
        .with_event_bus(bus)
        .with_shutdown_token(token.clone())
        .build()
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), scheduler.start(token.clone()))
        .await
        .expect("breaker should halt the scheduler")
        .unwrap();

    assert!(token.is_cancelled());
    assert_eq!(handler.count_for("doomed", "failed").await, 2);
    assert_eq!(handler.count_for("doomed", "halted").await, 1);
}

#[tokio::test]
async fn test_timeout_from_config_fails_the_run() {
    let file = write_config(
        r#"
jobs:
  - name: sleepy
    schedule: "@every 100ms"
    command: sleep
    args: ["5"]
    timeout: 150ms
"#,
    );
    let (bus, handler) = recording_bus().await;
    let scheduler = SchedulerConfigBuilder::from_file(file.path())
        .unwrap()
        .with_event_bus(bus)
        .build()
        .unwrap();

    let token = CancellationToken::new();
    cancel_after(&token, Duration::from_millis(350));
    scheduler.start(token).await.unwrap();

    let failures: Vec<String> = handler
        .events_for("sleepy")
        .await
        .into_iter()
        .filter_map(|event| match event {
            Event::JobFailed { error, .. } => Some(error),
            _ => None,
        })
        .collect();
    assert!(!failures.is_empty());
    assert!(failures[0].starts_with("job timed out"));
}

#[test]
fn test_invalid_schedule_names_the_job() {
    let file = write_config(
        r#"
jobs:
  - name: typo
    schedule: "61 * * * *"
    command: "true"
"#,
    );

    match SchedulerConfigBuilder::from_file(file.path()) {
        Err(ConfigError::InvalidSchedule { job, .. }) => assert_eq!(job, "typo"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("invalid schedule accepted"),
    }
}

#[test]
fn test_missing_file_is_reported() {
    let err = SchedulerConfigBuilder::from_file("/definitely/not/here.yaml")
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::FileReadError { .. }));
}
