//! The per-job loop: wait, queue, run, reschedule.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::job::JobContext;
use crate::core::timer::Clock;
use crate::core::types::RunId;
use crate::events::{Event, EventBus};
use crate::execution::{AdmissionGate, JobFailure, execute_guarded};
use crate::registry::JobEntry;

/// Where a job loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopState {
    /// Computing the next fire time.
    Idle,
    /// Sleeping until the fire time.
    Waiting,
    /// Fire time reached, waiting for an admission slot.
    Queued,
    /// Inside the job's `run`.
    Running,
    /// Stopped for good after cancellation.
    Halted,
}

/// How long to wait before firing at `candidate`.
///
/// A candidate at or before `now` is due immediately; the result is never
/// negative.
pub fn time_until_next_run(candidate: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (candidate - now).to_std().unwrap_or(Duration::ZERO)
}

pub(crate) struct JobLoop {
    entry: JobEntry,
    name: Arc<str>,
    gate: AdmissionGate,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    token: CancellationToken,
    state: LoopState,
}

impl JobLoop {
    pub(crate) fn new(
        entry: JobEntry,
        gate: AdmissionGate,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        token: CancellationToken,
    ) -> Self {
        let name: Arc<str> = Arc::from(entry.name());
        Self {
            entry,
            name,
            gate,
            clock,
            events,
            token,
            state: LoopState::Idle,
        }
    }

    fn transition(&mut self, next: LoopState) {
        tracing::trace!(job = %self.name, from = ?self.state, to = ?next, "loop state");
        self.state = next;
    }

    /// Drive the job until the token is cancelled.
    pub(crate) async fn run(mut self) {
        let mut previous = self.clock.now();

        loop {
            self.transition(LoopState::Idle);
            let now = self.clock.now();
            let candidate = self.entry.timer().next(previous);
            let wait = time_until_next_run(candidate, now);

            tracing::debug!(job = %self.name, next_run = %candidate, wait_ms = wait.as_millis() as u64, "next run computed");
            self.events
                .emit(Event::NextRunComputed {
                    job: Arc::clone(&self.name),
                    next_run: candidate,
                    wait,
                    timestamp: now,
                })
                .await;

            self.transition(LoopState::Waiting);
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            // A past-due candidate re-anchors at the firing instant: one catch-up
            // run, never a burst.
            let fired_at = self.clock.now();
            previous = if wait.is_zero() { fired_at } else { candidate };

            self.fire(candidate).await;

            if self.token.is_cancelled() {
                break;
            }
        }

        self.transition(LoopState::Halted);
        tracing::info!(job = %self.name, "job halted");
        self.events
            .emit(Event::JobHalted {
                job: Arc::clone(&self.name),
                timestamp: self.clock.now(),
            })
            .await;
    }

    /// One invocation: queue on the gate, run guarded, report.
    async fn fire(&mut self, scheduled_at: DateTime<Utc>) {
        let run_id = RunId::new();

        self.transition(LoopState::Queued);
        tracing::info!(job = %self.name, %run_id, "job queued");
        self.events
            .emit(Event::JobQueued {
                job: Arc::clone(&self.name),
                run_id,
                scheduled_at,
                timestamp: self.clock.now(),
            })
            .await;

        let Some(permit) = self.gate.acquire_or_cancel(&self.token).await else {
            tracing::debug!(job = %self.name, %run_id, "cancelled while queued");
            return;
        };

        self.transition(LoopState::Running);
        tracing::info!(job = %self.name, %run_id, "job running");
        self.events
            .emit(Event::JobRunning {
                job: Arc::clone(&self.name),
                run_id,
                timestamp: self.clock.now(),
            })
            .await;

        let ctx = JobContext::new(
            Arc::clone(&self.name),
            run_id,
            scheduled_at,
            self.token.child_token(),
        );
        let started = tokio::time::Instant::now();
        let outcome = execute_guarded(self.entry.job().as_ref(), ctx).await;
        let duration = started.elapsed();
        drop(permit);

        match &outcome {
            Ok(()) => {}
            Err(JobFailure::Failed(err)) => {
                tracing::error!(job = %self.name, %run_id, error = %err, "job failed");
                self.events
                    .emit(Event::JobFailed {
                        job: Arc::clone(&self.name),
                        run_id,
                        error: err.to_string(),
                        transient: err.is_transient(),
                        timestamp: self.clock.now(),
                    })
                    .await;
            }
            Err(JobFailure::Panicked { message }) => {
                tracing::error!(
                    job = %self.name,
                    %run_id,
                    error = message.as_deref().unwrap_or("unknown panic"),
                    "recovered from job panic"
                );
                self.events
                    .emit(Event::JobRecovered {
                        job: Arc::clone(&self.name),
                        run_id,
                        message: message.clone(),
                        timestamp: self.clock.now(),
                    })
                    .await;
            }
        }

        tracing::info!(
            job = %self.name,
            %run_id,
            duration_ms = duration.as_millis() as u64,
            "job completed"
        );
        self.events
            .emit(Event::JobCompleted {
                job: Arc::clone(&self.name),
                run_id,
                success: outcome.is_ok(),
                duration,
                timestamp: self.clock.now(),
            })
            .await;
    }
}
