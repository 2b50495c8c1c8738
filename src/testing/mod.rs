//! Testing utilities for users of the cadence library.
//!
//! - [`PausedClock`]: a [`Clock`] that follows tokio's (pausable) time
//! - [`RecordingHandler`]: an event handler that keeps every event
//! - [`FailingJob`]: fails N times then succeeds
//! - [`PanickingJob`]: panics on every run
//! - [`SlowJob`]: takes a fixed time per run and records concurrency
//!
//! Combine them with `#[tokio::test(start_paused = true)]` to drive the
//! scheduler through hours of schedule in milliseconds of wall time.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::job::{Job, JobContext, JobError};
use crate::core::timer::Clock;
use crate::events::{Event, EventHandler};

/// A clock anchored at a fixed wall-clock instant that advances with
/// `tokio::time`.
///
/// Under a paused runtime, `now()` moves only when tokio's virtual time does,
/// so the scheduler's wall-clock arithmetic and its sleeps stay in lockstep.
///
/// ```
/// use cadence::Clock;
/// use cadence::testing::PausedClock;
/// use chrono::{TimeZone, Utc};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let clock = PausedClock::new(base);
/// assert!(clock.now() >= base);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PausedClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl PausedClock {
    /// Anchor the clock at `base`, starting now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }

    /// The anchor instant.
    pub fn base(&self) -> DateTime<Utc> {
        self.base
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new(Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default())
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.origin.elapsed())
            .ok()
            .and_then(|elapsed| self.base.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Event handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far, in arrival order.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Events belonging to `job`.
    pub async fn events_for(&self, job: &str) -> Vec<Event> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.job() == job)
            .cloned()
            .collect()
    }

    /// Number of events of the given [`Event::kind`].
    pub async fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    /// Number of events of the given kind for one job.
    pub async fn count_for(&self, job: &str, kind: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.job() == job && e.kind() == kind)
            .count()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// A job that fails a set number of times, then succeeds.
///
/// ```
/// use cadence::testing::FailingJob;
///
/// // Fails twice, then succeeds on every later run
/// let job = FailingJob::new("flaky", 2);
/// ```
pub struct FailingJob {
    name: String,
    /// Mutex keeps check-and-decrement atomic under concurrent runs.
    state: Mutex<FailingJobState>,
    error: fn(String) -> JobError,
    error_message: String,
}

struct FailingJobState {
    failures_remaining: u32,
    call_count: u32,
}

impl FailingJob {
    /// Create a job that fails `fail_count` times then succeeds.
    pub fn new(name: impl Into<String>, fail_count: u32) -> Self {
        Self::with_error(name, fail_count, "intentional test failure")
    }

    /// Create a job that fails with a custom message.
    pub fn with_error(
        name: impl Into<String>,
        fail_count: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FailingJobState {
                failures_remaining: fail_count,
                call_count: 0,
            }),
            error: JobError::ExecutionFailed,
            error_message: message.into(),
        }
    }

    /// Fail with [`JobError::Transient`] instead of `ExecutionFailed`.
    pub fn transient(mut self) -> Self {
        self.error = JobError::Transient;
        self
    }

    /// Create a job that never succeeds.
    pub fn always(name: impl Into<String>) -> Self {
        Self::new(name, u32::MAX)
    }

    pub async fn failures_remaining(&self) -> u32 {
        self.state.lock().await.failures_remaining
    }

    pub async fn call_count(&self) -> u32 {
        self.state.lock().await.call_count
    }
}

#[async_trait]
impl Job for FailingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: JobContext) -> Result<(), JobError> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            Err((self.error)(self.error_message.clone()))
        } else {
            Ok(())
        }
    }
}

/// A job that panics on every run.
pub struct PanickingJob {
    name: String,
    message: String,
    calls: AtomicU32,
}

impl PanickingJob {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for PanickingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: JobContext) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("{}", self.message);
    }
}

/// Tracks how many jobs sharing it are running at once.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Currently running holders.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous holders observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A job that takes `duration` per run and ignores cancellation while
/// running.
pub struct SlowJob {
    name: String,
    duration: Duration,
    gauge: Arc<ConcurrencyGauge>,
    runs: AtomicU32,
    completed: AtomicU32,
    scheduled: std::sync::Mutex<Vec<DateTime<Utc>>>,
}

impl SlowJob {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self::with_gauge(name, duration, ConcurrencyGauge::new())
    }

    /// Share a gauge between several jobs to observe their combined
    /// concurrency.
    pub fn with_gauge(
        name: impl Into<String>,
        duration: Duration,
        gauge: Arc<ConcurrencyGauge>,
    ) -> Self {
        Self {
            name: name.into(),
            duration,
            gauge,
            runs: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            scheduled: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of runs started.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Number of runs that reached the end of their sleep.
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }

    /// `scheduled_at` of every run, in start order.
    pub fn scheduled_times(&self) -> Vec<DateTime<Utc>> {
        self.scheduled
            .lock()
            .map(|times| times.clone())
            .unwrap_or_default()
    }

    pub fn gauge(&self) -> &Arc<ConcurrencyGauge> {
        &self.gauge
    }
}

#[async_trait]
impl Job for SlowJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut times) = self.scheduled.lock() {
            times.push(ctx.scheduled_at());
        }

        self.gauge.enter();
        tokio::time::sleep(self.duration).await;
        self.gauge.exit();

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
