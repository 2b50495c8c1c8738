//! Scheduler engine implementation.
//!
//! The scheduler owns the job registry and the admission gate. On
//! [`start`](Scheduler::start) it snapshots the registry and runs one
//! independent loop per job until the cancellation token fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::job_loop::JobLoop;
use crate::core::job::Job;
use crate::core::timer::{Clock, SystemClock, Timer};
use crate::events::EventBus;
use crate::execution::AdmissionGate;
use crate::registry::{InMemoryJobStore, JobEntry, JobStore, RegistryError};

/// Errors that can occur in the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Concurrency capacity must be at least one.
    #[error("invalid capacity {0}: must be greater than zero")]
    InvalidCapacity(usize),

    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// `start` was called while a previous `start` was still running.
    #[error("scheduler is already running")]
    AlreadyRunning,
}

/// Runs registered jobs on their timers under a shared concurrency ceiling.
///
/// # Example
///
/// ```no_run
/// use cadence::{JobError, Scheduler, every, job_fn};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = Scheduler::new(2)?;
/// scheduler.schedule(
///     every(Duration::from_secs(5)),
///     job_fn("heartbeat", |_ctx| async { Ok::<(), JobError>(()) }),
/// )?;
///
/// let token = CancellationToken::new();
/// scheduler.start(token).await?;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    registry: Arc<dyn JobStore>,
    gate: AdmissionGate,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    running: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler allowing at most `capacity` jobs to run at once.
    pub fn new(capacity: usize) -> Result<Self, SchedulerError> {
        let gate =
            AdmissionGate::new(capacity).map_err(|_| SchedulerError::InvalidCapacity(capacity))?;
        Ok(Self {
            registry: Arc::new(InMemoryJobStore::new()),
            gate,
            clock: Arc::new(SystemClock),
            event_bus: Arc::new(EventBus::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Use a custom registry backend.
    pub fn with_registry(mut self, registry: Arc<dyn JobStore>) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom clock for fire-time arithmetic.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Register `job` to run whenever `timer` fires.
    ///
    /// Fails with [`RegistryError::DuplicateJob`] if the name is taken.
    pub fn schedule(
        &self,
        timer: impl Timer + 'static,
        job: impl Job + 'static,
    ) -> Result<(), SchedulerError> {
        self.schedule_entry(JobEntry::new(timer, job))
    }

    /// Register a prebuilt entry.
    pub fn schedule_entry(&self, entry: JobEntry) -> Result<(), SchedulerError> {
        let name = entry.name().to_string();
        self.registry.add(entry)?;
        tracing::debug!(job = %name, "job scheduled");
        Ok(())
    }

    /// Remove a job from the registry.
    ///
    /// A loop already running for this job keeps going; the removal takes
    /// effect on the next [`start`](Self::start).
    pub fn unschedule(&self, name: &str) -> Result<JobEntry, SchedulerError> {
        let entry = self.registry.remove(name)?;
        tracing::debug!(job = %name, "job unscheduled");
        Ok(entry)
    }

    /// Sorted names of registered jobs.
    pub fn job_names(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.registry.names()?)
    }

    pub fn registry(&self) -> &Arc<dyn JobStore> {
        &self.registry
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Whether a `start` call is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run every registered job until `token` is cancelled.
    ///
    /// Returns once every loop has halted. Job failures never end this call;
    /// the only errors are a registry that cannot be read and a concurrent
    /// second `start`. With nothing registered it returns immediately.
    pub async fn start(&self, token: CancellationToken) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let entries = self.registry.snapshot()?;
        if entries.is_empty() {
            tracing::warn!("no jobs scheduled, nothing to run");
            return Ok(());
        }

        tracing::info!(
            jobs = entries.len(),
            capacity = self.gate.capacity(),
            "scheduler started"
        );

        let mut loops = JoinSet::new();
        for entry in entries {
            let job_loop = JobLoop::new(
                entry,
                self.gate.clone(),
                Arc::clone(&self.clock),
                Arc::clone(&self.event_bus),
                token.clone(),
            );
            loops.spawn(job_loop.run());
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "job loop task failed");
            }
        }

        tracing::info!("scheduler stopped");
        Ok(())
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
