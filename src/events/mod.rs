//! Lifecycle events and event handling.
//!
//! Every job loop reports what it is doing through an [`EventBus`]. Handlers
//! receive each [`Event`] in emission order for a given job; events of
//! different jobs interleave freely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::core::types::RunId;
use crate::execution::panic_message;

/// Severity attached to each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        })
    }
}

/// Lifecycle events emitted by job loops.
#[derive(Debug, Clone)]
pub enum Event {
    /// Fire time reached; the loop is waiting for an admission slot.
    JobQueued {
        job: Arc<str>,
        run_id: RunId,
        scheduled_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Admission granted; the job's `run` is about to be called.
    JobRunning {
        job: Arc<str>,
        run_id: RunId,
        timestamp: DateTime<Utc>,
    },

    /// The invocation finished, whatever its outcome.
    JobCompleted {
        job: Arc<str>,
        run_id: RunId,
        success: bool,
        duration: Duration,
        timestamp: DateTime<Utc>,
    },

    /// The job returned an error.
    JobFailed {
        job: Arc<str>,
        run_id: RunId,
        error: String,
        /// Whether the error is expected to clear on a later run.
        transient: bool,
        timestamp: DateTime<Utc>,
    },

    /// The job panicked and the fault was contained.
    JobRecovered {
        job: Arc<str>,
        run_id: RunId,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The loop computed its next fire time.
    NextRunComputed {
        job: Arc<str>,
        next_run: DateTime<Utc>,
        wait: Duration,
        timestamp: DateTime<Utc>,
    },

    /// The loop observed cancellation and stopped for good.
    JobHalted {
        job: Arc<str>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Name of the job the event belongs to.
    pub fn job(&self) -> &str {
        match self {
            Event::JobQueued { job, .. }
            | Event::JobRunning { job, .. }
            | Event::JobCompleted { job, .. }
            | Event::JobFailed { job, .. }
            | Event::JobRecovered { job, .. }
            | Event::NextRunComputed { job, .. }
            | Event::JobHalted { job, .. } => job,
        }
    }

    /// When the event happened, per the scheduler's clock.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::JobQueued { timestamp, .. }
            | Event::JobRunning { timestamp, .. }
            | Event::JobCompleted { timestamp, .. }
            | Event::JobFailed { timestamp, .. }
            | Event::JobRecovered { timestamp, .. }
            | Event::NextRunComputed { timestamp, .. }
            | Event::JobHalted { timestamp, .. } => *timestamp,
        }
    }

    /// Invocation identifier, for events tied to one invocation.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Event::JobQueued { run_id, .. }
            | Event::JobRunning { run_id, .. }
            | Event::JobCompleted { run_id, .. }
            | Event::JobFailed { run_id, .. }
            | Event::JobRecovered { run_id, .. } => Some(*run_id),
            Event::NextRunComputed { .. } | Event::JobHalted { .. } => None,
        }
    }

    /// Short machine-friendly name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::JobQueued { .. } => "queued",
            Event::JobRunning { .. } => "running",
            Event::JobCompleted { .. } => "completed",
            Event::JobFailed { .. } => "failed",
            Event::JobRecovered { .. } => "recovered",
            Event::NextRunComputed { .. } => "next_run",
            Event::JobHalted { .. } => "halted",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            Event::JobFailed { transient: true, .. } => EventLevel::Warn,
            Event::JobFailed { .. } | Event::JobRecovered { .. } => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }

    /// Key/value pairs describing the event, `job` first.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("job", self.job().to_string())];
        if let Some(run_id) = self.run_id() {
            fields.push(("run_id", run_id.to_string()));
        }
        match self {
            Event::JobQueued { scheduled_at, .. } => {
                fields.push(("scheduled_at", scheduled_at.to_rfc3339()));
            }
            Event::JobCompleted {
                success, duration, ..
            } => {
                fields.push(("success", success.to_string()));
                fields.push(("duration_ms", duration.as_millis().to_string()));
            }
            Event::JobFailed {
                error, transient, ..
            } => {
                fields.push(("error", error.clone()));
                fields.push(("transient", transient.to_string()));
            }
            Event::JobRecovered { message, .. } => {
                if let Some(message) = message {
                    fields.push(("error", message.clone()));
                }
            }
            Event::NextRunComputed { next_run, wait, .. } => {
                fields.push(("next_run", next_run.to_rfc3339()));
                fields.push(("wait_ms", wait.as_millis().to_string()));
            }
            Event::JobRunning { .. } | Event::JobHalted { .. } => {}
        }
        fields
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers and
    /// the emitting job loop carry on.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if let Err(payload) = AssertUnwindSafe(handler.handle(&event))
                .catch_unwind()
                .await
            {
                tracing::error!(
                    job = %event.job(),
                    event = event.kind(),
                    error = panic_message(payload.as_ref()).as_deref().unwrap_or("unknown panic"),
                    "event handler panicked"
                );
            }
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards events to `tracing` at the event's level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHandler;

#[async_trait]
impl EventHandler for TracingHandler {
    async fn handle(&self, event: &Event) {
        let details = event
            .fields()
            .into_iter()
            .skip(1)
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        let job = event.job();
        let kind = event.kind();

        match event.level() {
            EventLevel::Info => tracing::info!(job = %job, event = kind, %details, "job event"),
            EventLevel::Warn => tracing::warn!(job = %job, event = kind, %details, "job event"),
            EventLevel::Error => tracing::error!(job = %job, event = kind, %details, "job event"),
        }
    }
}
