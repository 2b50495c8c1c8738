//! The job capability and its execution context.
//!
//! A [`Job`] is a named unit of work. The scheduler calls [`Job::run`]
//! every time the job's timer fires, handing it a fresh [`JobContext`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::RunId;

/// Errors that can occur when reading or writing context values.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Key was not found in the context.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Failed to deserialize value from context.
    #[error("deserialization error for key '{key}': {message}")]
    DeserializationError { key: String, message: String },

    /// Failed to serialize value for context.
    #[error("serialization error for key '{key}': {message}")]
    SerializationError { key: String, message: String },
}

/// Errors a job can return from [`Job::run`].
#[derive(Debug, Error)]
pub enum JobError {
    /// Job execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Job timed out.
    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    /// External command exited unsuccessfully.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// The job observed cancellation and stopped early.
    #[error("job cancelled")]
    Cancelled,

    /// A lock guarding the job could not be acquired.
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// Error accessing the job context.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// A transient error that may succeed next time.
    #[error("transient error: {0}")]
    Transient(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl JobError {
    /// Check if this error is considered transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JobError::Transient(_) | JobError::Timeout(_) | JobError::LockUnavailable(_)
        )
    }
}

/// Per-invocation context handed to [`Job::run`].
///
/// Carries the invocation identity, a cancellation token that fires when the
/// scheduler shuts down, and a small JSON value map that decorators use to
/// inject data (see [`crate::extensions`]).
#[derive(Clone)]
pub struct JobContext {
    job_name: Arc<str>,
    run_id: RunId,
    scheduled_at: DateTime<Utc>,
    cancellation: CancellationToken,
    values: HashMap<String, Value>,
}

impl JobContext {
    /// Create a context for one invocation of `job_name`.
    pub fn new(
        job_name: impl Into<Arc<str>>,
        run_id: RunId,
        scheduled_at: DateTime<Utc>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            run_id,
            scheduled_at,
            cancellation,
            values: HashMap::new(),
        }
    }

    /// Context detached from any scheduler, useful for calling a job by hand.
    pub fn detached(job_name: impl Into<Arc<str>>) -> Self {
        Self::new(job_name, RunId::new(), Utc::now(), CancellationToken::new())
    }

    /// Name of the job being run.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Identifier of this invocation.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The instant this invocation was scheduled to fire.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    /// Token cancelled when the scheduler is asked to stop.
    ///
    /// Inside a scheduler this is a child of the scheduler's token: cancelling
    /// it only affects this invocation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the scheduler has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the scheduler has been asked to stop.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Store a serializable value under `key`, replacing any previous value.
    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), ContextError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| ContextError::SerializationError {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_value<T: Serialize>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Self, ContextError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Read a value by key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::DeserializationError {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Read a value by key, returning `None` if absent or of the wrong shape.
    pub fn get_optional<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).ok()
    }

    /// Check if a key exists in the context.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All stored values.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_name", &self.job_name)
            .field("run_id", &self.run_id)
            .field("scheduled_at", &self.scheduled_at)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("values", &self.values)
            .finish()
    }
}

/// A named, independently schedulable unit of work.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use cadence::{Job, JobContext, JobError};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Job for Heartbeat {
///     fn name(&self) -> &str {
///         "heartbeat"
///     }
///
///     async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
///         if ctx.is_cancelled() {
///             return Err(JobError::Cancelled);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name, used as the unique registry key.
    fn name(&self) -> &str;

    /// Execute one invocation.
    ///
    /// Returned errors and panics are both contained by the scheduler; the
    /// job keeps its schedule either way.
    async fn run(&self, ctx: JobContext) -> Result<(), JobError>;
}

#[async_trait]
impl<J: Job + ?Sized> Job for Arc<J> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (**self).run(ctx).await
    }
}

#[async_trait]
impl<J: Job + ?Sized> Job for Box<J> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (**self).run(ctx).await
    }
}

/// A job backed by an async closure. Built with [`job_fn`].
pub struct FnJob<F> {
    name: String,
    f: F,
}

/// Build a [`Job`] from a name and an async closure.
///
/// ```
/// use cadence::{JobError, job_fn};
///
/// let job = job_fn("noop", |_ctx| async { Ok::<(), JobError>(()) });
/// # let _ = job;
/// ```
pub fn job_fn<F, Fut>(name: impl Into<String>, f: F) -> FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    FnJob {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
