//! Job decorators.
//!
//! Each decorator is itself a [`Job`] that owns an inner job, reports the
//! inner job's name, and wraps its `run`. Decorators are applied at
//! registration time through [`JobExt`]; the last one applied is the
//! outermost and runs first.
//!
//! ```
//! use cadence::extensions::{InMemoryLocker, JobCounter, JobExt};
//! use cadence::{JobError, job_fn};
//!
//! let counter = JobCounter::new();
//! let job = job_fn("invoice-sync", |_ctx| async { Ok::<(), JobError>(()) })
//!     .with_run_id()
//!     .locked(InMemoryLocker::new())
//!     .counted(counter.clone());
//! # let _ = job;
//! ```

mod circuit_breaker;
mod context;
mod counter;
mod error_handler;
mod locker;
mod run_id;

pub use circuit_breaker::{CircuitBreaker, consecutive_failures};
pub use context::{ContextBuilder, WithContext};
pub use counter::{Counted, JobCounter};
pub use error_handler::WithErrorHandler;
pub use locker::{InMemoryLocker, Locked, Locker};
pub use run_id::{RUN_ID_KEY, run_id_builder, uuid_run_id};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::job::{Job, JobContext, JobError};

/// Decorator combinators available on every job.
pub trait JobExt: Job + Sized {
    /// Pass the context through `builder` before every run.
    fn with_context<F>(self, builder: F) -> WithContext<Self>
    where
        F: Fn(JobContext) -> JobContext + Send + Sync + 'static,
    {
        WithContext::new(self, Arc::new(builder))
    }

    /// Store a `"{job}-{uuid}"` label under [`RUN_ID_KEY`] before every run.
    fn with_run_id(self) -> WithContext<Self> {
        WithContext::new(self, run_id_builder(uuid_run_id))
    }

    /// Like [`with_run_id`](Self::with_run_id) with a custom label generator.
    fn with_run_id_generator<G>(self, generator: G) -> WithContext<Self>
    where
        G: Fn(&str) -> String + Send + Sync + 'static,
    {
        WithContext::new(self, run_id_builder(generator))
    }

    /// Count invocations in `counter`.
    fn counted(self, counter: JobCounter) -> Counted<Self> {
        Counted::new(self, counter)
    }

    /// Map every result through `handler`.
    fn with_error_handler<F>(self, handler: F) -> WithErrorHandler<Self, F>
    where
        F: Fn(Result<(), JobError>) -> Result<(), JobError> + Send + Sync,
    {
        WithErrorHandler::new(self, handler)
    }

    /// Cancel `token` whenever `trip` returns true for a run's result.
    fn with_circuit_breaker<F>(self, trip: F, token: CancellationToken) -> CircuitBreaker<Self, F>
    where
        F: Fn(&Result<(), JobError>) -> bool + Send + Sync,
    {
        CircuitBreaker::new(self, trip, token)
    }

    /// Hold the lock named after this job while it runs.
    fn locked(self, locker: Arc<dyn Locker>) -> Locked<Self> {
        Locked::new(self, locker)
    }
}

impl<J: Job> JobExt for J {}
