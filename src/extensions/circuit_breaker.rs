//! Circuit breaking: stop the scheduler when a job keeps misbehaving.
//!
//! After every run the breaker asks its trip function whether the result
//! should open the circuit. When it does, the breaker cancels the supplied
//! token, which is normally the one passed to
//! [`Scheduler::start`](crate::Scheduler::start), so every loop halts.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;

use crate::core::job::{Job, JobContext, JobError};

pub struct CircuitBreaker<J, F> {
    inner: J,
    trip: F,
    token: CancellationToken,
}

impl<J, F> CircuitBreaker<J, F>
where
    J: Job,
    F: Fn(&Result<(), JobError>) -> bool + Send + Sync,
{
    pub fn new(inner: J, trip: F, token: CancellationToken) -> Self {
        Self { inner, trip, token }
    }

    /// Whether the breaker's token has been cancelled.
    pub fn is_open(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
impl<J, F> Job for CircuitBreaker<J, F>
where
    J: Job,
    F: Fn(&Result<(), JobError>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let result = self.inner.run(ctx).await;
        if (self.trip)(&result) && !self.token.is_cancelled() {
            tracing::warn!(job = %self.inner.name(), "circuit breaker tripped, cancelling");
            self.token.cancel();
        }
        result
    }
}

/// Trip function that opens after `max` failures in a row.
///
/// Any success resets the streak. `max` of zero is treated as one.
pub fn consecutive_failures(max: u32) -> impl Fn(&Result<(), JobError>) -> bool + Send + Sync {
    let max = max.max(1);
    let streak = AtomicU32::new(0);
    move |result| match result {
        Ok(()) => {
            streak.store(0, Ordering::SeqCst);
            false
        }
        Err(_) => streak.fetch_add(1, Ordering::SeqCst) + 1 >= max,
    }
}
