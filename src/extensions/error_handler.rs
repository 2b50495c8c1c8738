//! Error translation and suppression.

use async_trait::async_trait;

use crate::core::job::{Job, JobContext, JobError};

/// Passes the inner job's result through a handler before the scheduler
/// sees it.
///
/// The handler can translate an error, swallow it by returning `Ok(())`, or
/// just observe it and pass it on.
pub struct WithErrorHandler<J, F> {
    inner: J,
    handler: F,
}

impl<J, F> WithErrorHandler<J, F>
where
    J: Job,
    F: Fn(Result<(), JobError>) -> Result<(), JobError> + Send + Sync,
{
    pub fn new(inner: J, handler: F) -> Self {
        Self { inner, handler }
    }
}

#[async_trait]
impl<J, F> Job for WithErrorHandler<J, F>
where
    J: Job,
    F: Fn(Result<(), JobError>) -> Result<(), JobError> + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let result = self.inner.run(ctx).await;
        (self.handler)(result)
    }
}
