//! Context injection.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::core::job::{Job, JobContext, JobError};

/// Transforms the context handed to a job before every run.
pub type ContextBuilder = Arc<dyn Fn(JobContext) -> JobContext + Send + Sync>;

/// Runs the inner job with a context passed through a [`ContextBuilder`].
pub struct WithContext<J> {
    inner: J,
    builder: ContextBuilder,
}

impl<J: Job> WithContext<J> {
    pub fn new(inner: J, builder: ContextBuilder) -> Self {
        Self { inner, builder }
    }

    pub fn inner(&self) -> &J {
        &self.inner
    }
}

impl<J: Job> fmt::Debug for WithContext<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithContext")
            .field("job", &self.inner.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<J: Job> Job for WithContext<J> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        self.inner.run((self.builder)(ctx)).await
    }
}
