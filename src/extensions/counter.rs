//! Invocation counting.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::job::{Job, JobContext, JobError};

/// Shared count of invocations, readable while the scheduler runs.
#[derive(Debug, Clone, Default)]
pub struct JobCounter {
    count: Arc<AtomicU64>,
}

impl JobCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts every invocation of the inner job, before it runs.
#[derive(Debug)]
pub struct Counted<J> {
    inner: J,
    counter: JobCounter,
}

impl<J: Job> Counted<J> {
    pub fn new(inner: J, counter: JobCounter) -> Self {
        Self { inner, counter }
    }

    pub fn counter(&self) -> &JobCounter {
        &self.counter
    }
}

#[async_trait]
impl<J: Job> Job for Counted<J> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        self.counter.increment();
        self.inner.run(ctx).await
    }
}
