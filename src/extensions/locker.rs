//! Mutual exclusion around a job's run, keyed by job name.
//!
//! [`Locker`] is the seam for distributed coordination: a backend that talks
//! to Redis, etcd or a database implements it, and [`Locked`] takes the lock
//! before each run and gives it back afterwards. [`InMemoryLocker`] covers
//! a single process, e.g. several schedulers sharing one runtime.

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use crate::core::job::{Job, JobContext, JobError};

/// A named lock service.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Take the lock for `key`.
    ///
    /// Fails with [`JobError::LockUnavailable`] when someone else holds it.
    async fn lock(&self, key: &str) -> Result<(), JobError>;

    /// Give back the lock for `key`.
    async fn unlock(&self, key: &str) -> Result<(), JobError>;
}

/// In-process [`Locker`] backed by a set of held keys.
#[derive(Debug, Default)]
pub struct InMemoryLocker {
    held: Mutex<HashSet<String>>,
}

impl InMemoryLocker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    async fn lock(&self, key: &str) -> Result<(), JobError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| JobError::LockUnavailable(format!("{key}: lock table poisoned")))?;
        if held.insert(key.to_string()) {
            Ok(())
        } else {
            Err(JobError::LockUnavailable(key.to_string()))
        }
    }

    async fn unlock(&self, key: &str) -> Result<(), JobError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| JobError::LockUnavailable(format!("{key}: lock table poisoned")))?;
        if held.remove(key) {
            Ok(())
        } else {
            Err(JobError::ExecutionFailed(format!("lock {key} was not held")))
        }
    }
}

/// Runs the inner job only while holding its named lock.
pub struct Locked<J> {
    inner: J,
    key: String,
    locker: Arc<dyn Locker>,
}

impl<J: Job> Locked<J> {
    /// Lock on the inner job's name.
    pub fn new(inner: J, locker: Arc<dyn Locker>) -> Self {
        let key = inner.name().to_string();
        Self { inner, key, locker }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<J: Job> Job for Locked<J> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        self.locker.lock(&self.key).await?;

        let outcome = AssertUnwindSafe(self.inner.run(ctx)).catch_unwind().await;

        if let Err(e) = self.locker.unlock(&self.key).await {
            tracing::warn!(job = %self.inner.name(), error = %e, "failed to release job lock");
        }

        match outcome {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}
