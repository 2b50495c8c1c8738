//! Job registry: the name-keyed store of (timer, job) pairs.
//!
//! The scheduler reads the registry once per [`start`](crate::Scheduler::start)
//! through [`JobStore::snapshot`]. Implementations must be safe for concurrent
//! readers and writers; [`InMemoryJobStore`] is the default backend.

mod memory;

pub use memory::InMemoryJobStore;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::job::Job;
use crate::core::timer::Timer;

/// Errors that can occur during registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A job with this name is already registered.
    #[error("job already scheduled with name: {0}")]
    DuplicateJob(String),

    /// No job with this name is registered.
    #[error("job does not exist: {0}")]
    JobNotFound(String),

    /// Registry lock was poisoned.
    #[error("registry lock poisoned")]
    LockPoisoned,
}

/// A registered (timer, job) pair.
///
/// Cloning is cheap; a running loop keeps its own clone, so removing the
/// entry from the registry does not affect a loop that is already running.
#[derive(Clone)]
pub struct JobEntry {
    timer: Arc<dyn Timer>,
    job: Arc<dyn Job>,
}

impl JobEntry {
    /// Pair a timer with a job.
    pub fn new(timer: impl Timer + 'static, job: impl Job + 'static) -> Self {
        Self::from_shared(Arc::new(timer), Arc::new(job))
    }

    /// Pair already shared timer and job handles.
    pub fn from_shared(timer: Arc<dyn Timer>, job: Arc<dyn Job>) -> Self {
        Self { timer, job }
    }

    /// The registry key.
    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// The entry's timer.
    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    /// The entry's job.
    pub fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEntry")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Thread-safe store of job entries keyed by job name.
pub trait JobStore: Send + Sync {
    /// Insert an entry. Fails with [`RegistryError::DuplicateJob`] if the name
    /// is taken, leaving the store unchanged.
    fn add(&self, entry: JobEntry) -> Result<(), RegistryError>;

    /// Remove an entry. Fails with [`RegistryError::JobNotFound`] if absent,
    /// leaving the store unchanged.
    fn remove(&self, name: &str) -> Result<JobEntry, RegistryError>;

    /// Look up an entry by name.
    fn get(&self, name: &str) -> Result<JobEntry, RegistryError>;

    /// Independent copy of every entry. Order is not significant.
    fn snapshot(&self) -> Result<Vec<JobEntry>, RegistryError>;

    /// Number of registered entries.
    fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.snapshot()?.len())
    }

    /// Whether the store is empty.
    fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    /// Sorted list of registered names.
    fn names(&self) -> Result<Vec<String>, RegistryError> {
        let mut names: Vec<String> = self
            .snapshot()?
            .iter()
            .map(|entry| entry.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}
