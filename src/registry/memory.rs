//! In-memory registry implementation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use super::{JobEntry, JobStore, RegistryError};

/// In-memory job store.
///
/// Uses an `RwLock` so snapshots and lookups proceed in parallel while
/// writers get exclusive access.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl InMemoryJobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn add(&self, entry: JobEntry) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().map_err(|_| RegistryError::LockPoisoned)?;
        match jobs.entry(entry.name().to_string()) {
            Entry::Occupied(occupied) => Err(RegistryError::DuplicateJob(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    fn remove(&self, name: &str) -> Result<JobEntry, RegistryError> {
        let mut jobs = self.jobs.write().map_err(|_| RegistryError::LockPoisoned)?;
        jobs.remove(name)
            .ok_or_else(|| RegistryError::JobNotFound(name.to_string()))
    }

    fn get(&self, name: &str) -> Result<JobEntry, RegistryError> {
        let jobs = self.jobs.read().map_err(|_| RegistryError::LockPoisoned)?;
        jobs.get(name)
            .cloned()
            .ok_or_else(|| RegistryError::JobNotFound(name.to_string()))
    }

    fn snapshot(&self) -> Result<Vec<JobEntry>, RegistryError> {
        let jobs = self.jobs.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(jobs.values().cloned().collect())
    }

    fn len(&self) -> Result<usize, RegistryError> {
        let jobs = self.jobs.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(jobs.len())
    }
}
