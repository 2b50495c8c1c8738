//! Admission gate: the scheduler-wide concurrency ceiling.
//!
//! Every job loop shares one [`AdmissionGate`]. A loop must hold a
//! [`GatePermit`] while its job runs; the permit is returned when dropped, so
//! release happens exactly once even if the guarded work panics.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Errors produced by the admission gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Capacity must be between 1 and the semaphore maximum.
    #[error("invalid capacity {0}: must be greater than zero")]
    InvalidCapacity(usize),

    /// The gate was closed while waiting.
    #[error("admission gate closed")]
    Closed,
}

/// Counting gate bounding how many jobs execute at once.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// Proof of admission. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` concurrent holders.
    pub fn new(capacity: usize) -> Result<Self, GateError> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(GateError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Maximum number of concurrent holders.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Wait until a slot is free and take it.
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(|permit| GatePermit { _permit: permit })
            .map_err(|_| GateError::Closed)
    }

    /// Like [`acquire`](Self::acquire), but gives up when `token` is cancelled.
    ///
    /// Returns `None` on cancellation. Cancellation wins if both are ready.
    pub async fn acquire_or_cancel(&self, token: &CancellationToken) -> Option<GatePermit> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = self.acquire() => permit.ok(),
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }
}
