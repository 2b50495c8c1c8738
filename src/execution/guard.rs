//! Panic-isolating execution wrapper.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

use crate::core::job::{Job, JobContext, JobError};

/// Why a single invocation did not succeed.
#[derive(Debug, Error)]
pub enum JobFailure {
    /// The job returned an error.
    #[error(transparent)]
    Failed(#[from] JobError),

    /// The job panicked. `message` holds the payload when it was a string or
    /// an error value.
    #[error("job panicked{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Panicked { message: Option<String> },
}

impl JobFailure {
    /// Whether this failure came from a panic rather than a returned error.
    pub fn is_panic(&self) -> bool {
        matches!(self, JobFailure::Panicked { .. })
    }
}

/// Run `job` once, converting both returned errors and panics into a
/// [`JobFailure`].
///
/// A panic never escapes this call, though the process panic hook still sees
/// it first.
pub async fn execute_guarded<J>(job: &J, ctx: JobContext) -> Result<(), JobFailure>
where
    J: Job + ?Sized,
{
    match AssertUnwindSafe(job.run(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(JobFailure::Failed(err)),
        Err(payload) => Err(JobFailure::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Some(s.clone())
    } else if let Some(err) = payload.downcast_ref::<JobError>() {
        Some(err.to_string())
    } else {
        payload
            .downcast_ref::<Box<dyn std::error::Error + Send + Sync>>()
            .map(|err| err.to_string())
    }
}
