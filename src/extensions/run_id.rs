//! Run labels injected into the job context.
//!
//! ```
//! use cadence::extensions::{JobExt, RUN_ID_KEY};
//! use cadence::{JobContext, JobError, job_fn};
//!
//! let job = job_fn("sync", |ctx: JobContext| async move {
//!     let label: String = ctx.get(RUN_ID_KEY)?;
//!     assert!(label.starts_with("sync-"));
//!     Ok::<(), JobError>(())
//! })
//! .with_run_id();
//! # let _ = job;
//! ```

use std::sync::Arc;
use uuid::Uuid;

use super::context::ContextBuilder;

/// Context key the run label is stored under.
pub const RUN_ID_KEY: &str = "run_id";

/// Default run label: `"{job}-{uuid}"`.
pub fn uuid_run_id(job: &str) -> String {
    format!("{job}-{}", Uuid::new_v4())
}

/// A context builder storing `generator(job_name)` under [`RUN_ID_KEY`].
pub fn run_id_builder<G>(generator: G) -> ContextBuilder
where
    G: Fn(&str) -> String + Send + Sync + 'static,
{
    Arc::new(move |mut ctx| {
        let label = generator(ctx.job_name());
        if let Err(e) = ctx.insert(RUN_ID_KEY, label) {
            tracing::warn!(job = %ctx.job_name(), error = %e, "failed to store run id");
        }
        ctx
    })
}
