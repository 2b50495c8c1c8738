//! cadence - a small recurring-job scheduler.
//!
//! Register named [`Job`]s with [`Timer`]s on a [`Scheduler`], then call
//! [`Scheduler::start`] with a cancellation token. Every job runs in its own
//! loop; a shared admission gate caps how many run at once, and a failing or
//! panicking job never disturbs the others.
//!
//! A contained panic is reported once on the [`EventBus`] as
//! [`Event::JobRecovered`]. The process panic hook still runs when the job
//! panics, so the default hook also prints the panic to stderr; install a
//! quieter hook with [`std::panic::set_hook`] if that output is unwanted.
//!
//! ```no_run
//! use cadence::{JobError, Schedule, Scheduler, every, job_fn};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(4)?;
//! scheduler.schedule(
//!     every(Duration::from_secs(30)),
//!     job_fn("heartbeat", |_ctx| async { Ok::<(), JobError>(()) }),
//! )?;
//! scheduler.schedule(
//!     Schedule::new("0 2 * * *")?,
//!     job_fn("nightly", |_ctx| async { Ok::<(), JobError>(()) }),
//! )?;
//!
//! let token = CancellationToken::new();
//! let stop = token.clone();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     stop.cancel();
//! });
//! scheduler.start(token).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod extensions;
pub mod registry;
pub mod scheduler;
pub mod testing;

pub use config::{ConfigError, SchedulerConfig, SchedulerConfigBuilder, YamlLoader};
pub use core::job::{ContextError, FnJob, Job, JobContext, JobError, job_fn};
pub use core::schedule::{Schedule, ScheduleError, parse_duration};
pub use core::timer::{Clock, Every, SystemClock, Timer, every};
pub use core::types::RunId;
pub use events::{Event, EventBus, EventHandler, EventLevel, TracingHandler};
pub use execution::{
    AdmissionGate, CommandJob, CommandJobBuilder, CommandOutput, GateError, GatePermit,
    JobFailure, execute_guarded,
};
pub use extensions::JobExt;
pub use registry::{InMemoryJobStore, JobEntry, JobStore, RegistryError};
pub use scheduler::{Scheduler, SchedulerError, time_until_next_run};
