//! Scheduler engine for recurring jobs.
//!
//! [`Scheduler`] owns registration and startup; each registered job is
//! driven by its own loop that waits for the timer, queues on the admission
//! gate, runs the job with panic isolation, and reschedules.

mod engine;
mod job_loop;

pub use engine::{Scheduler, SchedulerError};
pub use job_loop::time_until_next_run;
