//! Timers and clocks.
//!
//! A [`Timer`] maps the previous fire instant of a job to the next one. The
//! scheduler never inspects how a timer computes its answer, so fixed
//! intervals, cron expressions and custom policies are interchangeable.
//!
//! A [`Clock`] supplies "now". Production code uses [`SystemClock`]; tests
//! inject their own to make timing deterministic.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Computes the next execution instant of a job.
///
/// Implementations should be monotonic: for a non-decreasing `previous`, the
/// returned instant should not move backwards. Returning an instant at or
/// before "now" is allowed and makes the job fire immediately.
pub trait Timer: Send + Sync {
    /// Next fire instant after `previous`.
    fn next(&self, previous: DateTime<Utc>) -> DateTime<Utc>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-interval timer: `next(t) == t + interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Every {
    interval: Duration,
}

impl Every {
    /// Create a timer firing every `interval`.
    ///
    /// A zero interval is accepted; such a job re-fires as soon as it
    /// finishes.
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Shorthand for [`Every::new`].
pub const fn every(interval: Duration) -> Every {
    Every::new(interval)
}

impl Timer for Every {
    fn next(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|step| previous.checked_add_signed(step))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
