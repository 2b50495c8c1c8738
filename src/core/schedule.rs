//! Expression-based timers.
//!
//! [`Schedule`] parses cron expressions (5, 6 or 7 fields), the usual
//! shortcuts (`@hourly`, `@daily`, ...) and interval expressions
//! (`@every 1h30m`) into a [`Timer`], optionally evaluated in a timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::timer::{Every, Timer};

/// Errors that can occur when parsing or evaluating schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The expression has no occurrence after the requested instant.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

#[derive(Clone)]
enum ScheduleKind {
    Cron(Box<CronSchedule>),
    Interval(Every),
}

/// A parsed schedule expression usable as a [`Timer`].
#[derive(Clone)]
pub struct Schedule {
    expression: String,
    timezone: Tz,
    kind: ScheduleKind,
}

impl Schedule {
    /// Parse an expression evaluated in UTC.
    ///
    /// Accepted forms:
    /// - 5-field cron: `minute hour day month weekday`
    /// - 6-field cron: `second minute hour day month weekday`
    /// - 7-field cron: 6-field plus `year`
    /// - Shortcuts: `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
    ///   `@midnight`, `@hourly`
    /// - Intervals: `@every 5m`, `@every 1h30m`, `@every 500ms`
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Parse an expression whose cron fields are interpreted in `timezone`.
    pub fn with_timezone(
        expression: impl Into<String>,
        timezone: impl AsRef<str>,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let timezone_name = timezone.as_ref();
        let timezone = timezone_name
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone_name.to_string()))?;

        let kind = parse_expression(&expression)?;

        Ok(Self {
            expression,
            timezone,
            kind,
        })
    }

    /// Next occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match &self.kind {
            ScheduleKind::Cron(schedule) => schedule
                .after(&after.with_timezone(&self.timezone))
                .next()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or(ScheduleError::NoMoreOccurrences),
            ScheduleKind::Interval(every) => Ok(every.next(after)),
        }
    }

    /// Up to `n` consecutive occurrences after `after`.
    ///
    /// Stops early once the schedule is exhausted or stops advancing.
    pub fn upcoming(&self, after: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        std::iter::successors(self.next_after(after).ok(), |&current| {
            self.next_after(current).ok().filter(|next| *next > current)
        })
        .take(n)
        .collect()
    }

    /// The original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The timezone cron fields are evaluated in.
    pub fn timezone(&self) -> &str {
        self.timezone.name()
    }

    /// Whether this schedule is a fixed interval rather than a cron expression.
    pub fn is_interval(&self) -> bool {
        matches!(self.kind, ScheduleKind::Interval(_))
    }
}

impl Timer for Schedule {
    fn next(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        // An exhausted expression parks the loop until cancellation.
        self.next_after(previous)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone.name())
            .finish()
    }
}

fn parse_expression(expression: &str) -> Result<ScheduleKind, ScheduleError> {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        parse_shortcut(trimmed)
    } else {
        parse_cron(trimmed)
    }
}

fn parse_shortcut(expression: &str) -> Result<ScheduleKind, ScheduleError> {
    let lowered = expression.to_lowercase();
    match lowered.as_str() {
        "@yearly" | "@annually" => parse_cron("0 0 1 1 *"),
        "@monthly" => parse_cron("0 0 1 * *"),
        "@weekly" => parse_cron("0 0 * * SUN"),
        "@daily" | "@midnight" => parse_cron("0 0 * * *"),
        "@hourly" => parse_cron("0 * * * *"),
        s => match s.strip_prefix("@every ") {
            Some(interval) => Ok(ScheduleKind::Interval(Every::new(parse_duration(interval)?))),
            None => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        },
    }
}

fn parse_cron(expression: &str) -> Result<ScheduleKind, ScheduleError> {
    let fields = expression.split_whitespace().count();

    let normalized = match fields {
        5 => format!("0 {}", expression),
        6 | 7 => expression.to_string(),
        n => {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5, 6 or 7 fields, got {}",
                n
            )));
        }
    };

    let schedule = CronSchedule::from_str(&normalized)
        .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

    Ok(ScheduleKind::Cron(Box::new(schedule)))
}

/// Parse a compact duration such as `30s`, `5m`, `1h30m`, `2d` or `250ms`.
///
/// The total must be non-zero.
pub fn parse_duration(s: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(s.to_string());
    let input = s.trim();
    if input.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            chars.next();
        }
        let amount: u64 = digits.parse().map_err(|_| invalid())?;

        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
            unit.push(c);
            chars.next();
        }

        let part = match unit.as_str() {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "h" => Duration::from_secs(amount.saturating_mul(3_600)),
            "d" => Duration::from_secs(amount.saturating_mul(86_400)),
            _ => return Err(invalid()),
        };
        total = total.saturating_add(part);
    }

    if total.is_zero() {
        return Err(invalid());
    }

    Ok(total)
}
