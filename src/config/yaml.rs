//! YAML configuration parsing.
//!
//! A single file describes the scheduler and its command jobs:
//!
//! ```yaml
//! max_concurrent_jobs: 4
//! timezone: UTC
//! jobs:
//!   - name: heartbeat
//!     schedule: "@every 10s"
//!     command: echo
//!     args: ["alive"]
//!     timeout: 30s
//!   - name: nightly
//!     schedule: { cron: "0 2 * * *", timezone: "Europe/Berlin" }
//!     command: ./backup.sh
//!     env: { TARGET: s3 }
//!     circuit_breaker: { max_consecutive_failures: 3 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::schedule::{Schedule, ScheduleError, parse_duration};
use crate::scheduler::SchedulerError;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A job's schedule or timeout could not be parsed.
    #[error("job '{job}': {source}")]
    InvalidSchedule {
        job: String,
        #[source]
        source: ScheduleError,
    },

    /// Building the scheduler failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Admission gate capacity.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Default timezone for schedules that do not name one.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            timezone: None,
            jobs: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Jobs with `enabled: true`.
    pub fn enabled_jobs(&self) -> impl Iterator<Item = &JobConfig> {
        self.jobs.iter().filter(|job| job.enabled)
    }

    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// One command job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name.
    pub name: String,
    pub schedule: ScheduleConfig,
    /// Program to execute.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    /// Duration string such as `30s` or `5m`.
    pub timeout: Option<String>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Disabled jobs are parsed and validated but never scheduled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl JobConfig {
    /// Parse the job's schedule, falling back to `default_timezone`, then UTC.
    pub fn build_schedule(&self, default_timezone: Option<&str>) -> Result<Schedule, ConfigError> {
        let timezone = self
            .schedule
            .timezone()
            .or(default_timezone)
            .unwrap_or("UTC");
        Schedule::with_timezone(self.schedule.expression(), timezone).map_err(|source| {
            ConfigError::InvalidSchedule {
                job: self.name.clone(),
                source,
            }
        })
    }

    /// Parse the timeout, if any.
    pub fn timeout_duration(&self) -> Result<Option<Duration>, ConfigError> {
        self.timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|source| ConfigError::InvalidSchedule {
                job: self.name.clone(),
                source,
            })
    }
}

/// Schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleConfig {
    /// Cron expression, shortcut or `@every` interval.
    Simple(String),
    /// Detailed schedule with timezone.
    Detailed {
        cron: String,
        timezone: Option<String>,
    },
}

impl ScheduleConfig {
    /// The schedule expression.
    pub fn expression(&self) -> &str {
        match self {
            ScheduleConfig::Simple(s) => s,
            ScheduleConfig::Detailed { cron, .. } => cron,
        }
    }

    /// Get the timezone, if specified.
    pub fn timezone(&self) -> Option<&str> {
        match self {
            ScheduleConfig::Simple(_) => None,
            ScheduleConfig::Detailed { timezone, .. } => timezone.as_deref(),
        }
    }
}

/// Stop the scheduler after a job fails this many times in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub max_consecutive_failures: u32,
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate a configuration file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<SchedulerConfig, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse_str(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse_str(yaml: &str) -> Result<SchedulerConfig, ConfigError> {
        let config: SchedulerConfig = serde_yaml::from_str(yaml)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a parsed configuration.
    pub fn validate(config: &SchedulerConfig) -> Result<(), ConfigError> {
        if config.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_concurrent_jobs cannot be zero".into(),
            ));
        }

        if let Some(tz) = &config.timezone
            && tz.parse::<chrono_tz::Tz>().is_err()
        {
            return Err(ConfigError::InvalidConfig(format!("unknown timezone: {tz}")));
        }

        let mut names = HashSet::new();
        for job in &config.jobs {
            if job.name.trim().is_empty() {
                return Err(ConfigError::MissingField("name".into()));
            }
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate job name: {}",
                    job.name
                )));
            }
            if job.command.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("{}.command", job.name)));
            }
            if job.circuit_breaker.is_some_and(|cb| cb.max_consecutive_failures == 0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "job '{}': max_consecutive_failures cannot be zero",
                    job.name
                )));
            }

            job.build_schedule(config.timezone.as_deref())?;
            job.timeout_duration()?;
        }

        Ok(())
    }
}
