//! Scheduler builder from YAML configuration.
//!
//! Turns a validated [`SchedulerConfig`] into a ready [`Scheduler`] with one
//! [`CommandJob`] per enabled job.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::job::Job;
use crate::core::timer::Clock;
use crate::events::EventBus;
use crate::execution::CommandJob;
use crate::extensions::{JobExt, consecutive_failures};
use crate::registry::JobEntry;
use crate::scheduler::Scheduler;

use super::yaml::{ConfigError, JobConfig, SchedulerConfig, YamlLoader};

/// Builder for creating a [`Scheduler`] from configuration.
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
    shutdown: CancellationToken,
}

impl SchedulerConfigBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: None,
            event_bus: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Load, validate and wrap a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        YamlLoader::load_file(path).map(Self::new)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Token cancelled by tripped circuit breakers.
    ///
    /// Pass the same token to [`Scheduler::start`] so a trip halts the
    /// scheduler.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate the configuration and register every enabled job.
    pub fn build(self) -> Result<Scheduler, ConfigError> {
        YamlLoader::validate(&self.config)?;

        let mut scheduler = Scheduler::new(self.config.max_concurrent_jobs)?;
        if let Some(clock) = self.clock {
            scheduler = scheduler.with_clock(clock);
        }
        if let Some(event_bus) = self.event_bus {
            scheduler = scheduler.with_event_bus(event_bus);
        }

        let default_tz = self.config.timezone.as_deref();
        for job_config in &self.config.jobs {
            if !job_config.enabled {
                tracing::info!(job = %job_config.name, "skipping disabled job");
                continue;
            }
            let entry = Self::build_entry(job_config, default_tz, &self.shutdown)?;
            scheduler.schedule_entry(entry)?;
        }

        Ok(scheduler)
    }

    /// Build the registry entry for one job.
    pub fn build_entry(
        config: &JobConfig,
        default_timezone: Option<&str>,
        shutdown: &CancellationToken,
    ) -> Result<JobEntry, ConfigError> {
        let schedule = config.build_schedule(default_timezone)?;
        let command = Self::build_command(config)?;

        let job: Arc<dyn Job> = match config.circuit_breaker {
            Some(breaker) => Arc::new(command.with_circuit_breaker(
                consecutive_failures(breaker.max_consecutive_failures),
                shutdown.clone(),
            )),
            None => Arc::new(command),
        };

        Ok(JobEntry::from_shared(Arc::new(schedule), job))
    }

    /// Build the command job for one job.
    pub fn build_command(config: &JobConfig) -> Result<CommandJob, ConfigError> {
        let mut builder = CommandJob::builder(&config.command)
            .name(&config.name)
            .args(&config.args)
            .envs(&config.env);

        if let Some(dir) = &config.working_dir {
            builder = builder.working_dir(dir);
        }
        if let Some(timeout) = config.timeout_duration()? {
            builder = builder.timeout(timeout);
        }

        Ok(builder.build())
    }
}
