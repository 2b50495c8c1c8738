//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the scheduler and its
//! command jobs.

mod builder;
mod yaml;

pub use builder::SchedulerConfigBuilder;
pub use yaml::{
    CircuitBreakerConfig, ConfigError, JobConfig, ScheduleConfig, SchedulerConfig, YamlLoader,
};
