//! cadence - a small recurring-job scheduler.
//!
//! Usage:
//!   cadence run <config>        Run every enabled job until Ctrl+C
//!   cadence validate <config>   Validate the configuration without running
//!   cadence list <config>       List the configured jobs
//!   cadence next <config>       Show upcoming fire times per job

use cadence::{EventBus, SchedulerConfig, SchedulerConfigBuilder, TracingHandler, YamlLoader};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// cadence - run commands on recurring schedules
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Override max_concurrent_jobs from the file
        #[arg(short = 'j', long)]
        max_jobs: Option<usize>,

        /// Also log every lifecycle event with its full details
        #[arg(long)]
        events: bool,
    },

    /// Validate the configuration without running
    Validate {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// List all configured jobs
    List {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Print the next fire times of every enabled job
    Next {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Number of occurrences per job (at most 1000)
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            max_jobs,
            events,
        } => run_scheduler(config, max_jobs, events).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::List { config } => list_jobs(config)?,
        Commands::Next { config, count } => show_next_runs(config, count)?,
    }

    Ok(())
}

async fn run_scheduler(
    path: PathBuf,
    max_jobs: Option<usize>,
    log_events: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading configuration from: {}", path.display());

    let mut config = YamlLoader::load_file(&path)?;
    if let Some(max) = max_jobs {
        config.max_concurrent_jobs = max;
    }

    let enabled = config.enabled_jobs().count();
    if enabled == 0 {
        warn!("No enabled jobs in {}", path.display());
        return Ok(());
    }
    info!(
        "Loaded {} job(s), at most {} running at once",
        enabled, config.max_concurrent_jobs
    );

    let event_bus = EventBus::new();
    if log_events {
        event_bus.register(Arc::new(TracingHandler)).await;
    }

    let token = CancellationToken::new();
    let scheduler = SchedulerConfigBuilder::new(config)
        .with_event_bus(event_bus)
        .with_shutdown_token(token.clone())
        .build()?;

    info!("Starting scheduler, press Ctrl+C to stop");

    let run = scheduler.start(token.clone());
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            result?;
            info!("Scheduler stopped");
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down, waiting for running jobs...");
            token.cancel();
        }
    }

    run.await?;
    info!("Goodbye!");
    Ok(())
}

fn validate_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating: {}", path.display());

    match YamlLoader::load_file(&path) {
        Ok(config) => {
            info!("All {} job(s) are valid:", config.jobs.len());
            for job in &config.jobs {
                info!("  - {}: OK", job.name);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

fn list_jobs(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_file(&path)?;

    if config.jobs.is_empty() {
        println!("No jobs found in {}", path.display());
        return Ok(());
    }

    println!("Jobs in {}:", path.display());
    println!("  Max concurrent jobs: {}", config.max_concurrent_jobs);
    println!();

    for job in &config.jobs {
        let schedule = job.build_schedule(config.timezone.as_deref())?;
        println!("Name: {}", job.name);
        println!("  Enabled: {}", job.enabled);
        println!("  Schedule: {} ({})", schedule.expression(), schedule.timezone());
        if job.args.is_empty() {
            println!("  Command: {}", job.command);
        } else {
            println!("  Command: {} {}", job.command, job.args.join(" "));
        }
        if let Some(timeout) = &job.timeout {
            println!("  Timeout: {}", timeout);
        }
        if let Some(breaker) = job.circuit_breaker {
            println!(
                "  Circuit breaker: {} consecutive failure(s)",
                breaker.max_consecutive_failures
            );
        }
        println!();
    }

    Ok(())
}

const MAX_OCCURRENCES: usize = 1000;

fn show_next_runs(path: PathBuf, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config: SchedulerConfig = YamlLoader::load_file(&path)?;
    let now = Utc::now();

    for job in config.enabled_jobs() {
        let schedule = job.build_schedule(config.timezone.as_deref())?;
        println!("{} ({}):", job.name, schedule.expression());
        let upcoming = schedule.upcoming(now, count.min(MAX_OCCURRENCES));
        if upcoming.is_empty() {
            println!("  no further occurrences");
        }
        for at in upcoming {
            println!("  {}", at.to_rfc3339());
        }
    }

    Ok(())
}
