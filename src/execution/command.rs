//! External command job.
//!
//! [`CommandJob`] runs a program on every tick. It is what the YAML
//! configuration builds for each `jobs:` entry, and can be scheduled directly:
//!
//! ```rust
//! use cadence::CommandJob;
//! use std::time::Duration;
//!
//! let job = CommandJob::builder("pg_dump")
//!     .name("nightly-dump")
//!     .args(["--format", "custom", "warehouse"])
//!     .env("PGHOST", "db.internal")
//!     .working_dir("/var/backups")
//!     .timeout(Duration::from_secs(900))
//!     .build();
//!
//! assert_eq!(job.program(), "pg_dump");
//! ```
//!
//! A non-zero exit yields [`JobError::CommandFailed`], an elapsed timeout
//! yields [`JobError::Timeout`], and a program that cannot be spawned yields
//! [`JobError::ExecutionFailed`]. When the scheduler is cancelled while the
//! child is running, the child is killed and the run ends with
//! [`JobError::Cancelled`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::job::{Job, JobContext, JobError};

/// Captured result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

/// A job that executes an external command.
#[derive(Debug)]
pub struct CommandJob {
    name: String,
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    last_output: Mutex<Option<CommandOutput>>,
}

impl CommandJob {
    /// Create a new builder for a command job.
    pub fn builder(program: impl Into<String>) -> CommandJobBuilder {
        CommandJobBuilder::new(program)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Output of the most recent invocation that ran to exit.
    pub fn last_output(&self) -> Option<CommandOutput> {
        self.last_output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn record(&self, output: CommandOutput) {
        *self
            .last_output
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(output);
    }
}

#[async_trait]
impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let mut cmd = self.command();
        let child = cmd.output();

        // Dropping the output future kills the child (kill_on_drop).
        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(JobError::Cancelled),
            output = async {
                let result = match self.timeout {
                    Some(limit) => timeout(limit, child)
                        .await
                        .map_err(|_| JobError::Timeout(limit))?,
                    None => child.await,
                };
                result.map_err(|e| JobError::ExecutionFailed(format!("{}: {e}", self.program)))
            } => output?,
        };

        let captured = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        tracing::debug!(
            job = %self.name,
            run_id = %ctx.run_id(),
            exit_code = captured.exit_code,
            stdout = %captured.stdout.trim_end(),
            "command exited"
        );

        let result = if output.status.success() {
            Ok(())
        } else {
            Err(JobError::CommandFailed {
                code: captured.exit_code,
                stderr: captured.stderr.trim_end().to_string(),
            })
        };
        self.record(captured);
        result
    }
}

/// Builder for [`CommandJob`].
#[derive(Debug, Clone)]
pub struct CommandJobBuilder {
    name: Option<String>,
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandJobBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: None,
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the job name. Defaults to the program.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables; later keys overwrite earlier ones.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn build(self) -> CommandJob {
        let name = self.name.unwrap_or_else(|| self.program.clone());
        CommandJob {
            name,
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
            last_output: Mutex::new(None),
        }
    }
}
