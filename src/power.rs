use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use config_model::ShutdownConfig;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::PowerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerMode {
    Shutdown,
    Hibernate,
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shutdown => "shutdown",
            Self::Hibernate => "hibernate",
        })
    }
}

/// Executes a power-down. Implementations never fail outright: every
/// problem is folded into the returned [`PowerActionResult`].
#[allow(async_fn_in_trait)]
pub trait PowerController {
    async fn execute(&self, mode: PowerMode) -> PowerActionResult;
}

#[derive(Debug, Clone, Default)]
pub struct PowerPlan {
    pub primary_script: Option<PathBuf>,
    pub shutdown_command: Vec<String>,
    pub hibernate_command: Vec<String>,
    pub command_timeout: Option<Duration>,
    pub dry_run: bool,
}

impl PowerPlan {
    pub fn from_config(cfg: &ShutdownConfig) -> Self {
        Self {
            primary_script: cfg.power.primary_script.clone(),
            shutdown_command: cfg.power.shutdown_command.clone(),
            hibernate_command: cfg.power.hibernate_command.clone(),
            command_timeout: cfg.command_timeout,
            dry_run: cfg.dry_run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn from_argv(argv: &[String], label: &str) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("{label} must not be empty");
        };
        if program.trim().is_empty() {
            bail!("{label} must name a program");
        }
        Ok(Self::new(program.clone(), args.iter().cloned()))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Process boundary of the power chain.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput>;
}

/// Runs commands as child processes, optionally bounded by a timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child).await {
                Ok(result) => result,
                Err(_) => bail!(
                    "`{command}` timed out after {}",
                    humantime::format_duration(limit)
                ),
            },
            None => child.await,
        }
        .with_context(|| format!("failed to spawn `{command}`"))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandExecution {
    fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.exit_code, stderr.is_empty()) {
            (Some(code), true) => format!("exited with code {code}"),
            (Some(code), false) => format!("exited with code {code}: {stderr}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => stderr.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowerActionResult {
    pub mode: PowerMode,
    pub succeeded: bool,
    pub used_fallback: bool,
    pub error_detail: Option<String>,
    /// Every command run for this action, in order.
    pub attempts: Vec<CommandExecution>,
}

impl PowerActionResult {
    fn new(mode: PowerMode) -> Self {
        Self {
            mode,
            succeeded: false,
            used_fallback: false,
            error_detail: None,
            attempts: Vec::new(),
        }
    }
}

/// Shuts down through an optional primary script with the OS command as
/// fallback, or hibernates through the OS command alone.
#[derive(Debug)]
pub struct SystemPowerController<R = ProcessRunner> {
    primary_script: Option<PathBuf>,
    shutdown_command: CommandLine,
    hibernate_command: CommandLine,
    dry_run: bool,
    runner: R,
}

impl SystemPowerController<ProcessRunner> {
    pub fn new(plan: PowerPlan) -> Result<Self> {
        let runner = ProcessRunner::new(plan.command_timeout);
        Self::with_runner(plan, runner)
    }
}

impl<R: CommandRunner> SystemPowerController<R> {
    pub fn with_runner(plan: PowerPlan, runner: R) -> Result<Self> {
        let PowerPlan {
            primary_script,
            shutdown_command,
            hibernate_command,
            command_timeout: _,
            dry_run,
        } = plan;

        if let Some(script) = &primary_script
            && script.as_os_str().is_empty()
        {
            return Err(anyhow!("primary script path must not be blank"));
        }

        Ok(Self {
            primary_script,
            shutdown_command: CommandLine::from_argv(&shutdown_command, "shutdown command")?,
            hibernate_command: CommandLine::from_argv(&hibernate_command, "hibernate command")?,
            dry_run,
            runner,
        })
    }

    async fn shutdown(&self) -> PowerActionResult {
        let mut report = PowerActionResult::new(PowerMode::Shutdown);

        match &self.primary_script {
            Some(script) => match self.run_primary(script, &mut report).await {
                Ok(()) => {
                    info!(script = %script.display(), "primary shutdown script succeeded");
                    report.succeeded = true;
                    return report;
                }
                Err(err) => {
                    warn!(error = %err, "falling back to the OS shutdown command");
                }
            },
            None => debug!("no primary shutdown script configured"),
        }

        report.used_fallback = true;
        self.run_final(&self.shutdown_command, &mut report).await;
        report
    }

    async fn hibernate(&self) -> PowerActionResult {
        let mut report = PowerActionResult::new(PowerMode::Hibernate);
        self.run_final(&self.hibernate_command, &mut report).await;
        report
    }

    async fn run_primary(
        &self,
        script: &Path,
        report: &mut PowerActionResult,
    ) -> Result<(), PowerError> {
        if !script.exists() {
            return Err(PowerError::PrimaryActionMissing(script.to_path_buf()));
        }

        let command = CommandLine::new(script, Vec::<String>::new());
        let execution = self.run_command(&command).await;
        let outcome = if execution.success {
            Ok(())
        } else {
            Err(PowerError::PrimaryActionFailed {
                path: script.to_path_buf(),
                detail: execution.failure_detail(),
            })
        };
        report.attempts.push(execution);
        outcome
    }

    // Last link of the chain: nothing left to fall back to.
    async fn run_final(&self, command: &CommandLine, report: &mut PowerActionResult) {
        let execution = self.run_command(command).await;
        if execution.success {
            info!(mode = %report.mode, command = %command, "power command succeeded");
            report.succeeded = true;
        } else {
            let err = PowerError::FallbackActionFailed {
                command: command.to_string(),
                detail: execution.failure_detail(),
            };
            error!(mode = %report.mode, error = %err, "power action failed");
            report.error_detail = Some(err.to_string());
        }
        report.attempts.push(execution);
    }

    async fn run_command(&self, command: &CommandLine) -> CommandExecution {
        if self.dry_run {
            info!(command = %command, "dry run; not executing power command");
            return CommandExecution {
                command: command.to_string(),
                success: true,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
            };
        }

        debug!(command = %command, "running power command");
        match self.runner.run(command).await {
            Ok(output) => CommandExecution {
                command: command.to_string(),
                success: output.success(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(err) => CommandExecution {
                command: command.to_string(),
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("{err:#}"),
            },
        }
    }
}

impl<R: CommandRunner> PowerController for SystemPowerController<R> {
    async fn execute(&self, mode: PowerMode) -> PowerActionResult {
        match mode {
            PowerMode::Shutdown => self.shutdown().await,
            PowerMode::Hibernate => self.hibernate().await,
        }
    }
}
