//! External process execution with per-call timeouts.
//!
//! Every check talks to the outside world through a [`CommandRunner`].
//! The production implementation, [`SystemRunner`], spawns the child on a
//! single-threaded tokio runtime and blocks until it exits or its budget
//! expires; an expired child is killed and reported as
//! [`RunError::Timeout`], never as a raw signal.
//!
//! # Example
//!
//! ```rust,ignore
//! use commitguard::process::{CommandRunner, CommandSpec, SystemRunner};
//!
//! let runner = SystemRunner::new()?;
//! let out = runner.run(&CommandSpec::new("git").args(["diff", "--cached", "--name-only"]))?;
//! println!("{} staged", out.stdout.lines().count());
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Budget applied when a caller does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Command description
// ============================================================================

/// A fully described external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, or the script text when `shell` is set.
    pub program: String,
    /// Arguments passed verbatim (ignored in shell mode).
    pub args: Vec<String>,
    /// Working directory; inherits the current one when `None`.
    pub cwd: Option<PathBuf>,
    /// Wall-clock budget for the call.
    pub timeout: Duration,
    /// Run through the platform shell.
    ///
    /// Only for fixed, trusted command strings. Never build one from
    /// operator or repository input.
    pub shell: bool,
}

impl CommandSpec {
    /// Describe a direct (non-shell) invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
            shell: false,
        }
    }

    /// Describe a shell invocation of a fixed script.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            shell: true,
            ..Self::new(script)
        }
    }

    /// Build a spec from an argv-style list (`["python", "manage.py", "test"]`).
    ///
    /// Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone()).args(rest.iter().cloned()))
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the time budget in whole seconds (at least one second).
    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    /// The command line as it would be typed, used for matching and messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

// ============================================================================
// Command results
// ============================================================================

/// Captured outcome of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `-1` when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A zero-exit result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A non-zero result with the given stdout.
    pub fn failed(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Attach stderr text.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Whether the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
        }
    }

    /// Stderr if present, otherwise stdout.
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Why a command produced no [`CommandOutput`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    /// The child outlived its budget and was killed.
    #[error("'{command}' timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// The child could not be started (missing binary, bad cwd, ...).
    #[error("could not start '{command}': {message}")]
    Launch { command: String, message: String },
}

impl RunError {
    /// Whether this is a timeout rather than a launch failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ============================================================================
// Runner trait
// ============================================================================

/// Abstraction over process execution.
///
/// Enables testing checks and the pipeline without spawning real tools.
pub trait CommandRunner {
    /// Run a command to completion or until its timeout expires.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Timeout`] when the budget is exceeded and
    /// [`RunError::Launch`] when the process cannot be spawned. A non-zero
    /// exit status is *not* an error.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError>;

    /// Whether a tool binary can be found.
    fn is_available(&self, tool: &str) -> bool {
        is_tool_available(tool)
    }
}

/// Checks if a tool binary is available in the system PATH.
#[must_use]
pub fn is_tool_available(tool_name: &str) -> bool {
    which::which(tool_name).is_ok()
}

// ============================================================================
// System runner
// ============================================================================

/// Runs real processes, one at a time, on a private current-thread runtime.
pub struct SystemRunner {
    runtime: tokio::runtime::Runtime,
}

impl SystemRunner {
    /// Create a runner.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokio runtime cannot be built.
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let mut cmd = if spec.shell {
            shell_command(&spec.program)
        } else {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args);
            cmd
        };

        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[cfg(unix)]
fn shell_command(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[cfg(not(unix))]
fn shell_command(script: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script);
    cmd
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        let command = spec.command_line();
        let start = Instant::now();
        debug!(command = %command, timeout_secs = spec.timeout.as_secs(), "spawning");

        let result: Result<std::process::Output, RunError> = self.runtime.block_on(async {
            let child = match Self::build_command(spec).spawn() {
                Ok(child) => child,
                Err(e) => {
                    return Err(RunError::Launch {
                        command: command.clone(),
                        message: e.to_string(),
                    })
                }
            };

            // Dropping the future on timeout kills the child (kill_on_drop).
            match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(RunError::Launch {
                    command: command.clone(),
                    message: e.to_string(),
                }),
                Err(_elapsed) => Err(RunError::Timeout {
                    command: command.clone(),
                    timeout: spec.timeout,
                }),
            }
        });

        match result {
            Ok(output) => {
                let out = CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                debug!(
                    command = %command,
                    exit_code = out.exit_code,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "finished"
                );
                Ok(out)
            }
            Err(err) => {
                warn!(command = %command, error = %err, "command did not complete");
                Err(err)
            }
        }
    }
}
