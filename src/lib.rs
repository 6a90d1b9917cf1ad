//! commitguard - pre-commit validation pipeline
//!
//! Runs an ordered set of quality and security checks over a project
//! before a commit is accepted. Failures can be repaired automatically
//! (after confirmation), tolerated (non-strict mode) or block the commit
//! (strict mode).
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading, validation and the run policy
//! - [`process`] - External command execution with timeouts
//! - [`confirm`] - Interactive and unattended yes/no gates
//! - [`checks`] - The check trait, results, registry and the six checks
//! - [`pipeline`] - The orchestrator state machine
//! - [`report`] - Run report, console and JSON output
//! - [`error`] - Error taxonomy and exit codes
//! - [`testing`] - Mocks for deterministic tests
//!
//! # Example
//!
//! ```rust,ignore
//! use commitguard::{confirmer_for, GuardConfig, Overrides, Pipeline, PromptStream, SystemRunner};
//!
//! let config = GuardConfig::load("scripts/pre-commit-config.json".as_ref())?;
//! let policy = config.policy(&Overrides { from_hook: true, ..Overrides::default() });
//! let mut pipeline = Pipeline::from_config(
//!     ".",
//!     &config,
//!     policy,
//!     None,
//!     Box::new(SystemRunner::new()?),
//!     confirmer_for(&policy, PromptStream::Stdout),
//! );
//! let report = pipeline.run()?;
//! std::process::exit(report.exit_code());
//! ```

pub mod checks;
pub mod config;
pub mod confirm;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod testing;

// Re-export commonly used types
pub use error::{GuardError, Result, EXIT_INTERRUPTED};

pub use config::{GuardConfig, Overrides, RunPolicy, DEFAULT_CONFIG_PATH};

pub use process::{CommandOutput, CommandRunner, CommandSpec, RunError, SystemRunner};

pub use confirm::{confirmer_for, Confirm, PromptConfirmer, PromptStream, UnattendedConfirmer};

pub use checks::{
    build_checks, Check, CheckContext, CheckKind, CheckResult, FixOutcome, FrameworkCheck,
    GitMetaCheck, LinterCheck, SecurityCheck, SensitiveFilesCheck, TestSuiteCheck,
};

pub use pipeline::{Pipeline, PipelineState, PipelineStatus};

pub use report::{CheckOutcome, ConsoleReporter, PipelineReport};

pub use testing::{MockRunner, ScriptedConfirmer, StubCheck};
