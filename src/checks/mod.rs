//! Check implementations and the fixed check registry.
//!
//! Each check inspects one concern of the tree and returns a
//! [`CheckResult`]. Some checks also carry a fixer; the pipeline decides
//! whether to call it and always re-evaluates afterwards.
//!
//! # Available Checks
//!
//! | Key | Check | Fixable |
//! |-----|-------|---------|
//! | `linter` | [`LinterCheck`] - style checker, formatter + import sorter as fix | Yes |
//! | `tests` | [`TestSuiteCheck`] - project test suite | No |
//! | `framework` | [`FrameworkCheck`] - framework config, deploy pass, migration drift | Migrations only |
//! | `security` | [`SecurityCheck`] - static, dependency, secret and pattern scans | No |
//! | `files` | [`SensitiveFilesCheck`] - forbidden files and ignore rules | No |
//! | `git` | [`GitMetaCheck`] - staged files and commit convention | No |

pub mod files;
pub mod framework;
pub mod git;
pub mod linter;
pub mod security;
pub mod test_suite;

pub use files::SensitiveFilesCheck;
pub use framework::FrameworkCheck;
pub use git::GitMetaCheck;
pub use linter::LinterCheck;
pub use security::SecurityCheck;
pub use test_suite::TestSuiteCheck;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::{GuardConfig, ToolsConfig};
use crate::confirm::Confirm;
use crate::error::{GuardError, Result};
use crate::pipeline::PipelineState;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, RunError};

/// Detail lines kept per result; display shows a shorter prefix.
pub const MAX_STORED_DETAILS: usize = 50;

// ============================================================================
// Check Result
// ============================================================================

/// Outcome of evaluating one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Stable check name.
    pub name: String,
    pub passed: bool,
    /// One-line summary.
    pub message: String,
    /// Identity of the applicable fix, if any.
    pub fix: Option<String>,
    /// Ordered detail lines, at most [`MAX_STORED_DETAILS`].
    ///
    /// Advisory only when `passed` is true.
    pub details: Vec<String>,
    /// The check repaired the tree itself, after confirmation, before passing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repaired: bool,
}

impl CheckResult {
    /// Create a passing result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            fix: None,
            details: Vec::new(),
            repaired: false,
        }
    }

    /// Create a failing result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(name, message)
        }
    }

    /// Mark the failure as repairable by the named fix.
    #[must_use]
    pub fn fixable(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    /// Mark a passing result as obtained by repairing the tree in place.
    #[must_use]
    pub fn repaired(mut self) -> Self {
        self.repaired = true;
        self
    }

    /// Append detail lines, keeping the stored list bounded.
    #[must_use]
    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for detail in details {
            self.push_detail(detail);
        }
        self
    }

    /// Append one detail line.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.push_detail(detail);
        self
    }

    fn push_detail(&mut self, detail: impl Into<String>) {
        if self.details.len() < MAX_STORED_DETAILS {
            self.details.push(detail.into());
        }
    }

    /// Whether an automated fix applies.
    #[must_use]
    pub fn can_fix(&self) -> bool {
        self.fix.is_some()
    }
}

// ============================================================================
// Fix Outcome
// ============================================================================

/// One remediation sub-step (formatter, import sorter, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStep {
    pub name: String,
    pub succeeded: bool,
    pub note: Option<String>,
}

/// What a fixer did.
///
/// A fix counts as attempted when at least one step succeeded; the pipeline
/// re-evaluates the check to find out whether the problem is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub steps: Vec<FixStep>,
}

impl FixOutcome {
    /// Record a step.
    pub fn step(&mut self, name: impl Into<String>, succeeded: bool, note: Option<String>) {
        self.steps.push(FixStep {
            name: name.into(),
            succeeded,
            note,
        });
    }

    /// Record a step from a command result.
    pub fn step_from(&mut self, name: &str, result: &std::result::Result<CommandOutput, RunError>) {
        match result {
            Ok(out) if out.success() => self.step(name, true, None),
            Ok(out) => self.step(
                name,
                false,
                Some(format!("exited with status {}", out.exit_code)),
            ),
            Err(e) => self.step(name, false, Some(e.to_string())),
        }
    }

    /// At least one step succeeded.
    #[must_use]
    pub fn attempted(&self) -> bool {
        self.steps.iter().any(|s| s.succeeded)
    }

    /// Some steps succeeded and some failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.attempted() && self.steps.iter().any(|s| !s.succeeded)
    }

    /// `black: ok, isort: failed (exited with status 1)`
    #[must_use]
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return "no remediation step available".to_string();
        }
        self.steps
            .iter()
            .map(|s| match (&s.note, s.succeeded) {
                (_, true) => format!("{}: ok", s.name),
                (Some(note), false) => format!("{}: failed ({})", s.name, note),
                (None, false) => format!("{}: failed", s.name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ============================================================================
// Check Context
// ============================================================================

/// Everything a check may touch while it runs.
pub struct CheckContext<'a> {
    /// Project root; working directory of every command.
    pub root: &'a Path,
    pub runner: &'a dyn CommandRunner,
    pub confirmer: &'a mut dyn Confirm,
    pub state: &'a mut PipelineState,
    pub tools: &'a ToolsConfig,
}

impl CheckContext<'_> {
    /// Run a command in the project root.
    pub fn run(&self, spec: CommandSpec) -> std::result::Result<CommandOutput, RunError> {
        self.runner.run(&spec.current_dir(self.root))
    }

    /// Ask the operator (or the unattended default).
    ///
    /// # Errors
    ///
    /// Propagates [`GuardError::OperatorAbort`].
    pub fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.confirmer.confirm(prompt)
    }

    /// Record a non-blocking warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.state.warn(warning);
    }

    /// Make sure `tool` is installed, offering a one-time install.
    ///
    /// Returns `Ok(false)` when the tool stays unavailable; the caller turns
    /// that into a failed result.
    ///
    /// # Errors
    ///
    /// Only an operator abort during the install prompt escapes.
    pub fn ensure_tool(&mut self, tool: &str) -> Result<bool> {
        if self.runner.is_available(tool) {
            return Ok(true);
        }

        warn!(tool, "tool not installed");
        if !self.tools.auto_install || !self.state.offer_install(tool) {
            return Ok(false);
        }

        if !self.confirm(&format!("   {} is not installed. Install it?", tool))? {
            return Ok(false);
        }

        let Some(spec) = CommandSpec::from_argv(&self.tools.install_command) else {
            return Ok(false);
        };
        let spec = spec.arg(tool).timeout_secs(self.tools.install_timeout_secs);

        match self.run(spec) {
            Ok(out) if out.success() => {
                info!(tool, "tool installed");
                Ok(true)
            }
            Ok(out) => {
                warn!(tool, exit_code = out.exit_code, "tool install failed");
                self.warn(format!("Installing {} failed: {}", tool, first_line(out.diagnostic())));
                Ok(false)
            }
            Err(e) => {
                warn!(tool, error = %e, "tool install failed");
                self.warn(format!("Installing {} failed: {}", tool, e));
                Ok(false)
            }
        }
    }
}

// ============================================================================
// Check Trait
// ============================================================================

/// One named validation unit.
pub trait Check {
    /// Stable display name, used in `fixes_applied` and error summaries.
    fn name(&self) -> &str;

    /// Inspect the tree.
    ///
    /// Tool and process failures become a failed result.
    ///
    /// # Errors
    ///
    /// Only [`GuardError::OperatorAbort`] escapes.
    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult>;

    /// Whether this check carries a fixer.
    fn has_fixer(&self) -> bool {
        false
    }

    /// Attempt remediation of the last failure.
    ///
    /// # Errors
    ///
    /// Only [`GuardError::OperatorAbort`] escapes.
    fn fix(&self, _ctx: &mut CheckContext<'_>) -> Result<FixOutcome> {
        Ok(FixOutcome::default())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The canonical checks, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Linter,
    Tests,
    Framework,
    Security,
    Files,
    Git,
}

impl CheckKind {
    /// All checks in execution order.
    pub const ALL: [CheckKind; 6] = [
        CheckKind::Linter,
        CheckKind::Tests,
        CheckKind::Framework,
        CheckKind::Security,
        CheckKind::Files,
        CheckKind::Git,
    ];

    /// Configuration key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Linter => "linter",
            Self::Tests => "tests",
            Self::Framework => "framework",
            Self::Security => "security",
            Self::Files => "files",
            Self::Git => "git",
        }
    }

    /// Name shown to the operator and stored in results.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Linter => "Linter",
            Self::Tests => "Tests",
            Self::Framework => "Framework",
            Self::Security => "Security",
            Self::Files => "Files",
            Self::Git => "Git",
        }
    }

    /// Whether the configuration enables this check.
    #[must_use]
    pub fn is_enabled(self, config: &GuardConfig) -> bool {
        let checks = &config.checks;
        match self {
            Self::Linter => checks.linter.enabled,
            Self::Tests => checks.tests.enabled,
            Self::Framework => checks.framework.enabled,
            Self::Security => checks.security.enabled,
            Self::Files => checks.files.enabled,
            Self::Git => checks.git.enabled,
        }
    }

    /// Construct the check from its settings.
    #[must_use]
    pub fn build(self, config: &GuardConfig) -> Box<dyn Check> {
        let checks = &config.checks;
        match self {
            Self::Linter => Box::new(LinterCheck::new(checks.linter.clone())),
            Self::Tests => Box::new(TestSuiteCheck::new(checks.tests.clone())),
            Self::Framework => Box::new(FrameworkCheck::new(checks.framework.clone())),
            Self::Security => Box::new(SecurityCheck::new(checks.security.clone())),
            Self::Files => Box::new(SensitiveFilesCheck::new(checks.files.clone())),
            Self::Git => Box::new(GitMetaCheck::new(checks.git.clone())),
        }
    }

    /// Parse a comma-separated `--only` list into canonical order.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::UnknownCheck`] for an unrecognised name.
    pub fn parse_list(list: &str) -> Result<Vec<CheckKind>> {
        let mut kinds = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind: CheckKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds.sort();
        Ok(kinds)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for CheckKind {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let key = if lowered == "django" {
            "framework"
        } else {
            lowered.as_str()
        };
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == key)
            .ok_or_else(|| GuardError::UnknownCheck {
                name: s.to_string(),
                expected: Self::ALL.map(CheckKind::key).join(", "),
            })
    }
}

/// Enabled checks in canonical order, plus the names of those left out.
pub struct CheckSelection {
    pub checks: Vec<Box<dyn Check>>,
    pub skipped: Vec<String>,
}

/// Build the enabled checks, optionally restricted to `only`.
#[must_use]
pub fn build_checks(config: &GuardConfig, only: Option<&[CheckKind]>) -> CheckSelection {
    let mut selection = CheckSelection {
        checks: Vec::new(),
        skipped: Vec::new(),
    };

    for kind in CheckKind::ALL {
        let selected = only.is_none_or(|kinds| kinds.contains(&kind));
        if selected && kind.is_enabled(config) {
            selection.checks.push(kind.build(config));
        } else {
            selection.skipped.push(kind.display_name().to_string());
        }
    }

    selection
}

// ============================================================================
// Output helpers shared by checks
// ============================================================================

/// Non-empty, trimmed-right lines of `text`.
pub(crate) fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
}

/// First non-empty line of `text`, or a placeholder.
pub(crate) fn first_line(text: &str) -> &str {
    non_empty_lines(text).next().unwrap_or("(no output)")
}

/// Human description of a command that did not complete.
pub(crate) fn describe_run_error(what: &str, err: &RunError) -> String {
    match err {
        RunError::Timeout { timeout, .. } => {
            format!("{} timed out after {}s", what, timeout.as_secs())
        }
        RunError::Launch { message, .. } => format!("{} could not be started: {}", what, message),
    }
}
