//! The pipeline orchestrator.
//!
//! Runs the selected checks in order and applies the run policy to every
//! failure:
//!
//! ```text
//! Pending -> Running(i) -> Aborted(check) | Completed(success)
//! ```
//!
//! 1. evaluate; a pass moves on
//! 2. a fixable failure under auto-fix is confirmed, fixed, and evaluated
//!    again exactly once; a pass is recorded in `fixes_applied`
//! 3. strict mode stops at the first remaining failure
//! 4. otherwise the failure is appended to `errors` and the run continues
//!
//! An operator abort at any prompt escapes as
//! [`GuardError::OperatorAbort`](crate::GuardError::OperatorAbort) and skips the summary.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checks::{build_checks, Check, CheckContext, CheckKind, CheckResult};
use crate::config::{GuardConfig, RunPolicy, ToolsConfig};
use crate::confirm::Confirm;
use crate::error::Result;
use crate::process::CommandRunner;
use crate::report::{CheckOutcome, ConsoleReporter, PipelineReport};

// ============================================================================
// State
// ============================================================================

/// Where the run is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    /// Index of the check being evaluated.
    Running(usize),
    /// Strict mode stopped at this check, or the operator aborted in it.
    Aborted(String),
    /// All selected checks ran; carries the verdict.
    Completed(bool),
}

impl PipelineStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted(_) | Self::Completed(_))
    }
}

/// Accumulated run state, created once per invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    pub policy: RunPolicy,
    /// Names of checks repaired during the run, in order.
    pub fixes_applied: Vec<String>,
    pub warnings: Vec<String>,
    /// Failures tolerated in non-strict mode.
    pub errors: Vec<String>,
    #[serde(skip)]
    offered_installs: BTreeSet<String>,
}

impl PipelineState {
    #[must_use]
    pub fn new(policy: RunPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn record_fix(&mut self, check: impl Into<String>) {
        self.fixes_applied.push(check.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Returns `true` the first time a given tool is offered for install.
    pub fn offer_install(&mut self, tool: &str) -> bool {
        self.offered_installs.insert(tool.to_string())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Sequential check runner.
pub struct Pipeline {
    root: PathBuf,
    policy: RunPolicy,
    tools: ToolsConfig,
    checks: Vec<Box<dyn Check>>,
    skipped: Vec<String>,
    runner: Box<dyn CommandRunner>,
    confirmer: Box<dyn Confirm>,
    reporter: ConsoleReporter,
    status: PipelineStatus,
}

impl Pipeline {
    /// A pipeline with no checks; add them with [`Pipeline::with_check`].
    pub fn new(
        root: impl Into<PathBuf>,
        policy: RunPolicy,
        runner: Box<dyn CommandRunner>,
        confirmer: Box<dyn Confirm>,
    ) -> Self {
        Self {
            root: root.into(),
            policy,
            tools: ToolsConfig::default(),
            checks: Vec::new(),
            skipped: Vec::new(),
            runner,
            confirmer,
            reporter: ConsoleReporter::silent(),
            status: PipelineStatus::Pending,
        }
    }

    /// A pipeline with the enabled checks of `config`, optionally restricted.
    pub fn from_config(
        root: impl Into<PathBuf>,
        config: &GuardConfig,
        policy: RunPolicy,
        only: Option<&[CheckKind]>,
        runner: Box<dyn CommandRunner>,
        confirmer: Box<dyn Confirm>,
    ) -> Self {
        let selection = build_checks(config, only);
        let mut pipeline = Self::new(root, policy, runner, confirmer);
        pipeline.tools = config.tools.clone();
        pipeline.checks = selection.checks;
        pipeline.skipped = selection.skipped;
        pipeline
    }

    #[must_use]
    pub fn with_check(mut self, check: Box<dyn Check>) -> Self {
        self.checks.push(check);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: ConsoleReporter) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run every check once and produce the report.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::OperatorAbort`](crate::GuardError::OperatorAbort) when the operator interrupts a
    /// prompt; the status is then `Aborted` and no summary is printed.
    pub fn run(&mut self) -> Result<PipelineReport> {
        if self.status.is_terminal() {
            return Err(anyhow::anyhow!("pipeline already ran").into());
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = PipelineState::new(self.policy);
        let mut outcomes = Vec::with_capacity(self.checks.len());

        let Self {
            root,
            tools,
            checks,
            runner,
            confirmer,
            reporter,
            status,
            skipped,
            ..
        } = self;

        reporter.header(&state.policy, checks.len());
        let total = checks.len();
        let mut blocked = false;

        for (index, check) in checks.iter().enumerate() {
            let name = check.name().to_string();
            *status = PipelineStatus::Running(index);
            reporter.step(index + 1, total, &name);
            info!(check = %name, "evaluating");

            let mut ctx = CheckContext {
                root: root.as_path(),
                runner: &**runner,
                confirmer: &mut **confirmer,
                state: &mut state,
                tools: &*tools,
            };

            let outcome = match run_check(check.as_ref(), &mut ctx, reporter) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(check = %name, error = %e, "run aborted");
                    *status = PipelineStatus::Aborted(name);
                    return Err(e);
                }
            };

            let passed = outcome.passed;
            let message = outcome.message.clone();
            outcomes.push(outcome);
            if passed {
                continue;
            }

            if state.policy.strict_mode {
                info!(check = %name, "strict mode: stopping");
                reporter.blocked(&name);
                *status = PipelineStatus::Aborted(name);
                blocked = true;
                break;
            }
            state.record_error(format!("{}: {}", name, message));
        }

        let success = !blocked && state.errors.is_empty();
        if !blocked {
            *status = PipelineStatus::Completed(success);
        }
        debug!(success, "run finished");

        let report = PipelineReport {
            status: status.clone(),
            success,
            policy: state.policy,
            checks: outcomes,
            skipped: skipped.clone(),
            fixes_applied: state.fixes_applied,
            warnings: state.warnings,
            errors: state.errors,
            started_at,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        reporter.summary(&report);
        Ok(report)
    }
}

/// Evaluate one check and apply the fix policy to a failure.
fn run_check(
    check: &dyn Check,
    ctx: &mut CheckContext<'_>,
    reporter: &ConsoleReporter,
) -> Result<CheckOutcome> {
    let result = check.evaluate(ctx)?;
    reporter.result(&result);
    if result.passed {
        if result.repaired {
            ctx.state.record_fix(check.name());
        }
        return Ok(CheckOutcome::from_result(&result, result.repaired));
    }

    if !result.can_fix() || !ctx.state.policy.auto_fix {
        return Ok(CheckOutcome::from_result(&result, false));
    }
    if !check.has_fixer() {
        debug!(check = %result.name, "fix needs the operator; no fixer to run");
        return Ok(CheckOutcome::from_result(&result, false));
    }

    reporter.fix_offer(result.fix.as_deref().unwrap_or_default());
    if !ctx.confirm("   Apply the automatic fix?")? {
        return Ok(CheckOutcome::from_result(&result, false));
    }

    info!(check = %result.name, "applying fix");
    let fix = check.fix(ctx)?;
    if !fix.attempted() {
        reporter.fix_not_attempted(&fix);
        return Ok(CheckOutcome::from_result(&result, false));
    }
    if fix.is_partial() {
        ctx.warn(format!("{}: partial fix ({})", result.name, fix.summary()));
    }

    // The fixer changed the tree; evaluate again against the new state
    let recheck: CheckResult = check.evaluate(ctx)?;
    if recheck.passed {
        ctx.state.record_fix(check.name());
        reporter.fixed(&recheck);
        return Ok(CheckOutcome::from_result(&recheck, true));
    }

    reporter.fix_insufficient(&recheck);
    Ok(CheckOutcome::from_result(&recheck, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::{MockRunner, ProjectFixture, ScriptedConfirmer, StubCheck};

    fn policy(strict_mode: bool, auto_fix: bool) -> RunPolicy {
        RunPolicy {
            strict_mode,
            auto_fix,
            interactive: false,
        }
    }

    fn pipeline(policy: RunPolicy, confirmer: ScriptedConfirmer) -> Pipeline {
        Pipeline::new(".", policy, Box::new(MockRunner::new()), Box::new(confirmer))
    }

    #[test]
    fn test_status_transitions_to_completed() {
        let mut p = pipeline(policy(true, false), ScriptedConfirmer::always(false))
            .with_check(Box::new(StubCheck::passing("A")));
        assert_eq!(p.status(), &PipelineStatus::Pending);

        let report = p.run().unwrap();
        assert!(report.success);
        assert_eq!(p.status(), &PipelineStatus::Completed(true));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_strict_mode_stops_at_first_failure() {
        let later = StubCheck::passing("C");
        let evaluations = later.evaluations();
        let mut p = pipeline(policy(true, false), ScriptedConfirmer::always(false))
            .with_check(Box::new(StubCheck::passing("A")))
            .with_check(Box::new(StubCheck::failing("B", "broken")))
            .with_check(Box::new(later));

        let report = p.run().unwrap();
        assert!(!report.success);
        assert_eq!(p.status(), &PipelineStatus::Aborted("B".into()));
        assert_eq!(evaluations.get(), 0);
        assert_eq!(report.checks.len(), 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_non_strict_collects_every_failure() {
        let mut p = pipeline(policy(false, false), ScriptedConfirmer::always(false))
            .with_check(Box::new(StubCheck::failing("A", "first")))
            .with_check(Box::new(StubCheck::passing("B")))
            .with_check(Box::new(StubCheck::failing("C", "second")));

        let report = p.run().unwrap();
        assert!(!report.success);
        assert_eq!(report.errors, vec!["A: first", "C: second"]);
        assert_eq!(report.checks.len(), 3);
        assert_eq!(p.status(), &PipelineStatus::Completed(false));
    }

    #[test]
    fn test_fix_then_recheck_records_fix() {
        let check = StubCheck::failing("Linter", "style").with_fixer(true);
        let fixes = check.fix_calls();
        let evaluations = check.evaluations();
        let mut p = pipeline(policy(true, true), ScriptedConfirmer::always(true))
            .with_check(Box::new(check))
            .with_check(Box::new(StubCheck::passing("Tests")));

        let report = p.run().unwrap();
        assert!(report.success);
        assert_eq!(report.fixes_applied, vec!["Linter"]);
        assert_eq!(fixes.get(), 1);
        assert_eq!(evaluations.get(), 2);
        assert!(report.checks[0].fixed);
    }

    #[test]
    fn test_auto_fix_off_never_fixes() {
        let check = StubCheck::failing("Linter", "style").with_fixer(true);
        let fixes = check.fix_calls();
        let confirmer = ScriptedConfirmer::always(true);
        let prompts = confirmer.clone();
        let mut p = pipeline(policy(true, false), confirmer).with_check(Box::new(check));

        let report = p.run().unwrap();
        assert!(!report.success);
        assert!(report.fixes_applied.is_empty());
        assert_eq!(fixes.get(), 0);
        assert!(prompts.prompts().is_empty());
    }

    #[test]
    fn test_declined_fix_is_a_failure() {
        let check = StubCheck::failing("Linter", "style").with_fixer(true);
        let fixes = check.fix_calls();
        let mut p = pipeline(policy(false, true), ScriptedConfirmer::answering([false]))
            .with_check(Box::new(check));

        let report = p.run().unwrap();
        assert_eq!(fixes.get(), 0);
        assert_eq!(report.errors, vec!["Linter: style"]);
    }

    #[test]
    fn test_ineffective_fix_reports_recheck() {
        let check = StubCheck::failing("Linter", "style").with_fixer(false);
        let evaluations = check.evaluations();
        let mut p = pipeline(policy(false, true), ScriptedConfirmer::always(true))
            .with_check(Box::new(check));

        let report = p.run().unwrap();
        assert_eq!(evaluations.get(), 2);
        assert!(report.fixes_applied.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_unattempted_fix_skips_recheck() {
        let check = StubCheck::failing("Linter", "style").with_failing_fix();
        let evaluations = check.evaluations();
        let mut p = pipeline(policy(true, true), ScriptedConfirmer::always(true))
            .with_check(Box::new(check));

        let report = p.run().unwrap();
        assert_eq!(evaluations.get(), 1);
        assert!(!report.success);
    }

    #[test]
    fn test_operator_abort_escapes() {
        let check = StubCheck::failing("Linter", "style").with_fixer(true);
        let mut p = pipeline(policy(true, true), ScriptedConfirmer::aborting())
            .with_check(Box::new(check))
            .with_check(Box::new(StubCheck::passing("Tests")));

        let err = p.run().unwrap_err();
        assert!(err.is_interrupt());
        assert_eq!(err.exit_code(), 130);
        assert_eq!(p.status(), &PipelineStatus::Aborted("Linter".into()));
    }

    #[test]
    fn test_pipeline_runs_only_once() {
        let mut p = pipeline(policy(true, false), ScriptedConfirmer::always(false));
        p.run().unwrap();
        assert!(p.run().is_err());
    }

    #[test]
    fn test_from_config_honours_only() {
        let config = GuardConfig::default();
        let only = [CheckKind::Files, CheckKind::Git];
        let p = Pipeline::from_config(
            ".",
            &config,
            RunPolicy::default(),
            Some(&only[..]),
            Box::new(MockRunner::new()),
            Box::new(ScriptedConfirmer::always(false)),
        );
        assert_eq!(p.check_names(), vec!["Files", "Git"]);
    }

    #[test]
    fn test_real_checks_against_project_tree() {
        let project = ProjectFixture::ignored().with_file("shop/settings.py", "DEBUG = True\n");
        let mut config = GuardConfig::default();
        config.checks.security.tools.clear();
        config.checks.security.check_secrets = false;
        let only = [CheckKind::Security, CheckKind::Files];

        let mut p = Pipeline::from_config(
            project.path(),
            &config,
            policy(false, false),
            Some(&only[..]),
            Box::new(MockRunner::new()),
            Box::new(ScriptedConfirmer::always(false)),
        );
        let report = p.run().unwrap();

        assert_eq!(report.errors, vec!["Security: Security problems detected"]);
        assert!(report.outcome("Files").unwrap().passed);
        assert!(report
            .outcome("Security")
            .unwrap()
            .details
            .contains(&"shop/settings.py: DEBUG=True in code".to_string()));
    }

    fn framework_pipeline(
        config: &GuardConfig,
        runner: &MockRunner,
        confirmer: ScriptedConfirmer,
    ) -> Pipeline {
        let only = [CheckKind::Framework];
        Pipeline::from_config(
            ".",
            config,
            policy(true, true),
            Some(&only[..]),
            Box::new(runner.clone()),
            Box::new(confirmer),
        )
    }

    fn missing_migrations() -> MockRunner {
        MockRunner::new().on(
            "python manage.py makemigrations --check",
            CommandOutput::failed(1, "Migrations for 'shop':\n  shop/migrations/0002_order.py\n"),
        )
    }

    #[test]
    fn test_auto_fix_never_generates_migrations_without_auto_migrate() {
        let runner = missing_migrations();
        let confirmer = ScriptedConfirmer::always(true);
        let prompts = confirmer.clone();
        let mut p = framework_pipeline(&GuardConfig::default(), &runner, confirmer);

        let report = p.run().unwrap();
        assert!(!report.success);
        assert!(report.fixes_applied.is_empty());
        assert!(prompts.prompts().is_empty());
        assert!(!runner
            .calls()
            .contains(&"python manage.py makemigrations".to_string()));
        assert_eq!(p.status(), &PipelineStatus::Aborted("Framework".into()));
    }

    #[test]
    fn test_confirmed_auto_migrate_is_recorded_by_pipeline() {
        let runner = missing_migrations().on("python manage.py makemigrations", CommandOutput::ok(""));
        let mut config = GuardConfig::default();
        config.checks.framework.auto_migrate = true;
        let confirmer = ScriptedConfirmer::always(true);
        let prompts = confirmer.clone();
        let mut p = framework_pipeline(&config, &runner, confirmer);

        let report = p.run().unwrap();
        assert!(report.success);
        assert_eq!(report.fixes_applied, vec!["Framework"]);
        assert!(report.outcome("Framework").unwrap().fixed);
        assert_eq!(prompts.prompts().len(), 1);
    }

    #[test]
    fn test_declined_auto_migrate_asks_once() {
        let runner = missing_migrations();
        let mut config = GuardConfig::default();
        config.checks.framework.auto_migrate = true;
        let confirmer = ScriptedConfirmer::always(false);
        let prompts = confirmer.clone();
        let mut p = framework_pipeline(&config, &runner, confirmer);

        let report = p.run().unwrap();
        assert!(!report.success);
        assert_eq!(prompts.prompts().len(), 1);
        assert!(!runner
            .calls()
            .contains(&"python manage.py makemigrations".to_string()));
    }

    #[test]
    fn test_partial_linter_fix_counts_and_names_failed_step() {
        let runner = MockRunner::new()
            .on("flake8", CommandOutput::failed(1, "shop/views.py:3:1: E302 expected 2 blank lines"))
            .on("flake8", CommandOutput::ok(""))
            .on("black", CommandOutput::ok("reformatted shop/views.py"))
            .on("isort", CommandOutput::failed(1, "").with_stderr("isort: broken config"));
        let only = [CheckKind::Linter];
        let mut p = Pipeline::from_config(
            ".",
            &GuardConfig::default(),
            policy(true, true),
            Some(&only[..]),
            Box::new(runner.clone()),
            Box::new(ScriptedConfirmer::always(true)),
        );

        let report = p.run().unwrap();
        assert!(report.success);
        assert_eq!(report.fixes_applied, vec!["Linter"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("black: ok, isort: failed"));
        assert_eq!(runner.call_count("flake8"), 2);
    }

    #[test]
    fn test_check_warnings_reach_the_report() {
        let mut p = pipeline(policy(false, false), ScriptedConfirmer::always(false))
            .with_check(Box::new(StubCheck::passing("Git").with_warning("subject not conventional")))
            .with_check(Box::new(StubCheck::failing("Files", "missing .gitignore")));

        let report = p.run().unwrap();
        assert_eq!(report.warnings, vec!["subject not conventional"]);
        assert_eq!(report.errors, vec!["Files: missing .gitignore"]);
    }

    #[test]
    fn test_state_offers_install_once() {
        let mut state = PipelineState::new(RunPolicy::default());
        assert!(state.offer_install("bandit"));
        assert!(!state.offer_install("bandit"));
        assert!(state.offer_install("safety"));
    }
}
