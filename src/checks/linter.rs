//! Style check backed by flake8, repaired with black + isort.

use tracing::{debug, info};

use super::{
    describe_run_error, non_empty_lines, Check, CheckContext, CheckResult, FixOutcome,
};
use crate::config::LinterSettings;
use crate::error::Result;
use crate::process::CommandSpec;

/// Fix identity advertised on style failures.
pub const FIX_FORMAT: &str = "format-and-sort-imports";

/// Runs the configured style checker over the project.
pub struct LinterCheck {
    settings: LinterSettings,
}

impl LinterCheck {
    #[must_use]
    pub fn new(settings: LinterSettings) -> Self {
        Self { settings }
    }

    /// `flake8 . --exclude a,b --max-line-length 88 --ignore D100,D101`
    fn lint_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.settings.tool)
            .arg(".")
            .timeout_secs(self.settings.timeout_secs);
        if !self.settings.exclude.is_empty() {
            spec = spec.arg("--exclude").arg(self.settings.exclude.join(","));
        }
        spec = spec
            .arg("--max-line-length")
            .arg(self.settings.max_line_length.to_string());
        if !self.settings.ignore.is_empty() {
            spec = spec.arg("--ignore").arg(self.settings.ignore.join(","));
        }
        spec
    }

    /// `black . --line-length 88 --exclude /(\.git|env)/`
    fn formatter_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.settings.formatter)
            .arg(".")
            .arg("--line-length")
            .arg(self.settings.max_line_length.to_string())
            .timeout_secs(self.settings.timeout_secs);
        if !self.settings.exclude.is_empty() {
            let alternatives: Vec<String> = self
                .settings
                .exclude
                .iter()
                .map(|dir| regex::escape(dir))
                .collect();
            spec = spec
                .arg("--exclude")
                .arg(format!("/({})/", alternatives.join("|")));
        }
        spec
    }

    /// `isort . --skip a --skip b`
    fn sorter_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.settings.import_sorter)
            .arg(".")
            .timeout_secs(self.settings.timeout_secs);
        for dir in &self.settings.exclude {
            spec = spec.arg("--skip").arg(dir);
        }
        spec
    }
}

impl Check for LinterCheck {
    fn name(&self) -> &str {
        "Linter"
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        let tool = self.settings.tool.as_str();
        if !ctx.ensure_tool(tool)? {
            return Ok(CheckResult::fail(
                self.name(),
                format!("{} is not installed", tool),
            ));
        }

        info!(tool, "checking style");
        let out = match ctx.run(self.lint_command()) {
            Ok(out) => out,
            Err(e) => {
                return Ok(CheckResult::fail(self.name(), describe_run_error(tool, &e)));
            }
        };

        if out.success() {
            return Ok(CheckResult::pass(self.name(), "No style errors detected"));
        }

        // flake8 reports on stdout; a crash lands on stderr with nothing else
        let report = if out.stdout.trim().is_empty() {
            out.stderr.as_str()
        } else {
            out.stdout.as_str()
        };
        let errors: Vec<&str> = non_empty_lines(report).collect();
        debug!(count = errors.len(), "style errors");

        let mut result = CheckResult::fail(
            self.name(),
            format!("{} style error(s) detected", errors.len()),
        )
        .with_detail(format!("{} style error(s) detected", errors.len()))
        .with_detail("Examples:")
        .with_details(errors.iter().take(self.settings.max_details).copied());

        if ctx.runner.is_available(&self.settings.formatter)
            || ctx.runner.is_available(&self.settings.import_sorter)
        {
            result = result.fixable(FIX_FORMAT);
        }
        Ok(result)
    }

    fn has_fixer(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &mut CheckContext<'_>) -> Result<FixOutcome> {
        let mut outcome = FixOutcome::default();

        for (tool, spec) in [
            (&self.settings.formatter, self.formatter_command()),
            (&self.settings.import_sorter, self.sorter_command()),
        ] {
            if !ctx.runner.is_available(tool) {
                outcome.step(tool.as_str(), false, Some("not installed".to_string()));
                continue;
            }
            info!(tool = %tool, "applying fix");
            let result = ctx.run(spec);
            outcome.step_from(tool, &result);
        }

        Ok(outcome)
    }
}
