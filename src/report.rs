//! Run report and operator-facing console output.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::checks::{CheckResult, FixOutcome};
use crate::config::RunPolicy;
use crate::error::Result;
use crate::pipeline::PipelineStatus;

/// Detail lines shown under a passing check.
pub const PASS_DETAIL_PREVIEW: usize = 3;

/// Detail lines shown under a failing check.
pub const FAIL_DETAIL_PREVIEW: usize = 5;

const RULE_WIDTH: usize = 60;

// ============================================================================
// Report
// ============================================================================

/// Final outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    /// Passed only after an automatic fix.
    pub fixed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    pub details: Vec<String>,
}

impl CheckOutcome {
    #[must_use]
    pub fn from_result(result: &CheckResult, fixed: bool) -> Self {
        Self {
            name: result.name.clone(),
            passed: result.passed,
            fixed,
            message: result.message.clone(),
            fix: result.fix.clone(),
            details: result.details.clone(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub success: bool,
    pub policy: RunPolicy,
    /// Outcomes of the checks that ran, in order.
    pub checks: Vec<CheckOutcome>,
    /// Checks disabled or filtered out.
    pub skipped: Vec<String>,
    pub fixes_applied: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// `0` on success, `1` otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Pretty JSON for `--json`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Lines printed after a check is evaluated.
#[must_use]
pub fn render_result(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if result.passed {
        lines.push(format!("   {} {}", "[OK]".green().bold(), result.message));
        for detail in result.details.iter().take(PASS_DETAIL_PREVIEW) {
            lines.push(format!("      {}", detail.dimmed()));
        }
    } else {
        lines.push(format!("   {} {}", "[FAIL]".red().bold(), result.message));
        for detail in result.details.iter().take(FAIL_DETAIL_PREVIEW) {
            lines.push(format!("      - {}", detail));
        }
        let hidden = result.details.len().saturating_sub(FAIL_DETAIL_PREVIEW);
        if hidden > 0 {
            lines.push(format!("      ... and {} more", hidden).dimmed().to_string());
        }
    }
    lines
}

/// The closing summary: verdict, fixes, warnings, errors.
#[must_use]
pub fn render_summary(report: &PipelineReport) -> String {
    let mut out = vec![String::new(), rule(), "SUMMARY".bold().to_string(), rule()];

    if report.success {
        out.push(format!(
            "{} All checks passed, ready to commit",
            "[OK]".green().bold()
        ));
    } else {
        out.push(format!(
            "{} Checks failed, commit blocked",
            "[FAIL]".red().bold()
        ));
        if let PipelineStatus::Aborted(ref check) = report.status {
            out.push(format!("   Stopped at: {} (strict mode)", check));
        }
    }

    if !report.fixes_applied.is_empty() {
        out.push(String::new());
        out.push("Fixes applied:".cyan().bold().to_string());
        out.extend(report.fixes_applied.iter().map(|f| format!("   - {}", f)));
    }

    if !report.warnings.is_empty() {
        out.push(String::new());
        out.push("Warnings:".yellow().bold().to_string());
        out.extend(report.warnings.iter().map(|w| format!("   - {}", w)));
    }

    if !report.errors.is_empty() {
        out.push(String::new());
        out.push("Errors:".red().bold().to_string());
        out.extend(report.errors.iter().map(|e| format!("   - {}", e)));
    }

    if !report.skipped.is_empty() {
        out.push(String::new());
        out.push(format!("Skipped: {}", report.skipped.join(", ")).dimmed().to_string());
    }

    out.push(rule());
    out.join("\n")
}

// ============================================================================
// Console reporter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Stdout,
    Stderr,
    Silent,
}

/// Prints run progress for the operator.
///
/// With `--json` progress goes to stderr so stdout carries only the report.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    target: Target,
    print_summary: bool,
}

impl ConsoleReporter {
    /// Progress and summary on stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            target: Target::Stdout,
            print_summary: true,
        }
    }

    /// Progress on stderr, no summary.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            target: Target::Stderr,
            print_summary: false,
        }
    }

    #[must_use]
    pub fn silent() -> Self {
        Self {
            target: Target::Silent,
            print_summary: false,
        }
    }

    fn emit(&self, line: impl AsRef<str>) {
        match self.target {
            Target::Stdout => println!("{}", line.as_ref()),
            Target::Stderr => eprintln!("{}", line.as_ref()),
            Target::Silent => {}
        }
    }

    pub fn header(&self, policy: &RunPolicy, total: usize) {
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        self.emit(rule());
        self.emit("PRE-COMMIT CHECKS".bold().to_string());
        self.emit(rule());
        self.emit(format!(
            "Mode: {} | Auto-fix: {} | Interactive: {} | Checks: {}",
            if policy.strict_mode { "strict" } else { "lenient" },
            on_off(policy.auto_fix),
            on_off(policy.interactive),
            total
        ));
    }

    pub fn step(&self, index: usize, total: usize, name: &str) {
        self.emit("");
        self.emit(format!("[{}/{}] {}", index, total, name).cyan().bold().to_string());
    }

    pub fn result(&self, result: &CheckResult) {
        for line in render_result(result) {
            self.emit(line);
        }
    }

    pub fn fix_offer(&self, fix: &str) {
        self.emit(format!("   Fix available: {}", fix).yellow().to_string());
    }

    pub fn fix_not_attempted(&self, outcome: &FixOutcome) {
        self.emit(format!("   Fix could not run: {}", outcome.summary()).red().to_string());
    }

    pub fn fixed(&self, result: &CheckResult) {
        self.emit(format!("   {} Fixed: {}", "[OK]".green().bold(), result.message));
    }

    pub fn fix_insufficient(&self, result: &CheckResult) {
        self.emit(
            "   Fix applied but the check still fails:"
                .yellow()
                .to_string(),
        );
        self.result(result);
    }

    pub fn blocked(&self, check: &str) {
        self.emit("");
        self.emit(
            format!("Strict mode: stopping at {}", check)
                .red()
                .bold()
                .to_string(),
        );
    }

    pub fn summary(&self, report: &PipelineReport) {
        if self.print_summary {
            self.emit(render_summary(report));
        }
    }
}
