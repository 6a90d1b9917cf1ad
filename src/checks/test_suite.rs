//! Project test-suite check.

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use super::{describe_run_error, non_empty_lines, Check, CheckContext, CheckResult};
use crate::config::TestSettings;
use crate::error::Result;
use crate::process::CommandSpec;

/// Failure lines (and their successors) kept from a failing run.
const MAX_FAILURE_LINES: usize = 10;

/// Runs the configured test command and reports the outcome.
pub struct TestSuiteCheck {
    settings: TestSettings,
}

impl TestSuiteCheck {
    #[must_use]
    pub fn new(settings: TestSettings) -> Self {
        Self { settings }
    }

    fn command(&self) -> Option<CommandSpec> {
        let mut spec = CommandSpec::from_argv(&self.settings.command)?;
        if let Some(ref module) = self.settings.test_module {
            spec = spec.arg(module);
        }
        Some(spec.timeout_secs(self.settings.timeout_secs))
    }
}

impl Check for TestSuiteCheck {
    fn name(&self) -> &str {
        "Tests"
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        let Some(spec) = self.command() else {
            return Ok(CheckResult::fail(self.name(), "No test command configured"));
        };

        info!(command = %spec.command_line(), "running test suite");
        let out = match ctx.run(spec) {
            Ok(out) => out,
            Err(e) => {
                return Ok(CheckResult::fail(
                    self.name(),
                    describe_run_error("Test suite", &e),
                ));
            }
        };

        let transcript = out.combined();
        if out.success() {
            let message = match count_tests(&transcript) {
                Some(n) => format!("All tests pass ({} tests)", n),
                None => "All tests pass".to_string(),
            };
            return Ok(CheckResult::pass(self.name(), message));
        }

        let mut details = failure_lines(&transcript, MAX_FAILURE_LINES);
        if details.is_empty() {
            // No recognisable markers: show the tail of the run instead
            let lines: Vec<&str> = non_empty_lines(&transcript).collect();
            let start = lines.len().saturating_sub(5);
            details = lines[start..].iter().map(|l| l.to_string()).collect();
        }

        Ok(CheckResult::fail(self.name(), "Some tests failed").with_details(details))
    }
}

/// Number of tests run, from a unittest/Django or pytest summary line.
#[must_use]
pub fn count_tests(transcript: &str) -> Option<usize> {
    static SUMMARY: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = SUMMARY.get_or_init(|| {
        [r"Ran (\d+) tests?", r"(\d+) passed"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    });

    patterns.iter().find_map(|re| {
        re.captures(transcript)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Lines starting with `FAIL:` or `ERROR:` plus the line after each.
#[must_use]
pub fn failure_lines(transcript: &str, limit: usize) -> Vec<String> {
    let lines: Vec<&str> = transcript.lines().collect();
    let mut out = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("FAIL:") || trimmed.starts_with("ERROR:") {
            out.push(line.trim_end().to_string());
            if let Some(next) = lines.get(i + 1) {
                if !next.trim().is_empty() {
                    out.push(next.trim_end().to_string());
                }
            }
        }
        if out.len() >= limit {
            out.truncate(limit);
            break;
        }
    }

    out
}
