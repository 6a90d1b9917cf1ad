//! Sensitive-file check: forbidden files must not be tracked, and the
//! ignore file must list the required entries.

use std::fs;

use tracing::{debug, info};

use super::{Check, CheckContext, CheckResult};
use crate::config::FilesSettings;
use crate::error::Result;
use crate::process::CommandSpec;

const GITIGNORE: &str = ".gitignore";

pub struct SensitiveFilesCheck {
    settings: FilesSettings,
}

impl SensitiveFilesCheck {
    #[must_use]
    pub fn new(settings: FilesSettings) -> Self {
        Self { settings }
    }
}

impl Check for SensitiveFilesCheck {
    fn name(&self) -> &str {
        "Files"
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        let mut dangerous = Vec::new();
        let mut advisory = Vec::new();

        for file in &self.settings.forbidden_files {
            if !ctx.root.join(file).exists() {
                continue;
            }

            let spec = CommandSpec::new("git").args(["ls-files", "--error-unmatch", file.as_str()]);
            match ctx.run(spec) {
                Ok(out) if out.success() => {
                    dangerous.push(format!("{} (tracked by version control - DANGER!)", file));
                }
                Ok(_) => advisory.push(format!("{} (untracked - OK)", file)),
                // Tracking status unknown: do not let it through silently
                Err(e) => dangerous.push(format!("{} (could not query version control: {})", file, e)),
            }
        }
        debug!(dangerous = dangerous.len(), advisory = advisory.len(), "forbidden files");

        if !dangerous.is_empty() {
            return Ok(
                CheckResult::fail(self.name(), "Sensitive files committed!").with_details(dangerous),
            );
        }

        if self.settings.check_gitignore {
            info!("checking ignore rules");
            let path = ctx.root.join(GITIGNORE);
            let Ok(content) = fs::read_to_string(&path) else {
                return Ok(CheckResult::fail(self.name(), ".gitignore file missing"));
            };

            let missing = missing_ignore_entries(&content, &self.settings.gitignore_required);
            if !missing.is_empty() {
                return Ok(CheckResult::fail(self.name(), ".gitignore incomplete")
                    .with_detail(format!("Missing: {}", missing.join(", "))));
            }
        }

        Ok(CheckResult::pass(self.name(), "No sensitive files detected").with_details(advisory))
    }
}

/// Required entries with no matching line in `content`.
///
/// Lines are compared after trimming; a leading `/` or `**/` and a trailing
/// `/` are ignored on both sides. Comments and negations never match.
#[must_use]
pub fn missing_ignore_entries<'a>(content: &str, required: &'a [String]) -> Vec<&'a str> {
    let present: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .map(normalize_rule)
        .collect();

    required
        .iter()
        .map(String::as_str)
        .filter(|entry| !present.contains(&normalize_rule(entry)))
        .collect()
}

fn normalize_rule(rule: &str) -> &str {
    let rule = rule.trim();
    let rule = rule
        .strip_prefix("**/")
        .or_else(|| rule.strip_prefix('/'))
        .unwrap_or(rule);
    rule.strip_suffix('/').unwrap_or(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests_support::with_context_at;
    use crate::process::CommandOutput;
    use crate::testing::{MockRunner, ScriptedConfirmer};
    use tempfile::TempDir;

    const COMPLETE: &str = "# python\n.env\ndb.sqlite3\n__pycache__/\n*.pyc\n";

    fn run(temp: &TempDir, runner: &MockRunner) -> CheckResult {
        let check = SensitiveFilesCheck::new(FilesSettings::default());
        let mut confirmer = ScriptedConfirmer::always(false);
        with_context_at(temp.path(), runner, &mut confirmer, |ctx| check.evaluate(ctx))
            .0
            .unwrap()
    }

    #[test]
    fn test_missing_entries_normalization() {
        let required: Vec<String> = [".env", "db.sqlite3", "__pycache__/", "*.pyc"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(missing_ignore_entries(COMPLETE, &required).is_empty());
        assert!(missing_ignore_entries("/.env\n/db.sqlite3/\n**/__pycache__\n*.pyc", &required).is_empty());
        assert_eq!(
            missing_ignore_entries("# .env\n!db.sqlite3\n*.pyc\n", &required),
            vec![".env", "db.sqlite3", "__pycache__/"]
        );
        assert_eq!(
            missing_ignore_entries(".envrc\n", &required[..1]),
            vec![".env"]
        );
    }

    #[test]
    fn test_clean_tree_passes() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(GITIGNORE), COMPLETE).unwrap();
        let runner = MockRunner::new();
        let result = run(&temp, &runner);
        assert!(result.passed);
        assert!(result.details.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_untracked_forbidden_file_is_advisory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(GITIGNORE), COMPLETE).unwrap();
        fs::write(temp.path().join(".env"), "SECRET=1").unwrap();
        let runner = MockRunner::new().on(
            "git ls-files --error-unmatch .env",
            CommandOutput::failed(1, "").with_stderr("error: pathspec '.env' did not match"),
        );

        let result = run(&temp, &runner);
        assert!(result.passed);
        assert_eq!(result.details, vec![".env (untracked - OK)"]);
    }

    #[test]
    fn test_tracked_forbidden_file_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(GITIGNORE), COMPLETE).unwrap();
        fs::write(temp.path().join("db.sqlite3"), "").unwrap();
        let runner = MockRunner::new().on(
            "git ls-files --error-unmatch db.sqlite3",
            CommandOutput::ok("db.sqlite3\n"),
        );

        let result = run(&temp, &runner);
        assert!(!result.passed);
        assert!(!result.can_fix());
        assert_eq!(result.message, "Sensitive files committed!");
        assert_eq!(
            result.details,
            vec!["db.sqlite3 (tracked by version control - DANGER!)"]
        );
    }

    #[test]
    fn test_missing_gitignore_fails() {
        let temp = TempDir::new().unwrap();
        let result = run(&temp, &MockRunner::new());
        assert!(!result.passed);
        assert_eq!(result.message, ".gitignore file missing");
    }

    #[test]
    fn test_incomplete_gitignore_lists_missing_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(GITIGNORE), ".env\n*.pyc\n").unwrap();
        let result = run(&temp, &MockRunner::new());
        assert!(!result.passed);
        assert_eq!(result.message, ".gitignore incomplete");
        assert_eq!(result.details, vec!["Missing: db.sqlite3, __pycache__/"]);
    }
}
