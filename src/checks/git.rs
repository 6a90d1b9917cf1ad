//! Version-control metadata: staged files and commit-message convention.
//!
//! A commit message that breaks the convention is only a warning; the
//! check itself never fails for it.

use regex::Regex;
use tracing::{debug, info};

use super::{describe_run_error, first_line, non_empty_lines, Check, CheckContext, CheckResult};
use crate::config::GitSettings;
use crate::error::Result;
use crate::process::CommandSpec;

/// Characters of the offending message quoted in the warning.
const QUOTED_MESSAGE_CHARS: usize = 50;

pub struct GitMetaCheck {
    settings: GitSettings,
    convention: Option<Regex>,
}

impl GitMetaCheck {
    #[must_use]
    pub fn new(settings: GitSettings) -> Self {
        let convention = convention_pattern(&settings.allowed_types);
        Self {
            settings,
            convention,
        }
    }

    /// Whether `message` follows `type(scope)?: description`.
    #[must_use]
    pub fn follows_convention(&self, message: &str) -> bool {
        let subject = message.lines().next().unwrap_or_default();
        self.convention
            .as_ref()
            .is_none_or(|re| re.is_match(subject))
    }

    fn check_commit_message(&self, ctx: &mut CheckContext<'_>) {
        let spec = CommandSpec::new("git").args(["log", "-1", "--pretty=%B"]);
        let message = match ctx.run(spec) {
            Ok(out) if out.success() => out.stdout.trim().to_string(),
            // No commits yet, or no repository: nothing to judge
            _ => return,
        };

        if message.is_empty() || self.follows_convention(&message) {
            return;
        }

        debug!("last commit message breaks convention");
        let quoted: String = message.chars().take(QUOTED_MESSAGE_CHARS).collect();
        ctx.warn(format!(
            "Commit message does not follow the convention: '{}...'\n   Expected format: type(scope): description\n   Allowed types: {}",
            quoted,
            self.settings.allowed_types.join(", ")
        ));
    }
}

/// `(?i)^(feat|fix|...)(\(.+\))?: .+`
fn convention_pattern(types: &[String]) -> Option<Regex> {
    if types.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = types.iter().map(|t| regex::escape(t)).collect();
    Regex::new(&format!(r"(?i)^({})(\(.+\))?: .+", alternatives.join("|"))).ok()
}

impl Check for GitMetaCheck {
    fn name(&self) -> &str {
        "Git"
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        let mut details = Vec::new();

        if self.settings.check_staged_files {
            info!("listing staged files");
            let spec = CommandSpec::new("git").args(["diff", "--cached", "--name-only"]);
            let staged = match ctx.run(spec) {
                Ok(out) if out.success() => non_empty_lines(&out.stdout).count(),
                Ok(out) => {
                    return Ok(CheckResult::fail(self.name(), "Could not list staged files")
                        .with_detail(first_line(out.diagnostic())));
                }
                Err(e) => {
                    return Ok(CheckResult::fail(
                        self.name(),
                        describe_run_error("git", &e),
                    ));
                }
            };

            if staged == 0 {
                return Ok(CheckResult::fail(self.name(), "No files staged")
                    .with_detail("Use 'git add' to stage files before committing"));
            }
            details.push(format!("{} file(s) staged", staged));
        }

        if self.settings.conventional_commits {
            self.check_commit_message(ctx);
        }

        Ok(CheckResult::pass(self.name(), "Git OK").with_details(details))
    }
}
