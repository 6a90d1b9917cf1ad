//! Web-framework configuration check: system check, optional deploy
//! pass, and migration drift.

use tracing::{info, warn};

use super::{
    describe_run_error, non_empty_lines, Check, CheckContext, CheckResult, FixOutcome,
};
use crate::config::FrameworkSettings;
use crate::error::Result;
use crate::process::CommandSpec;

/// Fix identity advertised when migrations are missing.
///
/// Generation only ever happens inside [`FrameworkCheck::evaluate`] when
/// `auto_migrate` is set and the operator agrees; the check carries no
/// fixer for the pipeline to run.
pub const FIX_MIGRATIONS: &str = "generate-migrations";

/// Deploy-pass diagnostics kept in a failure.
const MAX_DEPLOY_ISSUES: usize = 5;

pub struct FrameworkCheck {
    settings: FrameworkSettings,
}

impl FrameworkCheck {
    #[must_use]
    pub fn new(settings: FrameworkSettings) -> Self {
        Self { settings }
    }

    /// `python manage.py <args...>`
    fn manage<const N: usize>(&self, args: [&str; N]) -> Option<CommandSpec> {
        let spec = CommandSpec::from_argv(&self.settings.manage_command)?;
        Some(spec.args(args).timeout_secs(self.settings.timeout_secs))
    }

    fn migrate_hint(&self) -> String {
        format!(
            "Run: {} makemigrations",
            self.settings.manage_command.join(" ")
        )
    }

    /// Generate missing migrations; returns whether the command succeeded.
    fn make_migrations(&self, ctx: &mut CheckContext<'_>) -> FixOutcome {
        let mut outcome = FixOutcome::default();
        match self.manage(["makemigrations"]) {
            Some(spec) => {
                info!("generating migrations");
                let result = ctx.run(spec);
                outcome.step_from("makemigrations", &result);
            }
            None => outcome.step("makemigrations", false, Some("no manage command".into())),
        }
        outcome
    }
}

impl Check for FrameworkCheck {
    fn name(&self) -> &str {
        "Framework"
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        let name = self.name();
        let Some(check) = self.manage(["check", "--verbosity=1"]) else {
            return Ok(CheckResult::fail(name, "No manage command configured"));
        };

        info!("running framework system check");
        match ctx.run(check) {
            Ok(out) if out.success() => {}
            Ok(out) => {
                return Ok(CheckResult::fail(name, "Errors in framework configuration")
                    .with_details(non_empty_lines(&out.combined())));
            }
            Err(e) => {
                return Ok(CheckResult::fail(
                    name,
                    describe_run_error("Framework check", &e),
                ));
            }
        }

        if self.settings.check_deploy {
            if let Some(deploy) = self.manage(["check", "--deploy", "--verbosity=1"]) {
                info!("running deployment checks");
                match ctx.run(deploy) {
                    Ok(out) if out.success() => {}
                    Ok(out) => {
                        let transcript = out.combined();
                        let issues = non_empty_lines(&transcript)
                            .filter(|l| l.contains("WARNING") || l.contains("ERROR"))
                            .take(MAX_DEPLOY_ISSUES);
                        return Ok(
                            CheckResult::fail(name, "Production configuration problems")
                                .with_details(issues),
                        );
                    }
                    Err(e) => {
                        return Ok(CheckResult::fail(
                            name,
                            describe_run_error("Deployment check", &e),
                        ));
                    }
                }
            }
        }

        if self.settings.check_migrations {
            if let Some(dry_run) = self.manage(["makemigrations", "--check", "--dry-run"]) {
                info!("checking for missing migrations");
                let out = match ctx.run(dry_run) {
                    Ok(out) => out,
                    Err(e) => {
                        return Ok(CheckResult::fail(
                            name,
                            describe_run_error("Migration check", &e),
                        ));
                    }
                };

                if !out.success() {
                    if self.settings.auto_migrate
                        && ctx.confirm("   Migrations are missing. Create them now?")?
                    {
                        let outcome = self.make_migrations(ctx);
                        if outcome.attempted() {
                            return Ok(CheckResult::pass(
                                name,
                                "Framework configuration OK (migrations created)",
                            )
                            .repaired());
                        }
                        warn!(summary = %outcome.summary(), "migration generation failed");
                    }

                    return Ok(CheckResult::fail(name, "Missing migrations")
                        .fixable(FIX_MIGRATIONS)
                        .with_detail(self.migrate_hint())
                        .with_details(non_empty_lines(&out.stdout).take(MAX_DEPLOY_ISSUES)));
                }
            }
        }

        Ok(CheckResult::pass(name, "Framework configuration OK"))
    }
}
