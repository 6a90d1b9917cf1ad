//! Security check: static scan, dependency scan, secret detection and a
//! built-in dangerous-pattern scan.
//!
//! Every sub-scan runs even when an earlier one fails; the check fails when
//! any of them does and lists each failing scan with its details.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{describe_run_error, non_empty_lines, Check, CheckContext, CheckResult};
use crate::config::SecuritySettings;
use crate::error::Result;
use crate::process::CommandSpec;

/// Pattern-scan matches kept.
const MAX_PATTERN_MATCHES: usize = 10;

/// Vulnerable dependencies listed.
const MAX_ADVISORIES: usize = 5;

/// Static-scan lines kept.
const MAX_STATIC_LINES: usize = 10;

/// Case-insensitive source patterns and what they indicate.
const DANGEROUS_CODE_PATTERNS: &[(&str, &str)] = &[
    (
        r#"SECRET_KEY\s*=\s*['"][^'"]+['"]"#,
        "SECRET_KEY hardcoded",
    ),
    (r"\bDEBUG\s*=\s*True\b", "DEBUG=True in code"),
    (
        r#"ALLOWED_HOSTS\s*=\s*\[\s*['"]\*['"]\s*\]"#,
        "ALLOWED_HOSTS accepts any host",
    ),
    (r"\beval\s*\(", "Use of eval()"),
    (r"\bexec\s*\(", "Use of exec()"),
    (
        r#"password\s*=\s*['"][^'"]+['"]"#,
        "Password hardcoded",
    ),
    (
        r#"api_key\s*=\s*['"][^'"]+['"]"#,
        "API key hardcoded",
    ),
];

fn dangerous_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DANGEROUS_CODE_PATTERNS
            .iter()
            .filter_map(|(pattern, description)| {
                Regex::new(&format!("(?i){}", pattern))
                    .ok()
                    .map(|re| (re, *description))
            })
            .collect()
    })
}

/// Result of one sub-scan.
#[derive(Debug, Clone)]
struct ScanOutcome {
    scan: &'static str,
    passed: bool,
    message: String,
    details: Vec<String>,
}

impl ScanOutcome {
    fn pass(scan: &'static str, message: impl Into<String>) -> Self {
        Self {
            scan,
            passed: true,
            message: message.into(),
            details: Vec::new(),
        }
    }

    fn fail(scan: &'static str, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(scan, message)
        }
    }

    fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(details.into_iter().map(Into::into));
        self
    }
}

pub struct SecurityCheck {
    settings: SecuritySettings,
}

impl SecurityCheck {
    #[must_use]
    pub fn new(settings: SecuritySettings) -> Self {
        Self { settings }
    }

    fn static_scan(&self, ctx: &mut CheckContext<'_>) -> Result<ScanOutcome> {
        if !ctx.ensure_tool("bandit")? {
            return Ok(ScanOutcome::fail("Bandit", "bandit not installed"));
        }

        info!("running static security scan");
        let excluded: Vec<String> = std::iter::once("./tests".to_string())
            .chain(self.settings.exclude_dirs.iter().map(|d| format!("./{}", d)))
            .collect();
        let spec = CommandSpec::new("bandit")
            .args(["-r", ".", "-x"])
            .arg(excluded.join(","))
            .args(["-ll", "--quiet"])
            .timeout_secs(self.settings.timeout_secs);

        Ok(match ctx.run(spec) {
            Ok(out) if out.success() => ScanOutcome::pass("Bandit", "No vulnerabilities detected"),
            Ok(out) => ScanOutcome::fail("Bandit", "Vulnerabilities reported")
                .with_details(non_empty_lines(out.diagnostic()).take(MAX_STATIC_LINES)),
            Err(e) => ScanOutcome::fail("Bandit", describe_run_error("bandit", &e)),
        })
    }

    fn dependency_scan(&self, ctx: &mut CheckContext<'_>) -> Result<ScanOutcome> {
        if !ctx.ensure_tool("safety")? {
            return Ok(ScanOutcome::fail("Safety", "safety not installed"));
        }

        info!("scanning dependencies");
        let spec = CommandSpec::new("safety")
            .args(["check", "--json"])
            .timeout_secs(self.settings.timeout_secs);

        Ok(match ctx.run(spec) {
            Ok(out) if out.success() => ScanOutcome::pass("Safety", "No vulnerabilities detected"),
            Ok(out) => {
                let advisories = parse_dependency_report(&out.stdout).unwrap_or_else(|| {
                    let raw = out.diagnostic().trim();
                    if raw.is_empty() {
                        vec!["Vulnerabilities detected".to_string()]
                    } else {
                        non_empty_lines(raw).take(MAX_ADVISORIES).map(String::from).collect()
                    }
                });
                ScanOutcome::fail("Safety", "Vulnerable dependencies").with_details(advisories)
            }
            Err(e) => ScanOutcome::fail("Safety", describe_run_error("safety", &e)),
        })
    }

    fn secret_scan(&self, ctx: &mut CheckContext<'_>) -> Result<ScanOutcome> {
        let tool = self.settings.secrets_tool.as_str();
        if !ctx.ensure_tool(tool)? {
            return Ok(ScanOutcome::fail("Secrets", format!("{} not installed", tool)));
        }

        let baseline_name = self.settings.baseline_file.as_str();
        let baseline = ctx.root.join(baseline_name);

        if !baseline.exists() {
            warn!(baseline = %baseline.display(), "secret baseline missing, creating it");
            let spec = CommandSpec::new(tool)
                .args(["scan", "--all-files"])
                .timeout_secs(self.settings.timeout_secs);
            match ctx.run(spec) {
                Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
                    if let Err(e) = fs::write(&baseline, &out.stdout) {
                        return Ok(ScanOutcome::fail(
                            "Secrets",
                            format!("Could not write {}: {}", baseline_name, e),
                        ));
                    }
                    ctx.warn(format!(
                        "Secret baseline {} was created; review it and commit it",
                        baseline_name
                    ));
                }
                Ok(out) => {
                    return Ok(ScanOutcome::fail(
                        "Secrets",
                        format!("Could not create {}", baseline_name),
                    )
                    .with_details(non_empty_lines(out.diagnostic()).take(3)));
                }
                Err(e) => {
                    return Ok(ScanOutcome::fail("Secrets", describe_run_error(tool, &e)));
                }
            }
        }

        info!("scanning for secrets");
        let spec = CommandSpec::new(tool)
            .args(["scan", "--all-files", "--baseline", baseline_name])
            .timeout_secs(self.settings.timeout_secs);

        Ok(match ctx.run(spec) {
            Ok(out) if out.success() && !out.stdout.to_lowercase().contains("secrets") => {
                ScanOutcome::pass("Secrets", "No secrets detected")
            }
            Ok(_) => ScanOutcome::fail("Secrets", "Potential secrets detected")
                .with_details([format!("Review {}", baseline_name)]),
            Err(e) => ScanOutcome::fail("Secrets", describe_run_error(tool, &e)),
        })
    }

    fn pattern_scan(&self, root: &Path) -> ScanOutcome {
        info!("scanning for dangerous patterns");
        let matches = scan_dangerous_patterns(root, &self.settings.exclude_dirs);
        if matches.is_empty() {
            ScanOutcome::pass("Patterns", "No dangerous patterns")
        } else {
            ScanOutcome::fail("Patterns", "Dangerous patterns detected").with_details(matches)
        }
    }
}

impl Check for SecurityCheck {
    fn name(&self) -> &str {
        "Security"
    }

    fn evaluate(&self, ctx: &mut CheckContext<'_>) -> Result<CheckResult> {
        let mut scans = Vec::new();

        for tool in &self.settings.tools {
            match tool.as_str() {
                "bandit" => scans.push(self.static_scan(ctx)?),
                "safety" => scans.push(self.dependency_scan(ctx)?),
                other => {
                    warn!(tool = other, "unknown security tool ignored");
                    ctx.warn(format!("Unknown security tool '{}' ignored", other));
                }
            }
        }
        if self.settings.check_secrets {
            scans.push(self.secret_scan(ctx)?);
        }
        if self.settings.check_patterns {
            scans.push(self.pattern_scan(ctx.root));
        }

        let (failed, passed): (Vec<_>, Vec<_>) = scans.into_iter().partition(|s| !s.passed);
        debug!(failed = failed.len(), passed = passed.len(), "security scans done");

        if failed.is_empty() {
            return Ok(
                CheckResult::pass(self.name(), "No security problems detected").with_details(
                    passed.iter().map(|s| format!("{}: {}", s.scan, s.message)),
                ),
            );
        }

        let mut result = CheckResult::fail(self.name(), "Security problems detected");
        for scan in failed {
            result = result
                .with_detail(format!("{}: {}", scan.scan, scan.message))
                .with_details(scan.details);
        }
        Ok(result)
    }
}

/// Parse the dependency scanner's `--json` output into `package: advisory`
/// lines.
///
/// Accepts a list of objects (`package`/`vulnerability`), a list of legacy
/// arrays (`[package, spec, version, advisory, id]`) or an object with a
/// `vulnerabilities` list. Returns `None` when the text is not JSON.
#[must_use]
pub fn parse_dependency_report(stdout: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    let entries = match &value {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => map.get("vulnerabilities")?.as_array()?.as_slice(),
        _ => return None,
    };

    Some(
        entries
            .iter()
            .take(MAX_ADVISORIES)
            .map(|entry| {
                let (package, advisory) = match entry {
                    Value::Array(fields) => (
                        fields.first().and_then(Value::as_str),
                        fields.get(3).and_then(Value::as_str),
                    ),
                    Value::Object(map) => (
                        ["package", "package_name"]
                            .iter()
                            .find_map(|k| map.get(*k).and_then(Value::as_str)),
                        ["vulnerability", "advisory"]
                            .iter()
                            .find_map(|k| map.get(*k).and_then(Value::as_str)),
                    ),
                    _ => (None, None),
                };
                format!(
                    "{}: {}",
                    package.unwrap_or("N/A"),
                    advisory.unwrap_or("N/A")
                )
            })
            .collect(),
    )
}

/// Walk `.py` files under `root` and report the first dangerous matches as
/// `relative/path.py: description`.
///
/// Directories named in `exclude_dirs` are not descended into.
#[must_use]
pub fn scan_dangerous_patterns(root: &Path, exclude_dirs: &[String]) -> Vec<String> {
    let patterns = dangerous_patterns();
    let mut matches = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !exclude_dirs
                    .iter()
                    .any(|d| entry.file_name().to_str() == Some(d.as_str()))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("py")
        {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());

        for (regex, description) in patterns {
            if regex.is_match(&content) {
                matches.push(format!("{}: {}", relative.display(), description));
                if matches.len() >= MAX_PATTERN_MATCHES {
                    return matches;
                }
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests_support::{with_context, with_context_at};
    use crate::process::CommandOutput;
    use crate::testing::{MockRunner, ScriptedConfirmer};
    use tempfile::TempDir;

    fn exclude() -> Vec<String> {
        SecuritySettings::default().exclude_dirs
    }

    fn tools_only() -> SecuritySettings {
        SecuritySettings {
            check_secrets: false,
            check_patterns: false,
            ..SecuritySettings::default()
        }
    }

    #[test]
    fn test_pattern_scan_finds_dangerous_settings() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("mysite")).unwrap();
        fs::write(
            temp.path().join("mysite/settings.py"),
            "DEBUG = True\nALLOWED_HOSTS = ['*']\nSECRET_KEY = 'abc123'\n",
        )
        .unwrap();
        fs::write(temp.path().join("mysite/views.py"), "def index(r):\n    return 1\n").unwrap();

        let matches = scan_dangerous_patterns(temp.path(), &exclude());
        assert_eq!(
            matches,
            vec![
                "mysite/settings.py: SECRET_KEY hardcoded",
                "mysite/settings.py: DEBUG=True in code",
                "mysite/settings.py: ALLOWED_HOSTS accepts any host",
            ]
        );
    }

    #[test]
    fn test_pattern_scan_skips_excluded_dirs_and_other_files() {
        let temp = TempDir::new().unwrap();
        for dir in ["venv/lib", "node_modules", "app/migrations"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        fs::write(temp.path().join("venv/lib/six.py"), "exec(code)\n").unwrap();
        fs::write(temp.path().join("app/migrations/0001.py"), "eval('1')\n").unwrap();
        fs::write(temp.path().join("notes.txt"), "password = 'hunter2'\n").unwrap();
        fs::write(temp.path().join("app/util.py"), "x = literal_eval(s)\n").unwrap();

        assert!(scan_dangerous_patterns(temp.path(), &exclude()).is_empty());
    }

    #[test]
    fn test_pattern_scan_is_capped() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(
                temp.path().join(format!("m{}.py", i)),
                "password = 'x'\napi_key = 'y'\nexec(c)\n",
            )
            .unwrap();
        }
        assert_eq!(scan_dangerous_patterns(temp.path(), &exclude()).len(), 10);
    }

    #[test]
    fn test_parse_dependency_report_forms() {
        let objects = r#"[{"package": "django", "vulnerability": "CVE-2024-1"}]"#;
        assert_eq!(
            parse_dependency_report(objects).unwrap(),
            vec!["django: CVE-2024-1"]
        );

        let legacy = r#"[["requests", "<2.31", "2.30.0", "Proxy-Authorization leak", "58755"]]"#;
        assert_eq!(
            parse_dependency_report(legacy).unwrap(),
            vec!["requests: Proxy-Authorization leak"]
        );

        let wrapped = r#"{"vulnerabilities": [{"package_name": "pyyaml", "advisory": "unsafe load"}]}"#;
        assert_eq!(
            parse_dependency_report(wrapped).unwrap(),
            vec!["pyyaml: unsafe load"]
        );

        assert!(parse_dependency_report("+==== safety report ====+").is_none());
    }

    #[test]
    fn test_all_tools_clean_passes() {
        let runner = MockRunner::new()
            .on("bandit", CommandOutput::ok(""))
            .on("safety", CommandOutput::ok("[]"));
        let check = SecurityCheck::new(tools_only());
        let result = with_context(&runner, |ctx| check.evaluate(ctx)).unwrap();
        assert!(result.passed);
        assert_eq!(
            result.details,
            vec![
                "Bandit: No vulnerabilities detected",
                "Safety: No vulnerabilities detected"
            ]
        );
    }

    #[test]
    fn test_failures_are_aggregated_per_scan() {
        let runner = MockRunner::new()
            .on("bandit", CommandOutput::failed(1, ">> Issue: [B602] shell=True\n"))
            .on(
                "safety",
                CommandOutput::failed(64, r#"[{"package": "django", "vulnerability": "CVE-1"}]"#),
            );
        let check = SecurityCheck::new(tools_only());
        let result = with_context(&runner, |ctx| check.evaluate(ctx)).unwrap();

        assert!(!result.passed);
        assert!(!result.can_fix());
        assert_eq!(
            result.details,
            vec![
                "Bandit: Vulnerabilities reported",
                ">> Issue: [B602] shell=True",
                "Safety: Vulnerable dependencies",
                "django: CVE-1",
            ]
        );
    }

    #[test]
    fn test_missing_tool_fails_scan_but_others_run() {
        let runner = MockRunner::new()
            .without_tool("bandit")
            .on("safety", CommandOutput::ok("[]"));
        let check = SecurityCheck::new(tools_only());
        let result = with_context(&runner, |ctx| check.evaluate(ctx)).unwrap();
        assert!(!result.passed);
        assert_eq!(result.details, vec!["Bandit: bandit not installed"]);
        assert!(runner.was_called("safety check --json"));
    }

    #[test]
    fn test_secret_baseline_created_on_first_run() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new()
            .on("detect-secrets scan --all-files --baseline", CommandOutput::ok(""))
            .on(
                "detect-secrets scan --all-files",
                CommandOutput::ok("{\"version\": \"1.4.0\", \"results\": {}}"),
            );
        let check = SecurityCheck::new(SecuritySettings {
            tools: Vec::new(),
            check_patterns: false,
            ..SecuritySettings::default()
        });
        let mut confirmer = ScriptedConfirmer::always(false);
        let (result, state) =
            with_context_at(temp.path(), &runner, &mut confirmer, |ctx| check.evaluate(ctx));
        let result = result.unwrap();

        assert!(result.passed, "{:?}", result);
        assert!(temp.path().join(".secrets.baseline").exists());
        assert_eq!(state.warnings.len(), 1);
        assert!(state.warnings[0].contains(".secrets.baseline was created"));
    }

    #[test]
    fn test_secret_scan_flags_findings() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".secrets.baseline"), "{}").unwrap();
        let runner = MockRunner::new().on(
            "detect-secrets scan --all-files --baseline",
            CommandOutput::failed(1, "Potential secrets about to be committed"),
        );
        let check = SecurityCheck::new(SecuritySettings {
            tools: Vec::new(),
            check_patterns: false,
            ..SecuritySettings::default()
        });
        let mut confirmer = ScriptedConfirmer::always(false);
        let (result, state) =
            with_context_at(temp.path(), &runner, &mut confirmer, |ctx| check.evaluate(ctx));
        let result = result.unwrap();

        assert!(!result.passed);
        assert_eq!(result.details[0], "Secrets: Potential secrets detected");
        assert!(state.warnings.is_empty());
    }

    #[test]
    fn test_unknown_tool_is_a_warning() {
        let check = SecurityCheck::new(SecuritySettings {
            tools: vec!["semgrep".into()],
            check_secrets: false,
            check_patterns: false,
            ..SecuritySettings::default()
        });
        let runner = MockRunner::new();
        let mut confirmer = ScriptedConfirmer::always(false);
        let (result, state) = with_context_at(
            std::path::Path::new("."),
            &runner,
            &mut confirmer,
            |ctx| check.evaluate(ctx),
        );
        assert!(result.unwrap().passed);
        assert_eq!(state.warnings, vec!["Unknown security tool 'semgrep' ignored"]);
    }
}
