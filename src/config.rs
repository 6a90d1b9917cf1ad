//! Configuration for the commit guard.
//!
//! The configuration is loaded once, before any check runs, and is
//! read-only afterwards. A missing file falls back to the built-in
//! defaults (every check enabled, strict mode on); a malformed file is a
//! fatal [`GuardError::Config`].
//!
//! # Example pre-commit-config.json
//!
//! ```json
//! {
//!   "strict_mode": true,
//!   "auto_fix": true,
//!   "interactive": true,
//!   "checks": {
//!     "linter": { "enabled": true, "exclude": ["venv", "migrations"], "max_line_length": 100 },
//!     "tests": { "enabled": true, "test_module": "accounts" },
//!     "django": { "check_deploy": false, "auto_migrate": true },
//!     "security": { "tools": ["bandit", "safety"], "check_secrets": true },
//!     "files": { "forbidden_files": [".env", "db.sqlite3"] },
//!     "git": { "allowed_types": ["feat", "fix", "docs"] }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{GuardError, Result};

/// Default configuration path, relative to the project directory.
pub const DEFAULT_CONFIG_PATH: &str = "scripts/pre-commit-config.json";

fn default_true() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// Whole configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Abort on the first failing check.
    pub strict_mode: bool,
    /// Offer automated fixes for fixable failures.
    pub auto_fix: bool,
    /// Ask the operator before fixing; otherwise use `auto_fix` as the answer.
    pub interactive: bool,
    pub colors: ColorsConfig,
    pub tools: ToolsConfig,
    pub checks: ChecksConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            auto_fix: true,
            interactive: true,
            colors: ColorsConfig::default(),
            tools: ToolsConfig::default(),
            checks: ChecksConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// How missing tools are handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Offer to install a missing tool (once per tool per run).
    pub auto_install: bool,
    /// Installer argv; the tool name is appended.
    pub install_command: Vec<String>,
    /// Budget for one install, in seconds.
    pub install_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_install: true,
            install_command: strings(&["pip", "install"]),
            install_timeout_secs: 300,
        }
    }
}

/// Per-check settings, keyed by check name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub linter: LinterSettings,
    pub tests: TestSettings,
    #[serde(alias = "django")]
    pub framework: FrameworkSettings,
    pub security: SecuritySettings,
    pub files: FilesSettings,
    pub git: GitSettings,
}

// ============================================================================
// Check settings
// ============================================================================

/// Style linter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinterSettings {
    pub enabled: bool,
    /// Style checker binary.
    pub tool: String,
    /// Formatter binary; its presence makes linter failures fixable.
    pub formatter: String,
    /// Import sorter binary, run after the formatter.
    pub import_sorter: String,
    /// Paths excluded from linting and fixing.
    pub exclude: Vec<String>,
    pub max_line_length: u32,
    /// Rule codes ignored by the style checker.
    pub ignore: Vec<String>,
    /// Offending lines kept in the result.
    pub max_details: usize,
    pub timeout_secs: u64,
}

impl Default for LinterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tool: "flake8".to_string(),
            formatter: "black".to_string(),
            import_sorter: "isort".to_string(),
            exclude: strings(&[".git", "__pycache__", "env", "venv", ".venv", "migrations"]),
            max_line_length: 88,
            ignore: strings(&["D100", "D101", "D102", "D103", "D104", "D400", "D401"]),
            max_details: 5,
            timeout_secs: 60,
        }
    }
}

/// Test suite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSettings {
    pub enabled: bool,
    /// Test runner argv.
    pub command: Vec<String>,
    /// Restrict the run to one module/app label.
    pub test_module: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: strings(&["python", "manage.py", "test"]),
            test_module: None,
            timeout_secs: 120,
        }
    }
}

/// Framework configuration check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    pub enabled: bool,
    /// Management entry point argv (`check`, `makemigrations` are appended).
    pub manage_command: Vec<String>,
    /// Run the stricter deploy-mode pass.
    pub check_deploy: bool,
    /// Detect model changes without migrations.
    pub check_migrations: bool,
    /// Generate missing migrations during evaluation (after confirmation).
    pub auto_migrate: bool,
    pub timeout_secs: u64,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            manage_command: strings(&["python", "manage.py"]),
            check_deploy: false,
            check_migrations: true,
            auto_migrate: false,
            timeout_secs: 60,
        }
    }
}

/// Security scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub enabled: bool,
    /// Scanner tools to run; recognised names are `bandit` and `safety`.
    pub tools: Vec<String>,
    /// Run the secret detector against its baseline.
    pub check_secrets: bool,
    /// Secret detector binary.
    pub secrets_tool: String,
    /// Baseline file, relative to the project directory.
    pub baseline_file: String,
    /// Run the built-in dangerous-pattern scan.
    pub check_patterns: bool,
    /// Directory names skipped by the static scanner and the pattern scan.
    pub exclude_dirs: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tools: strings(&["bandit", "safety"]),
            check_secrets: true,
            secrets_tool: "detect-secrets".to_string(),
            baseline_file: ".secrets.baseline".to_string(),
            check_patterns: true,
            exclude_dirs: strings(&[
                "env",
                "venv",
                ".venv",
                "__pycache__",
                "migrations",
                ".git",
                "scripts",
                "node_modules",
            ]),
            timeout_secs: 120,
        }
    }
}

/// Sensitive file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSettings {
    pub enabled: bool,
    /// Paths that must never be committed.
    pub forbidden_files: Vec<String>,
    pub check_gitignore: bool,
    /// Entries `.gitignore` must contain.
    pub gitignore_required: Vec<String>,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            forbidden_files: strings(&[".env", "db.sqlite3", ".secrets", "credentials.json"]),
            check_gitignore: true,
            gitignore_required: strings(&[".env", "db.sqlite3", "__pycache__/", "*.pyc"]),
        }
    }
}

/// Version-control metadata settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    pub enabled: bool,
    pub check_staged_files: bool,
    pub conventional_commits: bool,
    /// Commit types accepted by the conventional format.
    pub allowed_types: Vec<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_staged_files: true,
            conventional_commits: true,
            allowed_types: strings(&["feat", "fix", "docs", "style", "refactor", "test", "chore"]),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl GuardConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields [`GuardConfig::default`]. Files ending in
    /// `.toml` are parsed as TOML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Config`] if the file cannot be read or parsed,
    /// and [`GuardError::InvalidConfig`] if a value is out of range.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            GuardError::config_with_path(format!("cannot read file: {}", e), path.to_path_buf())
        })?;

        let config = Self::parse(&content, path)?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse configuration text; the path selects the format and labels errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed = if is_toml {
            toml::from_str::<Self>(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Self>(content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| GuardError::config_with_path(message, path.to_path_buf()))
    }

    /// Resolve a configuration path against the project directory.
    #[must_use]
    pub fn resolve_path(project_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_dir.join(path)
        }
    }

    /// Reject values that would make a check meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let checks = &self.checks;
        let invalid = |field: &str, reason: &str| GuardError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if checks.linter.max_line_length == 0 {
            return Err(invalid("checks.linter.max_line_length", "must be positive"));
        }
        if checks.tests.enabled && checks.tests.command.is_empty() {
            return Err(invalid("checks.tests.command", "must not be empty"));
        }
        if checks.framework.enabled && checks.framework.manage_command.is_empty() {
            return Err(invalid("checks.framework.manage_command", "must not be empty"));
        }
        if checks.git.conventional_commits && checks.git.allowed_types.is_empty() {
            return Err(invalid("checks.git.allowed_types", "must list at least one type"));
        }
        if self.tools.auto_install && self.tools.install_command.is_empty() {
            return Err(invalid("tools.install_command", "must not be empty"));
        }
        Ok(())
    }

    /// Resolve the immutable run policy from the file and CLI overrides.
    #[must_use]
    pub fn policy(&self, overrides: &Overrides) -> RunPolicy {
        let mut policy = RunPolicy {
            strict_mode: self.strict_mode,
            auto_fix: self.auto_fix,
            interactive: self.interactive,
        };

        if overrides.fix {
            policy.auto_fix = true;
        }
        if overrides.assume_yes || overrides.from_hook {
            policy.interactive = false;
            policy.auto_fix = true;
        }
        if overrides.no_strict {
            policy.strict_mode = false;
        }

        policy
    }
}

// ============================================================================
// Run policy
// ============================================================================

/// Command-line switches that override the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// `--fix`
    pub fix: bool,
    /// `--yes`
    pub assume_yes: bool,
    /// `--from-hook`
    pub from_hook: bool,
    /// `--no-strict`
    pub no_strict: bool,
}

/// The three switches that govern a run, fixed before the first check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPolicy {
    pub strict_mode: bool,
    pub auto_fix: bool,
    pub interactive: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        GuardConfig::default().policy(&Overrides::default())
    }
}
