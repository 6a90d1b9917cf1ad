//! commitguard - pre-commit validation pipeline
//!
//! Runs the configured checks and exits `0` when the commit may proceed,
//! `1` when it must not, and `130` when the operator interrupts a prompt.

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use commitguard::{
    confirmer_for, CheckKind, ConsoleReporter, GuardConfig, GuardError, Overrides, Pipeline,
    PromptStream, SystemRunner, DEFAULT_CONFIG_PATH,
};

#[derive(Parser, Debug)]
#[command(name = "commitguard")]
#[command(version)]
#[command(about = "Pre-commit quality and security checks with automatic repair", long_about = None)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Configuration file (JSON, or TOML when it ends in .toml), relative to the project
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable automatic fixes
    #[arg(short, long)]
    fix: bool,

    /// Never prompt; answer every question with the auto-fix setting
    #[arg(short, long)]
    yes: bool,

    /// Hook mode: non-interactive with automatic fixes
    #[arg(long)]
    from_hook: bool,

    /// Report every failure instead of stopping at the first one
    #[arg(long)]
    no_strict: bool,

    /// Run only these checks (comma-separated: linter,tests,framework,security,files,git)
    #[arg(long, value_name = "CHECKS")]
    only: Option<String>,

    /// Print the run report as JSON on stdout (progress goes to stderr)
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "commitguard=debug,info"
    } else {
        "commitguard=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) if e.is_interrupt() => {
            eprintln!("\n{} {}", "Interrupted:".yellow().bold(), e);
            e.exit_code()
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

fn run(cli: &Cli) -> commitguard::Result<i32> {
    let project = cli
        .project
        .canonicalize()
        .unwrap_or_else(|_| cli.project.clone());
    if !project.is_dir() {
        return Err(GuardError::config_with_path(
            format!("Project directory does not exist: {}", project.display()),
            project,
        ));
    }

    let only = cli
        .only
        .as_deref()
        .map(CheckKind::parse_list)
        .transpose()?;

    let config_path = GuardConfig::resolve_path(&project, &cli.config);
    let config = GuardConfig::load(&config_path)?;
    if !config.colors.enabled {
        colored::control::set_override(false);
    }

    let overrides = Overrides {
        fix: cli.fix,
        assume_yes: cli.yes,
        from_hook: cli.from_hook,
        no_strict: cli.no_strict,
    };
    let policy = config.policy(&overrides);
    debug!(?policy, config = %config_path.display(), "resolved run policy");

    // stdout carries only the JSON report
    let (reporter, prompts) = if cli.json {
        (ConsoleReporter::stderr(), PromptStream::Stderr)
    } else {
        (ConsoleReporter::stdout(), PromptStream::Stdout)
    };

    let mut pipeline = Pipeline::from_config(
        &project,
        &config,
        policy,
        only.as_deref(),
        Box::new(SystemRunner::new()?),
        confirmer_for(&policy, prompts),
    )
    .with_reporter(reporter);

    let report = pipeline.run()?;
    if cli.json {
        println!("{}", report.to_json()?);
    }

    Ok(report.exit_code())
}
