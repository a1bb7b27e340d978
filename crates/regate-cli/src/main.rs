//! Regate - regression validation gate CLI
//!
//! The `regate` command compares a run against a recorded baseline and
//! fails the build on unexempted regressions.
//!
//! ## Commands
//!
//! - `create-baseline`: Run all checks and record their outputs
//! - `validate`: Run all checks, compare, apply the whitelist, decide
//! - `whitelist`: List rules or move them through their lifecycle
//! - `audit`: Show the audit report of the most recent validation
//!
//! Exit codes: 0 passed, 1 validation failed, 2 fatal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regate_core::telemetry::init_tracing;
use regate_core::{
    read_validation_report, render_audit_report, render_summary_md, BaselineMode, BaselineStore,
    Clock, RuleStatus, StrictValidationConfig, StrictValidator, SystemClock, WhitelistError,
    WhitelistManager,
};
use serde::Serialize;
use tracing::{info, Level};

/// Config file picked up from the project root when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "regate.toml";

#[derive(Parser)]
#[command(name = "regate")]
#[command(author = "Stevedores Org")]
#[command(version = regate_core::VERSION)]
#[command(about = "Regression validation gate with audited whitelist exemptions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Path to a TOML config file (default: <project-root>/regate.toml if present)
    #[arg(long, global = true, env = "REGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Root of the project under validation
    #[arg(long, global = true, env = "REGATE_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check once and record the outputs as the new baseline
    CreateBaseline {
        /// Directory holding baseline.json
        #[arg(long, env = "REGATE_BASELINE_DIR")]
        baseline_dir: Option<PathBuf>,
    },

    /// Validate the project against its baseline
    Validate {
        /// Require a stored baseline; fail if none exists
        #[arg(long)]
        load_baseline: bool,

        /// Whitelist rule file (JSON, TOML or YAML)
        #[arg(long, env = "REGATE_WHITELIST")]
        whitelist: Option<PathBuf>,

        /// Report issues without failing the run
        #[arg(long)]
        no_strict: bool,

        /// Directory for validation and audit reports
        #[arg(long, env = "REGATE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Directory holding baseline.json
        #[arg(long, env = "REGATE_BASELINE_DIR")]
        baseline_dir: Option<PathBuf>,
    },

    /// Administer whitelist rules
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },

    /// Show the audit report of the most recent validation
    Audit {
        /// Directory the reports were written to
        #[arg(long, env = "REGATE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum WhitelistAction {
    /// List rules with their effective status
    List {
        #[arg(long)]
        file: PathBuf,
    },
    /// Approve a rule pending review
    Approve {
        #[arg(long)]
        file: PathBuf,
        rule_id: String,
    },
    /// Reject a rule pending review
    Reject {
        #[arg(long)]
        file: PathBuf,
        rule_id: String,
    },
    /// Revoke an active rule
    Revoke {
        #[arg(long)]
        file: PathBuf,
        rule_id: String,
    },
    /// Reinstate a revoked rule
    Reinstate {
        #[arg(long)]
        file: PathBuf,
        rule_id: String,
    },
}

/// Outcome of a command that completed without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Passed,
    Failed,
}

impl From<Verdict> for ExitCode {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Passed => ExitCode::SUCCESS,
            Verdict::Failed => ExitCode::from(1),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match run(cli).await {
        Ok(verdict) => verdict.into(),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<Verdict> {
    let json = cli.json;
    match cli.command {
        Commands::CreateBaseline { baseline_dir } => {
            let mut config = load_config(cli.config.as_deref(), cli.project_root.as_deref())?;
            if let Some(dir) = baseline_dir {
                config.baseline_dir = dir;
            }
            cmd_create_baseline(config, json).await
        }
        Commands::Validate {
            load_baseline,
            whitelist,
            no_strict,
            output_dir,
            baseline_dir,
        } => {
            let mut config = load_config(cli.config.as_deref(), cli.project_root.as_deref())?;
            if load_baseline {
                config.baseline_mode = BaselineMode::Required;
            }
            if whitelist.is_some() {
                config.whitelist_path = whitelist;
            }
            if no_strict {
                config.strict_mode = false;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(dir) = baseline_dir {
                config.baseline_dir = dir;
            }
            cmd_validate(config, json).await
        }
        Commands::Whitelist { action } => cmd_whitelist(action, json),
        Commands::Audit { output_dir } => {
            let mut config = load_config(cli.config.as_deref(), cli.project_root.as_deref())?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            cmd_audit(&config, json)
        }
    }
}

/// Resolve configuration: explicit file, else `<root>/regate.toml`, else defaults.
fn load_config(path: Option<&Path>, project_root: Option<&Path>) -> Result<StrictValidationConfig> {
    let root = project_root.map(Path::to_path_buf);
    let default_file = root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONFIG_FILE);

    let mut config = match path {
        Some(p) => StrictValidationConfig::from_toml_file(p)
            .with_context(|| format!("load config {}", p.display()))?,
        None if default_file.is_file() => StrictValidationConfig::from_toml_file(&default_file)
            .with_context(|| format!("load config {}", default_file.display()))?,
        None => StrictValidationConfig::default(),
    };
    if let Some(root) = root {
        config.project_root = root;
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Record a new baseline.
async fn cmd_create_baseline(config: StrictValidationConfig, json: bool) -> Result<Verdict> {
    let validator = StrictValidator::new(config).context("Failed to set up validator")?;
    let baseline = validator
        .create_baseline()
        .await
        .context("Failed to create baseline")?;
    let location = validator.baseline_store().location();
    info!(path = %location.display(), "baseline created");

    if json {
        print_json(&baseline)?;
    } else {
        println!("Baseline written to {}", location.display());
        println!("  metrics:  {}", baseline.metrics().len());
        println!("  outcomes: {}", baseline.outcomes().len());
    }
    Ok(Verdict::Passed)
}

/// Validate against the baseline and print the summary.
async fn cmd_validate(config: StrictValidationConfig, json: bool) -> Result<Verdict> {
    let mut validator = StrictValidator::new(config).context("Failed to set up validator")?;
    let result = validator.validate_all().await.context("Validation aborted")?;

    if json {
        print_json(&result)?;
    } else {
        print!("{}", render_summary_md(&result));
        if result.suppressed_count() > 0 {
            println!();
            print!("{}", render_audit_report(&validator.audit_report()));
        }
    }

    Ok(if result.overall_passed() {
        Verdict::Passed
    } else {
        Verdict::Failed
    })
}

/// A lifecycle operation on a loaded whitelist.
type Transition = fn(&mut WhitelistManager, &str) -> Result<(), WhitelistError>;

/// List rules, or apply a lifecycle transition and save the file.
fn cmd_whitelist(action: WhitelistAction, json: bool) -> Result<Verdict> {
    let now = SystemClock.now();
    let (file, change): (PathBuf, Option<(&str, Transition, String)>) = match action {
        WhitelistAction::List { file } => (file, None),
        WhitelistAction::Approve { file, rule_id } => {
            (file, Some(("approve", WhitelistManager::approve as Transition, rule_id)))
        }
        WhitelistAction::Reject { file, rule_id } => {
            (file, Some(("reject", WhitelistManager::reject as Transition, rule_id)))
        }
        WhitelistAction::Revoke { file, rule_id } => {
            (file, Some(("revoke", WhitelistManager::revoke as Transition, rule_id)))
        }
        WhitelistAction::Reinstate { file, rule_id } => {
            (file, Some(("reinstate", WhitelistManager::reinstate as Transition, rule_id)))
        }
    };

    let mut whitelist = WhitelistManager::load(&file)
        .with_context(|| format!("load whitelist {}", file.display()))?;

    if let Some((name, transition, rule_id)) = change {
        transition(&mut whitelist, &rule_id).with_context(|| format!("{} {}", name, rule_id))?;
        let expired = whitelist.refresh_expiry(now);
        if expired > 0 {
            info!(expired, "marking lapsed rules expired before save");
        }
        whitelist
            .save(&file, now)
            .with_context(|| format!("save whitelist {}", file.display()))?;
        println!("{}: {} ({})", name, rule_id, file.display());
        return Ok(Verdict::Passed);
    }

    if json {
        print_json(&whitelist.rules())?;
        return Ok(Verdict::Passed);
    }

    for rule in whitelist.rules() {
        let effective = if rule.status() == RuleStatus::Active && rule.is_expired_at(now) {
            "expired".to_string()
        } else {
            rule.status().to_string()
        };
        let expiry = rule
            .expiry()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<24} {:<15} max={:<9} expires={:<12} {}",
            rule.rule_id(),
            effective,
            rule.max_severity().to_string(),
            expiry,
            rule.pattern()
        );
        if let Some(why) = rule.invalid_reason() {
            println!("    inert: {}", why);
        }
    }
    let stats = whitelist.stats(now);
    println!(
        "\n{} rules: {} active, {} expired, {} pending review, {} revoked, {} invalid",
        stats.total_rules, stats.active, stats.expired, stats.pending_review, stats.revoked, stats.invalid
    );
    Ok(Verdict::Passed)
}

/// Show the latest audit report after verifying the latest validation report.
fn cmd_audit(config: &StrictValidationConfig, json: bool) -> Result<Verdict> {
    let dir = config.resolved_output_dir();
    let result = read_validation_report(&dir)
        .with_context(|| format!("read validation report in {}; run `regate validate` first", dir.display()))?;
    let report = regate_core::reporting::read_audit_report(&dir)
        .with_context(|| format!("read audit report in {}", dir.display()))?;
    let history = regate_core::reporting::read_audit_history(&dir)
        .with_context(|| format!("read audit history in {}", dir.display()))?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Last run {} at {}: {}",
            result.run_id(),
            result.created_at().to_rfc3339(),
            if result.overall_passed() { "PASSED" } else { "FAILED" }
        );
        println!("Suppressions across all recorded runs: {}", history.len());
        println!();
        print!("{}", render_audit_report(&report));
    }
    Ok(Verdict::Passed)
}
