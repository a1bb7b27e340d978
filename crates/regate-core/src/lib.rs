//! Regate Core Library
//!
//! Regression validation with time-boxed whitelist exemptions: run checks,
//! compare against a recorded baseline, classify deviations by severity,
//! suppress documented exceptions (never structural breakage) and decide
//! whether a run may proceed to deployment.

pub mod baseline_store;
pub mod builtin;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
mod fsutil;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod suite;
pub mod telemetry;
pub mod validator;
pub mod whitelist;

pub use baseline_store::{BaselineStore, FsBaselineStore, InMemoryBaselineStore};

pub use classifier::SeverityClassifier;

pub use clock::{Clock, FixedClock, SystemClock};

pub use config::{BaselineMode, StrictValidationConfig};

pub use domain::{
    issue_id, Baseline, Category, ConfigError, RegateError, Result, Severity, ValidationIssue,
    ValidationResult, WhitelistError, BASELINE_SCHEMA_VERSION, SUPPRESSION_MARKER,
};

pub use engine::{
    relative_delta, structural_difference, EngineConfig, ExecutionOutcome, FindingKind,
    MetricComparison, RawFinding, RegressionEngine, TestExecution,
};

pub use reporting::{
    read_audit_history, read_validation_report, render_audit_report, render_summary_md,
    run_stamp, write_audit_report, write_validation_report, AuditReport, RuleSummary,
};

pub use suite::{
    CheckOutput, FnCheck, Metric, MetricDirection, RegressionCheck, RegressionSuite,
    RegressionTest, RunContext,
};

pub use validator::StrictValidator;

pub use whitelist::{
    AuditEntry, AuditTrail, RuleStatus, WhitelistManager, WhitelistRule, WhitelistStats,
};

/// Crate version, as reported by `regate --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
