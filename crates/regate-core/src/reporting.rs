//! Validation and audit report rendering and persistence.
//!
//! Files written to the output directory:
//!
//! ```text
//! validation_<stamp>.json      one per run
//! validation_latest.json        copy of the most recent run
//! validation_latest.digest      sha256 hex of validation_latest.json
//! audit_<stamp>.json            audit report of one run, kept as history
//! audit_latest.json             audit report of the most recent run
//! ```
//!
//! `<stamp>` is the run's creation time followed by the first eight hex
//! digits of its run id, so files sort chronologically and two runs in the
//! same millisecond do not collide.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{RegateError, Result, Severity, ValidationResult};
use crate::fsutil::write_atomic;
use crate::whitelist::{AuditEntry, RuleStatus, WhitelistManager, WhitelistRule, WhitelistStats};

pub const LATEST_REPORT: &str = "validation_latest.json";
pub const LATEST_DIGEST: &str = "validation_latest.digest";
pub const LATEST_AUDIT: &str = "audit_latest.json";

const AUDIT_PREFIX: &str = "audit_";

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Short rule description used in audit reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub rule_id: String,
    pub pattern: String,
    pub reason: String,
    pub approved_by: String,
    pub status: RuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl From<&WhitelistRule> for RuleSummary {
    fn from(rule: &WhitelistRule) -> Self {
        Self {
            rule_id: rule.rule_id().to_string(),
            pattern: rule.pattern().to_string(),
            reason: rule.reason().to_string(),
            approved_by: rule.approved_by().to_string(),
            status: rule.status(),
            expires_at: rule.expiry(),
            invalid_reason: rule.invalid_reason().map(str::to_string),
        }
    }
}

/// Exemption activity for one run plus the state of the rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub stats: WhitelistStats,
    /// Suppressions recorded during the run.
    pub entries: Vec<AuditEntry>,
    pub expired_rules: Vec<RuleSummary>,
    pub pending_rules: Vec<RuleSummary>,
    pub invalid_rules: Vec<RuleSummary>,
}

impl AuditReport {
    /// Build a report covering `entries` against the current rule set.
    pub fn build(whitelist: &WhitelistManager, entries: &[AuditEntry], now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            stats: whitelist.stats(now),
            entries: entries.to_vec(),
            expired_rules: whitelist.expired_rules(now).map(RuleSummary::from).collect(),
            pending_rules: whitelist.pending_rules().map(RuleSummary::from).collect(),
            invalid_rules: whitelist.invalid_rules().map(RuleSummary::from).collect(),
        }
    }
}

/// Render a markdown summary of a validation result.
pub fn render_summary_md(result: &ValidationResult) -> String {
    let mut out = String::new();
    let verdict = if result.overall_passed() { "PASSED" } else { "FAILED" };
    let _ = writeln!(out, "# Validation {}\n", verdict);
    let _ = writeln!(out, "- run: `{}`", result.run_id());
    let _ = writeln!(out, "- at: {}", result.created_at().to_rfc3339());
    let _ = writeln!(out, "- strict mode: {}", result.strict_mode());
    let _ = writeln!(
        out,
        "- issues: {} ({} suppressed)\n",
        result.issues().len(),
        result.suppressed_count()
    );

    out.push_str("## Severity Counts\n");
    for severity in Severity::ALL.iter().rev() {
        let _ = writeln!(out, "- {}: {}", severity, result.count(*severity));
    }
    out.push('\n');

    if !result.issues().is_empty() {
        out.push_str("## Issues\n");
        for issue in result.issues() {
            let _ = write!(out, "- **{}** `{}`: {}", issue.severity(), issue.id(), issue.description());
            if let Some(path) = issue.file_path() {
                let _ = write!(out, " ({})", path);
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !result.overall_passed() {
        out.push_str("## Blocking\n");
        for issue in result.blocking_issues() {
            let _ = writeln!(out, "- `{}` [{}]", issue.id(), issue.severity());
        }
    }
    out
}

/// Render the audit report as plain text.
pub fn render_audit_report(report: &AuditReport) -> String {
    let mut out = String::new();
    let s = &report.stats;
    let _ = writeln!(out, "Whitelist audit ({})", report.generated_at.to_rfc3339());
    let _ = writeln!(
        out,
        "rules: {} total, {} active, {} expired, {} pending review, {} revoked, {} invalid",
        s.total_rules, s.active, s.expired, s.pending_review, s.revoked, s.invalid
    );
    let _ = writeln!(out, "suppressions (all time): {}", s.total_suppressions);

    let _ = writeln!(out, "\nSuppressed this run: {}", report.entries.len());
    for e in &report.entries {
        let _ = writeln!(
            out,
            "  {} {} by rule '{}' (was {})",
            e.timestamp.to_rfc3339(),
            e.issue_id,
            e.rule_id,
            e.original_severity
        );
    }

    for (title, rules) in [
        ("Expired rules", &report.expired_rules),
        ("Pending review", &report.pending_rules),
        ("Invalid rules", &report.invalid_rules),
    ] {
        if rules.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}:", title);
        for r in rules {
            let _ = write!(out, "  {} ({}, approved by {})", r.rule_id, r.reason, r.approved_by);
            if let Some(why) = &r.invalid_reason {
                let _ = write!(out, ": {}", why);
            }
            out.push('\n');
        }
    }
    out
}

/// File-name stamp shared by a run's validation and audit reports.
pub fn run_stamp(result: &ValidationResult) -> String {
    let run = result.run_id().simple().to_string();
    format!(
        "{}_{}",
        result.created_at().format("%Y%m%d_%H%M%S_%3f"),
        &run[..8]
    )
}

/// Persist a validation result. Returns the path of the timestamped report.
pub fn write_validation_report(dir: &Path, result: &ValidationResult) -> Result<PathBuf> {
    let content = serde_json::to_vec_pretty(result)?;
    let path = dir.join(format!("validation_{}.json", run_stamp(result)));

    write_atomic(&path, &content)?;
    write_atomic(&dir.join(LATEST_REPORT), &content)?;
    write_atomic(&dir.join(LATEST_DIGEST), sha256_hex(&content).as_bytes())?;
    tracing::debug!(path = %path.display(), "validation report written");
    Ok(path)
}

/// Load `validation_latest.json`, verifying it against its digest sidecar.
pub fn read_validation_report(dir: &Path) -> Result<ValidationResult> {
    let content = std::fs::read(dir.join(LATEST_REPORT))?;
    let expected = std::fs::read_to_string(dir.join(LATEST_DIGEST))?
        .trim()
        .to_string();
    let actual = sha256_hex(&content);
    if expected != actual {
        return Err(RegateError::DigestMismatch { expected, actual });
    }
    Ok(serde_json::from_slice(&content)?)
}

/// Persist the audit report of the run stamped `stamp`, both as a history
/// file and as `audit_latest.json`. Returns the history file's path.
pub fn write_audit_report(dir: &Path, stamp: &str, report: &AuditReport) -> Result<PathBuf> {
    let content = serde_json::to_vec_pretty(report)?;
    let path = dir.join(format!("{}{}.json", AUDIT_PREFIX, stamp));
    write_atomic(&path, &content)?;
    write_atomic(&dir.join(LATEST_AUDIT), &content)?;
    Ok(path)
}

pub fn read_audit_report(dir: &Path) -> Result<AuditReport> {
    let content = std::fs::read(dir.join(LATEST_AUDIT))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Every suppression recorded by past runs, oldest run first.
///
/// A missing output directory is an empty history.
pub fn read_audit_history(dir: &Path) -> Result<Vec<AuditEntry>> {
    let listing = match std::fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in listing {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with(AUDIT_PREFIX) && name.ends_with(".json") && name != LATEST_AUDIT {
            files.push(name);
        }
    }
    files.sort();

    let mut entries = Vec::new();
    for name in files {
        let content = std::fs::read(dir.join(&name))?;
        let report: AuditReport = serde_json::from_slice(&content)?;
        entries.extend(report.entries);
    }
    Ok(entries)
}
