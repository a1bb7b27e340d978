//! Validation issues and the per-run result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::severity::{Category, Severity};

/// Prefix added to the description of every suppressed issue.
pub const SUPPRESSION_MARKER: &str = "[SUPPRESSED]";

/// Stable issue id used for whitelist matching: `<category>:<test_id>`.
pub fn issue_id(category: Category, test_id: &str) -> String {
    format!("{}:{}", category, test_id)
}

/// A classified finding.
///
/// # Invariants
///
/// - `original_severity.is_some() == suppressed`.
/// - A `Blocker` issue is never suppressed; [`ValidationIssue::suppress`]
///   refuses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    id: String,
    test_id: String,
    severity: Severity,
    category: Category,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<f64>,
    suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suppressed_by: Option<String>,
}

impl ValidationIssue {
    /// Create an unsuppressed issue. The id is derived from category and test id.
    pub fn new(
        test_id: impl Into<String>,
        category: Category,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        let test_id = test_id.into();
        Self {
            id: issue_id(category, &test_id),
            test_id,
            severity,
            category,
            description: description.into(),
            file_path: None,
            delta: None,
            suppressed: false,
            original_severity: None,
            suppressed_by: None,
        }
    }

    pub fn with_file_path(mut self, file_path: Option<String>) -> Self {
        self.file_path = file_path;
        self
    }

    pub fn with_delta(mut self, delta: Option<f64>) -> Self {
        self.delta = delta;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn delta(&self) -> Option<f64> {
        self.delta
    }

    pub fn suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn original_severity(&self) -> Option<Severity> {
        self.original_severity
    }

    pub fn suppressed_by(&self) -> Option<&str> {
        self.suppressed_by.as_deref()
    }

    /// Downgrade to `Info` on behalf of `rule_id`.
    ///
    /// Returns the severity prior to the downgrade, or `None` when the issue
    /// is a `Blocker` or already suppressed (left untouched).
    pub(crate) fn suppress(&mut self, rule_id: &str) -> Option<Severity> {
        if self.severity == Severity::Blocker || self.suppressed {
            return None;
        }
        let original = self.severity;
        self.original_severity = Some(original);
        self.severity = Severity::Info;
        self.description = format!("{} {}", SUPPRESSION_MARKER, self.description);
        self.suppressed = true;
        self.suppressed_by = Some(rule_id.to_string());
        Some(original)
    }
}

/// Outcome of one validation run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    run_id: Uuid,
    created_at: DateTime<Utc>,
    issues: Vec<ValidationIssue>,
    overall_passed: bool,
    strict_mode: bool,
    counts: BTreeMap<Severity, usize>,
    suppressed_count: usize,
}

impl ValidationResult {
    /// Aggregate whitelisted issues into a result.
    ///
    /// The run fails only in strict mode, and only when an issue remains at
    /// `Error` or above after whitelist processing.
    pub fn from_issues(issues: Vec<ValidationIssue>, strict_mode: bool, now: DateTime<Utc>) -> Self {
        let mut counts: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for issue in &issues {
            *counts.entry(issue.severity).or_insert(0) += 1;
        }
        let suppressed_count = issues.iter().filter(|i| i.suppressed).count();
        let has_blocking = issues.iter().any(|i| i.severity.is_blocking());

        Self {
            run_id: Uuid::new_v4(),
            created_at: now,
            issues,
            overall_passed: !(strict_mode && has_blocking),
            strict_mode,
            counts,
            suppressed_count,
        }
    }

    /// Replace the generated run id, so the result matches the run's span.
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn overall_passed(&self) -> bool {
        self.overall_passed
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn counts(&self) -> &BTreeMap<Severity, usize> {
        &self.counts
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.counts.get(&severity).copied().unwrap_or(0)
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed_count
    }

    /// Unsuppressed issues at `Error` or above.
    pub fn blocking_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity.is_blocking())
    }

    pub fn issue(&self, id: &str) -> Option<&ValidationIssue> {
        self.issues.iter().find(|i| i.id == id)
    }
}
