//! Whitelist rules and their lifecycle status.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Category, Severity, ValidationIssue};

/// Lifecycle status of a whitelist rule.
///
/// ```text
/// pending_review ──approve──▶ active ──revoke──▶ revoked
///        │                      ▲  │                │
///        └──────reject──────────┼──┼───────────────▶│
///                               │  └─expiry─▶ expired
///                               └───reinstate───────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Active,
    PendingReview,
    Expired,
    Revoked,
}

impl RuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::PendingReview => "pending_review",
            RuleStatus::Expired => "expired",
            RuleStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_max_severity() -> Severity {
    Severity::Error
}

/// A documented, approved, optionally time-boxed exemption.
///
/// Patterns are compiled once at construction. A pattern (or file pattern)
/// that fails to compile leaves the rule inert: [`WhitelistRule::invalid_reason`]
/// is set and the rule never matches.
#[derive(Debug, Clone, Serialize)]
pub struct WhitelistRule {
    rule_id: String,
    pattern: String,
    reason: String,
    approved_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_pattern: Option<String>,
    max_severity: Severity,
    status: RuleStatus,
    #[serde(skip)]
    compiled: Option<Regex>,
    #[serde(skip)]
    compiled_file: Option<Regex>,
    #[serde(skip)]
    invalid: Option<String>,
}

impl WhitelistRule {
    /// Create an active rule that never expires, covering up to `Error`.
    pub fn new(
        rule_id: impl Into<String>,
        pattern: impl Into<String>,
        reason: impl Into<String>,
        approved_by: impl Into<String>,
    ) -> Self {
        let mut rule = Self {
            rule_id: rule_id.into(),
            pattern: pattern.into(),
            reason: reason.into(),
            approved_by: approved_by.into(),
            created_at: None,
            expires_at: None,
            category: None,
            file_pattern: None,
            max_severity: default_max_severity(),
            status: RuleStatus::Active,
            compiled: None,
            compiled_file: None,
            invalid: None,
        };
        rule.compile();
        rule
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_file_pattern(mut self, file_pattern: impl Into<String>) -> Self {
        self.file_pattern = Some(file_pattern.into());
        self.compile();
        self
    }

    pub fn with_max_severity(mut self, max_severity: Severity) -> Self {
        self.max_severity = max_severity;
        self
    }

    /// Expiry as a unix timestamp in seconds.
    pub fn expires_at(mut self, epoch_secs: i64) -> Self {
        self.expires_at = Some(epoch_secs);
        self
    }

    pub fn created_at(mut self, epoch_secs: i64) -> Self {
        self.created_at = Some(epoch_secs);
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    fn compile(&mut self) {
        self.invalid = None;
        self.compiled = match Regex::new(&self.pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                self.invalid = Some(format!("invalid pattern '{}': {}", self.pattern, e));
                None
            }
        };
        self.compiled_file = match self.file_pattern.as_deref().map(Regex::new) {
            None => None,
            Some(Ok(re)) => Some(re),
            Some(Err(e)) => {
                self.invalid.get_or_insert_with(|| {
                    format!(
                        "invalid file_pattern '{}': {}",
                        self.file_pattern.as_deref().unwrap_or_default(),
                        e
                    )
                });
                None
            }
        };
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn approved_by(&self) -> &str {
        &self.approved_by
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn file_pattern(&self) -> Option<&str> {
        self.file_pattern.as_deref()
    }

    pub fn max_severity(&self) -> Severity {
        self.max_severity
    }

    pub fn status(&self) -> RuleStatus {
        self.status
    }

    pub fn expiry(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn creation(&self) -> Option<i64> {
        self.created_at
    }

    /// Why the rule is inert, if one of its patterns failed to compile.
    pub fn invalid_reason(&self) -> Option<&str> {
        self.invalid.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }

    pub(crate) fn set_status(&mut self, status: RuleStatus) {
        self.status = status;
    }

    /// Whether the expiry timestamp has been reached at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now.timestamp() >= exp)
    }

    /// Active status, not past expiry and with valid patterns.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RuleStatus::Active && !self.is_expired_at(now) && self.is_valid()
    }

    /// Matching conditions (a)–(e): active, pattern, category, file path, severity cap.
    ///
    /// The `Blocker` gate is not applied here; the manager checks it before
    /// consulting any rule.
    pub fn matches(&self, issue: &ValidationIssue, now: DateTime<Utc>) -> bool {
        if !self.is_active_at(now) {
            return false;
        }
        let Some(re) = &self.compiled else {
            return false;
        };
        if !re.is_match(issue.id()) {
            return false;
        }
        if self.category.is_some_and(|c| c != issue.category()) {
            return false;
        }
        if let Some(file_re) = &self.compiled_file {
            match issue.file_path() {
                Some(path) if file_re.is_match(path) => {}
                _ => return false,
            }
        }
        issue.severity() <= self.max_severity
    }
}
