//! Rule matching, suppression and rule administration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditEntry, AuditTrail};
use super::rule::{RuleStatus, WhitelistRule};
use crate::domain::{ConfigError, Severity, ValidationIssue, WhitelistError};
use crate::metrics::METRICS;
use crate::obs;

/// Rule counts by effective status at a given instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistStats {
    pub total_rules: usize,
    pub active: usize,
    pub expired: usize,
    pub pending_review: usize,
    pub revoked: usize,
    pub invalid: usize,
    pub total_suppressions: usize,
}

/// Owns the rule list and the suppression audit trail.
///
/// Rules are consulted in list order; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct WhitelistManager {
    rules: Vec<WhitelistRule>,
    audit: AuditTrail,
}

impl WhitelistManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager from an ordered rule list, rejecting duplicate ids.
    pub fn with_rules(rules: Vec<WhitelistRule>) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        for rule in rules {
            manager.add_rule(rule)?;
        }
        Ok(manager)
    }

    /// Append a rule. Invalid patterns are accepted but logged and inert.
    pub fn add_rule(&mut self, rule: WhitelistRule) -> Result<(), ConfigError> {
        if self.get_rule(rule.rule_id()).is_some() {
            return Err(ConfigError::DuplicateRuleId(rule.rule_id().to_string()));
        }
        if let Some(reason) = rule.invalid_reason() {
            obs::emit_rule_invalid(rule.rule_id(), reason);
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[WhitelistRule] {
        &self.rules
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<&WhitelistRule> {
        self.rules.iter().find(|r| r.rule_id() == rule_id)
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    /// Move active rules whose expiry has been reached to `Expired`.
    /// Returns how many rules changed.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for rule in &mut self.rules {
            if rule.status() == RuleStatus::Active && rule.is_expired_at(now) {
                rule.set_status(RuleStatus::Expired);
                obs::emit_rule_expired(rule.rule_id(), rule.expiry().unwrap_or_default());
                changed += 1;
            }
        }
        changed
    }

    /// First rule that would suppress `issue` at `now`, if any.
    ///
    /// Always `None` for a `Blocker`, before any rule is consulted.
    pub fn find_match(&self, issue: &ValidationIssue, now: DateTime<Utc>) -> Option<&WhitelistRule> {
        if issue.severity() == Severity::Blocker {
            return None;
        }
        self.rules.iter().find(|r| r.matches(issue, now))
    }

    /// Apply the whitelist to `issues` in place.
    ///
    /// Each matching issue is downgraded to `Info`, marked suppressed and
    /// recorded in the audit trail. Already-suppressed issues are skipped,
    /// so applying twice changes nothing. Returns the number suppressed now.
    pub fn apply(&mut self, issues: &mut [ValidationIssue], now: DateTime<Utc>) -> usize {
        self.refresh_expiry(now);

        let mut suppressed = 0;
        for issue in issues.iter_mut() {
            if issue.suppressed() {
                continue;
            }
            let Some(rule_id) = self.find_match(issue, now).map(|r| r.rule_id().to_string())
            else {
                continue;
            };
            let Some(original_severity) = issue.suppress(&rule_id) else {
                continue;
            };
            self.audit.record(AuditEntry {
                issue_id: issue.id().to_string(),
                rule_id: rule_id.clone(),
                timestamp: now,
                original_severity,
            });
            METRICS.inc_issues_suppressed();
            obs::emit_issue_suppressed(issue.id(), &rule_id, original_severity);
            suppressed += 1;
        }
        suppressed
    }

    /// `pending_review` → `active`.
    pub fn approve(&mut self, rule_id: &str) -> Result<(), WhitelistError> {
        self.transition(rule_id, "approve", RuleStatus::PendingReview, RuleStatus::Active)
    }

    /// `pending_review` → `revoked`.
    pub fn reject(&mut self, rule_id: &str) -> Result<(), WhitelistError> {
        self.transition(rule_id, "reject", RuleStatus::PendingReview, RuleStatus::Revoked)
    }

    /// `active` → `revoked`.
    pub fn revoke(&mut self, rule_id: &str) -> Result<(), WhitelistError> {
        self.transition(rule_id, "revoke", RuleStatus::Active, RuleStatus::Revoked)
    }

    /// `revoked` → `active`. An expiry in the past still applies afterwards.
    pub fn reinstate(&mut self, rule_id: &str) -> Result<(), WhitelistError> {
        self.transition(rule_id, "reinstate", RuleStatus::Revoked, RuleStatus::Active)
    }

    fn transition(
        &mut self,
        rule_id: &str,
        action: &'static str,
        from: RuleStatus,
        to: RuleStatus,
    ) -> Result<(), WhitelistError> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.rule_id() == rule_id)
            .ok_or_else(|| WhitelistError::RuleNotFound(rule_id.to_string()))?;
        if rule.status() != from {
            return Err(WhitelistError::InvalidTransition {
                rule_id: rule_id.to_string(),
                from: rule.status(),
                action,
            });
        }
        rule.set_status(to);
        tracing::info!(event = "rule.transitioned", rule_id = %rule_id, action = action, to = %to);
        Ok(())
    }

    /// Rules that can currently suppress issues.
    pub fn active_rules(&self, now: DateTime<Utc>) -> impl Iterator<Item = &WhitelistRule> + '_ {
        self.rules.iter().filter(move |r| r.is_active_at(now))
    }

    /// Rules marked expired, plus active rules whose expiry has passed.
    pub fn expired_rules(&self, now: DateTime<Utc>) -> impl Iterator<Item = &WhitelistRule> + '_ {
        self.rules.iter().filter(move |r| match r.status() {
            RuleStatus::Expired => true,
            RuleStatus::Active => r.is_expired_at(now),
            _ => false,
        })
    }

    pub fn pending_rules(&self) -> impl Iterator<Item = &WhitelistRule> + '_ {
        self.rules
            .iter()
            .filter(|r| r.status() == RuleStatus::PendingReview)
    }

    pub fn revoked_rules(&self) -> impl Iterator<Item = &WhitelistRule> + '_ {
        self.rules.iter().filter(|r| r.status() == RuleStatus::Revoked)
    }

    /// Rules whose pattern or file pattern failed to compile.
    pub fn invalid_rules(&self) -> impl Iterator<Item = &WhitelistRule> + '_ {
        self.rules.iter().filter(|r| !r.is_valid())
    }

    pub fn stats(&self, now: DateTime<Utc>) -> WhitelistStats {
        WhitelistStats {
            total_rules: self.rules.len(),
            active: self.active_rules(now).count(),
            expired: self.expired_rules(now).count(),
            pending_review: self.pending_rules().count(),
            revoked: self.revoked_rules().count(),
            invalid: self.invalid_rules().count(),
            total_suppressions: self.audit.len(),
        }
    }
}
