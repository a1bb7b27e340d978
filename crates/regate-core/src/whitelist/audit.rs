//! Append-only record of suppressions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Severity;

/// One suppression: which rule downgraded which issue, when, and from what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub issue_id: String,
    pub rule_id: String,
    pub timestamp: DateTime<Utc>,
    pub original_severity: Severity,
}

/// Ordered suppression history. Entries are only ever appended; nothing
/// outside the crate can edit or remove them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded on behalf of `rule_id`, oldest first.
    pub fn for_rule<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        self.entries.iter().filter(move |e| e.rule_id == rule_id)
    }

    pub fn for_issue<'a>(&'a self, issue_id: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        self.entries.iter().filter(move |e| e.issue_id == issue_id)
    }

    /// Entries recorded at or after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &AuditEntry> + '_ {
        self.entries.iter().filter(move |e| e.timestamp >= since)
    }

    /// Entries appended after the first `offset` ones.
    pub fn tail(&self, offset: usize) -> &[AuditEntry] {
        self.entries.get(offset..).unwrap_or_default()
    }
}
