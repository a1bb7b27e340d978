//! Closed severity and category taxonomies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Issue severity, ordered by blocking weight.
///
/// `Info < Warning < Error < Critical < Blocker`. The derived `Ord` follows
/// declaration order and is what whitelist `max_severity` gates compare on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Blocker,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Blocker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Blocker => "blocker",
        }
    }

    /// Whether an unsuppressed issue at this severity fails a strict run.
    pub fn is_blocking(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check / issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Functional,
    Performance,
    Regression,
    Quality,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Functional => "functional",
            Category::Performance => "performance",
            Category::Regression => "regression",
            Category::Quality => "quality",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
