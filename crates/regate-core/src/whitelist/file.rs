//! Loading and saving whitelist files (JSON, TOML or YAML).
//!
//! Accepted shapes:
//!
//! ```text
//! JSON / YAML:  [ {rule}, ... ]            or  { "version": 1, "rules": [ ... ] }
//! TOML:         version = 1  [[rules]] ...
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::manager::{WhitelistManager, WhitelistStats};
use super::rule::{RuleStatus, WhitelistRule};
use crate::domain::{Category, ConfigError, RegateError, Severity};
use crate::fsutil::write_atomic;

/// Current whitelist document version written by [`WhitelistManager::save`].
pub const WHITELIST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Rule as written on disk. Required fields are optional here so a missing
/// one can be reported by name; enum fields stay strings until the rule id
/// is known.
#[derive(Debug, Deserialize)]
struct RuleRecord {
    rule_id: Option<String>,
    pattern: Option<String>,
    reason: Option<String>,
    approved_by: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    file_pattern: Option<String>,
    #[serde(default)]
    max_severity: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    List(Vec<RuleRecord>),
    Versioned {
        #[serde(default)]
        rules: Vec<RuleRecord>,
    },
}

impl RuleDocument {
    fn into_records(self) -> Vec<RuleRecord> {
        match self {
            RuleDocument::List(rules) => rules,
            RuleDocument::Versioned { rules } => rules,
        }
    }
}

#[derive(Serialize)]
struct SavedDocument<'a> {
    version: u32,
    rules: &'a [WhitelistRule],
    stats: WhitelistStats,
}

fn required(
    value: Option<String>,
    rule_id: &str,
    field: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField {
            rule_id: rule_id.to_string(),
            field,
        }),
    }
}

fn enum_field<T: DeserializeOwned>(
    value: Option<String>,
    rule_id: &str,
    field: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    serde_json::from_value(serde_json::Value::String(raw.clone()))
        .map(Some)
        .map_err(|_| ConfigError::InvalidField {
            rule_id: rule_id.to_string(),
            field,
            value: raw,
        })
}

impl RuleRecord {
    fn into_rule(self, index: usize) -> Result<WhitelistRule, ConfigError> {
        let rule_id = required(self.rule_id, &format!("#{}", index), "rule_id")?;
        let pattern = required(self.pattern, &rule_id, "pattern")?;
        let reason = required(self.reason, &rule_id, "reason")?;
        let approved_by = required(self.approved_by, &rule_id, "approved_by")?;

        let max_severity: Option<Severity> =
            enum_field(self.max_severity, &rule_id, "max_severity")?;
        let status: Option<RuleStatus> = enum_field(self.status, &rule_id, "status")?;
        let category: Option<Category> = enum_field(self.category, &rule_id, "category")?;

        let mut rule = WhitelistRule::new(rule_id, pattern, reason, approved_by)
            .with_max_severity(max_severity.unwrap_or(Severity::Error))
            .with_status(status.unwrap_or_default());
        if let Some(category) = category {
            rule = rule.with_category(category);
        }
        if let Some(file_pattern) = self.file_pattern {
            rule = rule.with_file_pattern(file_pattern);
        }
        if let Some(created_at) = self.created_at {
            rule = rule.created_at(created_at);
        }
        if let Some(expires_at) = self.expires_at {
            rule = rule.expires_at(expires_at);
        }
        Ok(rule)
    }
}

/// Parse whitelist rules from text in the format implied by `path`.
pub fn parse_rules(path: &Path, text: &str) -> Result<Vec<WhitelistRule>, ConfigError> {
    let parse_err = |reason: String| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    let document: RuleDocument = match Format::from_path(path)? {
        Format::Json => serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?,
        Format::Toml => toml::from_str(text).map_err(|e| parse_err(e.to_string()))?,
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string()))?,
    };
    document
        .into_records()
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.into_rule(index))
        .collect()
}

impl WhitelistManager {
    /// Load rules from a whitelist file.
    ///
    /// A missing file, unreadable document, missing required field or
    /// duplicate rule id fails the load as a whole.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::WhitelistNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let manager = Self::with_rules(parse_rules(path, &text)?)?;
        tracing::debug!(path = %path.display(), rules = manager.rules().len(), "whitelist loaded");
        Ok(manager)
    }

    /// Write the rules (with their current statuses) and stats back to `path`.
    ///
    /// The write is atomic: a temp file in the same directory is persisted
    /// over the target.
    pub fn save(&self, path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<(), RegateError> {
        let path = path.as_ref();
        let document = SavedDocument {
            version: WHITELIST_FORMAT_VERSION,
            rules: self.rules(),
            stats: self.stats(now),
        };
        let unsupported = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };
        let text = match Format::from_path(path)? {
            Format::Json => serde_json::to_string_pretty(&document)?,
            Format::Toml => {
                toml::to_string_pretty(&document).map_err(|e| unsupported(e.to_string()))?
            }
            Format::Yaml => serde_yaml::to_string(&document).map_err(|e| unsupported(e.to_string()))?,
        };
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }
}
