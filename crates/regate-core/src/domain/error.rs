//! Domain-level error taxonomy for Regate.
//!
//! Only storage and configuration problems surface as errors. Anything found
//! while validating (failed checks, regressions) is reported as data in the
//! `ValidationResult`.

use std::path::PathBuf;

use crate::whitelist::RuleStatus;

/// Errors produced while loading configuration or whitelist rule files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("whitelist rule '{rule_id}' is missing required field `{field}`")]
    MissingField {
        rule_id: String,
        field: &'static str,
    },

    #[error("whitelist rule '{rule_id}' has invalid `{field}`: {value:?}")]
    InvalidField {
        rule_id: String,
        field: &'static str,
        value: String,
    },

    #[error("duplicate whitelist rule id: {0}")]
    DuplicateRuleId(String),

    #[error("duplicate check id: {0}")]
    DuplicateCheckId(String),

    #[error("whitelist file not found: {}", path.display())]
    WhitelistNotFound { path: PathBuf },

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid threshold {name} = {value}: must be finite and non-negative")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Errors produced by administrative whitelist operations.
#[derive(Debug, thiserror::Error)]
pub enum WhitelistError {
    #[error("whitelist rule not found: {0}")]
    RuleNotFound(String),

    #[error("cannot {action} rule '{rule_id}' in status {from}")]
    InvalidTransition {
        rule_id: String,
        from: RuleStatus,
        action: &'static str,
    },
}

/// Regate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RegateError {
    #[error("no baseline found at {}; run `regate create-baseline` first", path.display())]
    BaselineMissing { path: PathBuf },

    #[error("baseline at {} is corrupt: {reason}", path.display())]
    BaselineCorrupt { path: PathBuf, reason: String },

    #[error("baseline storage at {} is locked by another writer", path.display())]
    BaselineLocked { path: PathBuf },

    #[error("baseline capture failed: check '{test_id}' failed: {message}")]
    BaselineCapture { test_id: String, message: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("whitelist error: {0}")]
    Whitelist(#[from] WhitelistError),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Regate domain operations.
pub type Result<T> = std::result::Result<T, RegateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_missing_carries_guidance() {
        let err = RegateError::BaselineMissing {
            path: PathBuf::from(".baselines/baseline.json"),
        };
        let msg = err.to_string();
        assert!(msg.contains(".baselines/baseline.json"));
        assert!(msg.contains("create-baseline"));
    }

    #[test]
    fn test_missing_field_names_rule() {
        let err = ConfigError::MissingField {
            rule_id: "flaky-perf".to_string(),
            field: "approved_by",
        };
        let msg = err.to_string();
        assert!(msg.contains("flaky-perf"));
        assert!(msg.contains("approved_by"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = WhitelistError::InvalidTransition {
            rule_id: "r1".to_string(),
            from: RuleStatus::Expired,
            action: "approve",
        };
        assert_eq!(err.to_string(), "cannot approve rule 'r1' in status expired");
    }

    #[test]
    fn test_config_error_converts() {
        let err: RegateError = ConfigError::DuplicateRuleId("r1".to_string()).into();
        assert!(err.to_string().starts_with("config error"));
    }
}
