//! Domain models for Regate.
//!
//! Canonical definitions for the core entities:
//! - `Severity` / `Category`: closed taxonomies
//! - `Baseline`: immutable comparison snapshot
//! - `ValidationIssue` / `ValidationResult`: classified findings and the run outcome

pub mod baseline;
pub mod error;
pub mod issue;
pub mod severity;

// Re-export main types and errors
pub use baseline::{Baseline, BASELINE_SCHEMA_VERSION};
pub use error::{ConfigError, RegateError, Result, WhitelistError};
pub use issue::{issue_id, ValidationIssue, ValidationResult, SUPPRESSION_MARKER};
pub use severity::{Category, Severity};
