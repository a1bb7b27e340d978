//! Whitelist exemptions: rules, matching, administration and audit.

mod audit;
mod file;
mod manager;
mod rule;

pub use audit::{AuditEntry, AuditTrail};
pub use file::{parse_rules, WHITELIST_FORMAT_VERSION};
pub use manager::{WhitelistManager, WhitelistStats};
pub use rule::{RuleStatus, WhitelistRule};
