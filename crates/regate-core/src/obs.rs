//! Structured observability hooks for validation lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for key lifecycle events: validation start and
//!   finish, per-check completion, suppression, rule expiry, baseline capture
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `--json` to the CLI.

use tracing::{info, warn};

use crate::domain::Severity;

/// Span tagging every event of one validation run with its run id.
///
/// Attach with [`tracing::Instrument`] rather than entering it, so the run
/// future stays `Send`.
///
/// # Example
///
/// ```ignore
/// validate(...).instrument(run_span("0b6f...")).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("regate.run", run_id = %run_id)
}

/// Emit event: validation started with the number of registered tests.
pub fn emit_validation_started(run_id: &str, tests: usize, strict: bool) {
    info!(event = "validation.started", run_id = %run_id, tests = tests, strict = strict);
}

/// Emit event: a check finished (completed, failed or timed out).
pub fn emit_check_finished(test_id: &str, duration_ms: u64, completed: bool) {
    info!(
        event = "check.finished",
        test_id = %test_id,
        duration_ms = duration_ms,
        completed = completed,
    );
}

/// Emit event: an issue was downgraded by a whitelist rule.
pub fn emit_issue_suppressed(issue_id: &str, rule_id: &str, original: Severity) {
    info!(
        event = "issue.suppressed",
        issue_id = %issue_id,
        rule_id = %rule_id,
        original_severity = %original,
    );
}

/// Emit event: an active rule passed its expiry and was marked expired.
pub fn emit_rule_expired(rule_id: &str, expires_at: i64) {
    info!(event = "rule.expired", rule_id = %rule_id, expires_at = expires_at);
}

/// Emit event: a rule pattern failed to compile (warning level).
pub fn emit_rule_invalid(rule_id: &str, reason: &str) {
    warn!(event = "rule.invalid", rule_id = %rule_id, reason = %reason);
}

/// Emit event: a baseline was captured and persisted.
pub fn emit_baseline_created(metrics: usize, outcomes: usize) {
    info!(event = "baseline.created", metrics = metrics, outcomes = outcomes);
}

/// Emit event: validation finished with its verdict.
pub fn emit_validation_finished(
    run_id: &str,
    duration_ms: u64,
    issues: usize,
    suppressed: usize,
    passed: bool,
) {
    info!(
        event = "validation.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        issues = issues,
        suppressed = suppressed,
        passed = passed,
    );
}
