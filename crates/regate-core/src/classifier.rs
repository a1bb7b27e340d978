//! Severity classification of raw findings.
//!
//! Priority order, first match wins:
//! 1. structural mismatch → `Blocker`
//! 2. metric regression beyond its threshold → `Critical`
//! 3. execution failure → `Error`
//! 4. quality metric below its bar → `Warning`
//! 5. anything else → no issue

use crate::domain::{Category, Severity, ValidationIssue};
use crate::engine::{FindingKind, RawFinding};
use crate::suite::MetricDirection;

/// Maps raw findings to validation issues. Stateless and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeverityClassifier;

impl SeverityClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one finding, or `None` when it does not warrant an issue.
    pub fn classify(&self, finding: &RawFinding) -> Option<ValidationIssue> {
        let (category, severity, description, delta) = match &finding.kind {
            FindingKind::StructuralMismatch { detail, .. } => (
                finding.category,
                Severity::Blocker,
                format!(
                    "Structural regression in '{}': {}",
                    finding.test_name, detail
                ),
                None,
            ),
            FindingKind::Metric(m) if m.regressed => {
                let delta = m.delta.unwrap_or_default();
                let verb = match m.direction {
                    MetricDirection::HigherIsBetter => "decreased",
                    MetricDirection::LowerIsBetter => "increased",
                };
                (
                    finding.category,
                    Severity::Critical,
                    format!(
                        "Metric '{}' {} {:.2}% (baseline={}, current={}, threshold={:.2}%)",
                        finding.test_id,
                        verb,
                        delta * 100.0,
                        m.baseline.unwrap_or_default(),
                        m.current,
                        m.threshold * 100.0,
                    ),
                    Some(delta),
                )
            }
            FindingKind::Failure { message } => (
                Category::Functional,
                Severity::Error,
                format!("Check '{}' failed: {}", finding.test_name, message),
                None,
            ),
            FindingKind::Metric(m) => match m.missed_quality_bar {
                Some(bar) => (
                    finding.category,
                    Severity::Warning,
                    format!(
                        "Quality metric '{}' = {} misses the bar of {}",
                        finding.test_id, m.current, bar
                    ),
                    m.delta,
                ),
                None => return None,
            },
            FindingKind::OutcomeMatched | FindingKind::FirstObservation => return None,
        };

        Some(
            ValidationIssue::new(finding.test_id.clone(), category, severity, description)
                .with_file_path(finding.file_path.clone())
                .with_delta(delta),
        )
    }

    /// Classify a batch, preserving finding order.
    pub fn classify_all(&self, findings: &[RawFinding]) -> Vec<ValidationIssue> {
        findings.iter().filter_map(|f| self.classify(f)).collect()
    }
}
