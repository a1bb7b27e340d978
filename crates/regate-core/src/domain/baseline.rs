//! Baseline snapshot of metrics and captured outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk schema version for baselines.
pub const BASELINE_SCHEMA_VERSION: u32 = 1;

/// Immutable snapshot used as the comparison reference.
///
/// Built once by baseline creation and replaced wholesale on the next
/// creation; there is no API to mutate a loaded baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    schema_version: u32,
    created_at: DateTime<Utc>,
    metrics: BTreeMap<String, f64>,
    outcomes: BTreeMap<String, serde_json::Value>,
    /// Run time of each completed check when the baseline was captured.
    #[serde(default)]
    durations_ms: BTreeMap<String, u64>,
}

impl Baseline {
    /// An empty baseline, as seen on a first run.
    pub fn empty(created_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: BASELINE_SCHEMA_VERSION,
            created_at,
            metrics: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            durations_ms: BTreeMap::new(),
        }
    }

    pub fn from_parts(
        created_at: DateTime<Utc>,
        metrics: BTreeMap<String, f64>,
        outcomes: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            schema_version: BASELINE_SCHEMA_VERSION,
            created_at,
            metrics,
            outcomes,
            durations_ms: BTreeMap::new(),
        }
    }

    /// Attach per-check run times.
    pub fn with_durations(mut self, durations_ms: BTreeMap<String, u64>) -> Self {
        self.durations_ms = durations_ms;
        self
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn outcome(&self, test_id: &str) -> Option<&serde_json::Value> {
        self.outcomes.get(test_id)
    }

    pub fn duration_ms(&self, test_id: &str) -> Option<u64> {
        self.durations_ms.get(test_id).copied()
    }

    pub fn durations_ms(&self) -> &BTreeMap<String, u64> {
        &self.durations_ms
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    pub fn outcomes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.outcomes
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_baseline_lookup() {
        let baseline = Baseline::from_parts(
            Utc::now(),
            BTreeMap::from([("throughput".to_string(), 100.0)]),
            BTreeMap::from([("health".to_string(), json!({"status": "healthy"}))]),
        );
        assert_eq!(baseline.metric("throughput"), Some(100.0));
        assert_eq!(baseline.metric("latency"), None);
        assert_eq!(baseline.outcome("health"), Some(&json!({"status": "healthy"})));
        assert!(!baseline.is_empty());
        assert_eq!(baseline.schema_version(), BASELINE_SCHEMA_VERSION);
    }

    #[test]
    fn test_baseline_json_shape() {
        let baseline = Baseline::from_parts(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("parse RFC3339")
                .with_timezone(&Utc),
            BTreeMap::from([("value".to_string(), 100.0)]),
            BTreeMap::new(),
        );
        let raw = serde_json::to_value(&baseline).expect("serialize");
        let obj = raw.as_object().expect("baseline object");
        assert!(obj.contains_key("schema_version"));
        assert!(obj.contains_key("created_at"));
        assert!(obj.contains_key("metrics"));
        assert!(obj.contains_key("outcomes"));
        assert_eq!(raw["metrics"]["value"], json!(100.0));
    }

    #[test]
    fn test_durations_default_when_absent() {
        let raw = json!({
            "schema_version": 1,
            "created_at": "2026-01-01T00:00:00Z",
            "metrics": {"value": 1.0},
            "outcomes": {}
        });
        let baseline: Baseline = serde_json::from_value(raw).expect("deserialize");
        assert!(baseline.durations_ms().is_empty());
        assert_eq!(baseline.duration_ms("value"), None);

        let timed = baseline.with_durations(BTreeMap::from([("value".to_string(), 250)]));
        assert_eq!(timed.duration_ms("value"), Some(250));
    }

    #[test]
    fn test_empty_baseline() {
        assert!(Baseline::empty(Utc::now()).is_empty());
    }
}
