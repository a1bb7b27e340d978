//! Regression engine.
//!
//! Executes registered checks against a [`RunContext`] and compares their
//! outputs with a [`Baseline`]. Each executed test yields at least one
//! [`RawFinding`]; numeric fields of an outcome and the test's own run time
//! may add more. A failing, panicking or timed-out check never aborts the
//! run; it becomes a [`FindingKind::Failure`] and execution moves on.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{Baseline, Category};
use crate::obs;
use crate::suite::{CheckOutput, MetricDirection, RegressionSuite, RegressionTest, RunContext};

/// Default relative threshold for general metrics (10%).
pub const DEFAULT_METRIC_THRESHOLD: f64 = 0.10;
/// Default relative threshold for performance-category metrics (20%).
pub const DEFAULT_PERFORMANCE_THRESHOLD: f64 = 0.20;
/// Default per-test timeout.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Baseline run times below this are too noisy to compare.
pub const DEFAULT_DURATION_FLOOR_MS: u64 = 100;

/// Suffix of the finding id for a test's run time.
pub const DURATION_SUFFIX: &str = "duration_ms";

/// Thresholds and execution limits for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub metric_threshold: f64,
    pub performance_threshold: f64,
    pub test_timeout: Duration,
    /// Maximum number of checks running at once.
    pub max_concurrency: usize,
    /// Run times are compared only when the baseline run took at least this long.
    pub duration_floor_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metric_threshold: DEFAULT_METRIC_THRESHOLD,
            performance_threshold: DEFAULT_PERFORMANCE_THRESHOLD,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            max_concurrency: 8,
            duration_floor_ms: DEFAULT_DURATION_FLOOR_MS,
        }
    }
}

impl EngineConfig {
    /// Threshold applying to a test of the given category.
    pub fn threshold_for(&self, category: Category) -> f64 {
        match category {
            Category::Performance => self.performance_threshold,
            _ => self.metric_threshold,
        }
    }
}

/// How a single check execution ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed { output: CheckOutput },
    Failed { message: String },
    TimedOut { after_ms: u64 },
}

/// Result of running one test, before any baseline comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct TestExecution {
    pub test_id: String,
    pub test_name: String,
    pub category: Category,
    pub file_path: Option<String>,
    pub quality_bar: Option<f64>,
    pub duration_ms: u64,
    pub outcome: ExecutionOutcome,
}

/// Comparison of a metric against its baseline value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub current: f64,
    pub baseline: Option<f64>,
    pub direction: MetricDirection,
    /// Relative worsening; positive means the metric got worse.
    pub delta: Option<f64>,
    pub threshold: f64,
    /// `delta` strictly exceeds `threshold`.
    pub regressed: bool,
    /// Set to the bar when a quality metric misses it.
    pub missed_quality_bar: Option<f64>,
}

/// What the engine observed for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    /// The check raised an error, panicked or timed out.
    Failure { message: String },
    Metric(MetricComparison),
    /// Outcome differs from the baseline by shape or value.
    StructuralMismatch {
        detail: String,
        baseline: Value,
        current: Value,
    },
    OutcomeMatched,
    /// No baseline entry yet; recorded for future comparison only.
    FirstObservation,
}

/// An unclassified observation about one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    pub test_id: String,
    pub test_name: String,
    pub category: Category,
    pub file_path: Option<String>,
    pub kind: FindingKind,
}

/// Relative worsening of `current` against `baseline`.
///
/// `HigherIsBetter`: (baseline − current) / |baseline|.
/// `LowerIsBetter`: (current − baseline) / |baseline|.
/// Returns `None` when the baseline is zero or either value is not finite.
pub fn relative_delta(baseline: f64, current: f64, direction: MetricDirection) -> Option<f64> {
    if baseline == 0.0 || !baseline.is_finite() || !current.is_finite() {
        return None;
    }
    let delta = match direction {
        MetricDirection::HigherIsBetter => (baseline - current) / baseline.abs(),
        MetricDirection::LowerIsBetter => (current - baseline) / baseline.abs(),
    };
    Some(delta)
}

/// Describe the first structural difference between two values, if any.
///
/// Walks objects in key order and arrays by index; the returned text carries
/// a `$`-rooted path to the difference. Two numbers at the same path are not
/// a structural difference: they are compared as metrics by [`numeric_fields`].
pub fn structural_difference(baseline: &Value, current: &Value) -> Option<String> {
    diff_at("$", baseline, current)
}

fn diff_at(path: &str, baseline: &Value, current: &Value) -> Option<String> {
    match (baseline, current) {
        (Value::Object(b), Value::Object(c)) => {
            let missing: Vec<&str> = b
                .keys()
                .filter(|k| !c.contains_key(*k))
                .map(String::as_str)
                .collect();
            let added: Vec<&str> = c
                .keys()
                .filter(|k| !b.contains_key(*k))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() || !added.is_empty() {
                let mut parts = Vec::new();
                if !missing.is_empty() {
                    parts.push(format!("missing keys: {}", missing.join(", ")));
                }
                if !added.is_empty() {
                    parts.push(format!("added keys: {}", added.join(", ")));
                }
                return Some(format!("shape changed at {}: {}", path, parts.join("; ")));
            }
            b.iter()
                .find_map(|(k, bv)| diff_at(&format!("{}.{}", path, k), bv, &c[k]))
        }
        (Value::Array(b), Value::Array(c)) => {
            if b.len() != c.len() {
                return Some(format!(
                    "array length changed at {}: {} → {}",
                    path,
                    b.len(),
                    c.len()
                ));
            }
            b.iter()
                .zip(c.iter())
                .enumerate()
                .find_map(|(i, (bv, cv))| diff_at(&format!("{}[{}]", path, i), bv, cv))
        }
        (Value::Number(_), Value::Number(_)) => None,
        _ if type_name(baseline) != type_name(current) => Some(format!(
            "type changed at {}: {} → {}",
            path,
            type_name(baseline),
            type_name(current)
        )),
        _ if baseline != current => Some(format!(
            "value changed at {}: {} → {}",
            path, baseline, current
        )),
        _ => None,
    }
}

/// Numeric leaves found at the same path in both values, as
/// `(path, baseline, current)`.
///
/// Paths are relative (`count`, `stats.p50`, `items[0]`); a bare number at
/// the root has an empty path. Leaves under mismatched structure are skipped.
pub fn numeric_fields(baseline: &Value, current: &Value) -> Vec<(String, f64, f64)> {
    let mut out = Vec::new();
    collect_numeric(String::new(), baseline, current, &mut out);
    out
}

fn collect_numeric(
    path: String,
    baseline: &Value,
    current: &Value,
    out: &mut Vec<(String, f64, f64)>,
) {
    match (baseline, current) {
        (Value::Number(b), Value::Number(c)) => {
            if let (Some(b), Some(c)) = (b.as_f64(), c.as_f64()) {
                out.push((path, b, c));
            }
        }
        (Value::Object(b), Value::Object(c)) => {
            for (key, bv) in b {
                if let Some(cv) = c.get(key) {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    collect_numeric(child, bv, cv, out);
                }
            }
        }
        (Value::Array(b), Value::Array(c)) => {
            for (i, (bv, cv)) in b.iter().zip(c.iter()).enumerate() {
                collect_numeric(format!("{}[{}]", path, i), bv, cv, out);
            }
        }
        _ => {}
    }
}

/// Finding id for a sub-measurement of a test: `<test_id>.<field>`.
fn field_id(test_id: &str, field: &str) -> String {
    if field.is_empty() {
        test_id.to_string()
    } else {
        format!("{}.{}", test_id, field)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Runs suites and compares their outputs with a baseline.
#[derive(Debug, Clone, Default)]
pub struct RegressionEngine {
    config: EngineConfig,
}

impl RegressionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute every enabled test and compare against `baseline`.
    pub async fn run(
        &self,
        suites: &[RegressionSuite],
        baseline: &Baseline,
        ctx: &RunContext,
    ) -> Vec<RawFinding> {
        let executions = self.execute(suites, ctx).await;
        self.compare(&executions, baseline)
    }

    /// Execute every enabled test.
    ///
    /// Up to `max_concurrency` checks run at once. Results are collected in
    /// suite order, then test order, regardless of completion order.
    pub async fn execute(&self, suites: &[RegressionSuite], ctx: &RunContext) -> Vec<TestExecution> {
        let ctx = Arc::new(ctx.clone());
        let tests: Vec<&RegressionTest> = suites
            .iter()
            .flat_map(|s| s.tests.iter())
            .filter(|t| t.enabled)
            .collect();

        stream::iter(tests)
            .map(|test| self.execute_test(test, Arc::clone(&ctx)))
            .buffered(self.config.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await
    }

    async fn execute_test(&self, test: &RegressionTest, ctx: Arc<RunContext>) -> TestExecution {
        let timeout = test.timeout.unwrap_or(self.config.test_timeout);
        let check = test.check();
        let start = Instant::now();

        // Spawned so a panic is contained in the task. On timeout the handle
        // is dropped and the check keeps running detached.
        let handle = tokio::spawn(async move { check.run(&ctx).await });

        let outcome = match tokio::time::timeout(timeout, handle).await {
            Err(_) => ExecutionOutcome::TimedOut {
                after_ms: timeout.as_millis() as u64,
            },
            Ok(Err(join_err)) => ExecutionOutcome::Failed {
                message: if join_err.is_panic() {
                    format!("check panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "check was cancelled".to_string()
                },
            },
            Ok(Ok(Err(err))) => ExecutionOutcome::Failed {
                message: format!("{:#}", err),
            },
            Ok(Ok(Ok(CheckOutput::Metric(m)))) if !m.value.is_finite() => {
                ExecutionOutcome::Failed {
                    message: format!("check produced a non-finite metric: {}", m.value),
                }
            }
            Ok(Ok(Ok(output))) => ExecutionOutcome::Completed { output },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let completed = matches!(outcome, ExecutionOutcome::Completed { .. });
        obs::emit_check_finished(&test.id, duration_ms, completed);

        TestExecution {
            test_id: test.id.clone(),
            test_name: test.name.clone(),
            category: test.category,
            file_path: test.file_path.clone(),
            quality_bar: test.quality_bar,
            duration_ms,
            outcome,
        }
    }

    /// Compare executions against a baseline.
    ///
    /// Findings keep execution order. Every execution yields one primary
    /// finding, except an outcome whose numeric fields regressed, which yields
    /// one metric finding per regressed field instead. A run-time regression
    /// adds one more.
    pub fn compare(&self, executions: &[TestExecution], baseline: &Baseline) -> Vec<RawFinding> {
        executions
            .iter()
            .flat_map(|exec| {
                let mut findings = self.compare_one(exec, baseline);
                findings.extend(self.compare_duration(exec, baseline));
                findings
            })
            .collect()
    }

    fn finding(&self, exec: &TestExecution, kind: FindingKind) -> RawFinding {
        RawFinding {
            test_id: exec.test_id.clone(),
            test_name: exec.test_name.clone(),
            category: exec.category,
            file_path: exec.file_path.clone(),
            kind,
        }
    }

    fn compare_one(&self, exec: &TestExecution, baseline: &Baseline) -> Vec<RawFinding> {
        let kind = match &exec.outcome {
            ExecutionOutcome::Failed { message } => FindingKind::Failure {
                message: message.clone(),
            },
            ExecutionOutcome::TimedOut { after_ms } => FindingKind::Failure {
                message: format!("check timed out after {}ms", after_ms),
            },
            ExecutionOutcome::Completed {
                output: CheckOutput::Metric(metric),
            } => match baseline.outcome(&exec.test_id) {
                Some(prior) => FindingKind::StructuralMismatch {
                    detail: "shape changed at $: outcome → metric".to_string(),
                    baseline: prior.clone(),
                    current: metric_value(metric.value),
                },
                None => FindingKind::Metric(self.compare_metric(
                    exec,
                    metric.value,
                    metric.direction,
                    baseline,
                )),
            },
            ExecutionOutcome::Completed {
                output: CheckOutput::Outcome(current),
            } => {
                if let Some(prior) = baseline.metric(&exec.test_id) {
                    FindingKind::StructuralMismatch {
                        detail: "shape changed at $: metric → outcome".to_string(),
                        baseline: metric_value(prior),
                        current: current.clone(),
                    }
                } else {
                    match baseline.outcome(&exec.test_id) {
                        None => FindingKind::FirstObservation,
                        Some(prior) => match structural_difference(prior, current) {
                            Some(detail) => FindingKind::StructuralMismatch {
                                detail,
                                baseline: prior.clone(),
                                current: current.clone(),
                            },
                            None => {
                                let regressed = self.compare_outcome_fields(exec, prior, current);
                                if !regressed.is_empty() {
                                    return regressed;
                                }
                                FindingKind::OutcomeMatched
                            }
                        },
                    }
                }
            }
        };
        vec![self.finding(exec, kind)]
    }

    /// Numeric fields of a structurally unchanged outcome that dropped by
    /// more than the category threshold. Fields are higher-is-better.
    fn compare_outcome_fields(
        &self,
        exec: &TestExecution,
        prior: &Value,
        current: &Value,
    ) -> Vec<RawFinding> {
        let threshold = self.config.threshold_for(exec.category);
        numeric_fields(prior, current)
            .into_iter()
            .filter_map(|(field, b, c)| {
                let delta = relative_delta(b, c, MetricDirection::HigherIsBetter)?;
                if delta <= threshold {
                    return None;
                }
                debug!(
                    test_id = %exec.test_id,
                    field = %field,
                    delta,
                    threshold,
                    "outcome field regression candidate"
                );
                Some(RawFinding {
                    test_id: field_id(&exec.test_id, &field),
                    ..self.finding(
                        exec,
                        FindingKind::Metric(MetricComparison {
                            current: c,
                            baseline: Some(b),
                            direction: MetricDirection::HigherIsBetter,
                            delta: Some(delta),
                            threshold,
                            regressed: true,
                            missed_quality_bar: None,
                        }),
                    )
                })
            })
            .collect()
    }

    /// Run-time regression of a completed check against its baseline run
    /// time, judged by the performance threshold. Reported under the
    /// performance category as `<test_id>.duration_ms`.
    fn compare_duration(&self, exec: &TestExecution, baseline: &Baseline) -> Option<RawFinding> {
        if !matches!(exec.outcome, ExecutionOutcome::Completed { .. }) {
            return None;
        }
        let prior = baseline
            .duration_ms(&exec.test_id)
            .filter(|ms| *ms >= self.config.duration_floor_ms)?;
        let threshold = self.config.performance_threshold;
        let delta = relative_delta(
            prior as f64,
            exec.duration_ms as f64,
            MetricDirection::LowerIsBetter,
        )?;
        if delta <= threshold {
            return None;
        }
        debug!(
            test_id = %exec.test_id,
            prior,
            current = exec.duration_ms,
            delta,
            "run-time regression candidate"
        );
        Some(RawFinding {
            test_id: field_id(&exec.test_id, DURATION_SUFFIX),
            test_name: exec.test_name.clone(),
            category: Category::Performance,
            file_path: exec.file_path.clone(),
            kind: FindingKind::Metric(MetricComparison {
                current: exec.duration_ms as f64,
                baseline: Some(prior as f64),
                direction: MetricDirection::LowerIsBetter,
                delta: Some(delta),
                threshold,
                regressed: true,
                missed_quality_bar: None,
            }),
        })
    }

    fn compare_metric(
        &self,
        exec: &TestExecution,
        current: f64,
        direction: MetricDirection,
        baseline: &Baseline,
    ) -> MetricComparison {
        let threshold = self.config.threshold_for(exec.category);
        let prior = baseline.metric(&exec.test_id);
        let delta = prior.and_then(|b| relative_delta(b, current, direction));
        let regressed = delta.is_some_and(|d| d > threshold);

        let missed_quality_bar = match (exec.category, exec.quality_bar) {
            (Category::Quality, Some(bar)) => {
                let misses = match direction {
                    MetricDirection::HigherIsBetter => current < bar,
                    MetricDirection::LowerIsBetter => current > bar,
                };
                misses.then_some(bar)
            }
            _ => None,
        };

        if regressed {
            debug!(test_id = %exec.test_id, ?delta, threshold, "metric regression candidate");
        }

        MetricComparison {
            current,
            baseline: prior,
            direction,
            delta,
            threshold,
            regressed,
            missed_quality_bar,
        }
    }
}

fn metric_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn baseline(metrics: &[(&str, f64)], outcomes: &[(&str, Value)]) -> Baseline {
        Baseline::from_parts(
            Utc::now(),
            metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            outcomes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn suite(tests: Vec<RegressionTest>) -> Vec<RegressionSuite> {
        vec![tests
            .into_iter()
            .fold(RegressionSuite::new("s", "Suite"), |s, t| s.add_test(t))]
    }

    #[test]
    fn test_relative_delta_directions() {
        let drop = relative_delta(100.0, 70.0, MetricDirection::HigherIsBetter).expect("delta");
        assert!((drop - 0.30).abs() < 1e-9);
        let slower = relative_delta(2.0, 3.0, MetricDirection::LowerIsBetter).expect("delta");
        assert!((slower - 0.5).abs() < 1e-9);
        assert!(relative_delta(0.0, 5.0, MetricDirection::HigherIsBetter).is_none());
    }

    #[test]
    fn test_relative_delta_negative_baseline() {
        // -10 → -20 is worse when higher is better.
        let drop = relative_delta(-10.0, -20.0, MetricDirection::HigherIsBetter).expect("delta");
        assert!((drop - 1.0).abs() < 1e-9);
        let better = relative_delta(-10.0, -5.0, MetricDirection::HigherIsBetter).expect("delta");
        assert!(better < 0.0);
    }

    #[test]
    fn test_structural_difference_paths() {
        assert!(structural_difference(&json!({"a": 1}), &json!({"a": 1})).is_none());
        assert!(structural_difference(&json!({"a": 1}), &json!({"a": 2.5})).is_none());

        let value = structural_difference(
            &json!({"status": "healthy"}),
            &json!({"status": "degraded"}),
        )
        .expect("differs");
        assert!(value.contains("$.status"));

        let shape = structural_difference(&json!({"a": 1, "b": 2}), &json!({"a": 1, "c": 2}))
            .expect("differs");
        assert!(shape.contains("missing keys: b"));
        assert!(shape.contains("added keys: c"));

        let typed = structural_difference(&json!({"a": [1, 2]}), &json!({"a": "x"}))
            .expect("differs");
        assert!(typed.contains("type changed at $.a: array → string"));

        let arr = structural_difference(&json!([1, {"k": true}]), &json!([1, {"k": false}]))
            .expect("differs");
        assert!(arr.contains("$[1].k"));
    }

    #[test]
    fn test_numeric_fields_paths() {
        let fields = numeric_fields(
            &json!({"status": "ok", "count": 100, "stats": {"p50": 4}, "items": [1, "x"]}),
            &json!({"status": "ok", "count": 99, "stats": {"p50": 5}, "items": [2, "x"]}),
        );
        let paths: Vec<&str> = fields.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["count", "items[0]", "stats.p50"]);
        assert_eq!(fields[0], ("count".to_string(), 100.0, 99.0));
        assert_eq!(numeric_fields(&json!(3), &json!(4)), vec![(String::new(), 3.0, 4.0)]);
    }

    #[tokio::test]
    async fn test_outcome_numeric_field_uses_threshold() {
        let engine = RegressionEngine::default();
        let base = baseline(&[], &[("health", json!({"status": "ok", "count": 100}))]);

        let small = suite(vec![RegressionTest::from_fn(
            "health",
            "Health",
            Category::Functional,
            |_| Ok(CheckOutput::outcome(json!({"status": "ok", "count": 99}))),
        )]);
        let findings = engine.run(&small, &base, &RunContext::new(".")).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::OutcomeMatched);

        let large = suite(vec![RegressionTest::from_fn(
            "health",
            "Health",
            Category::Functional,
            |_| Ok(CheckOutput::outcome(json!({"status": "ok", "count": 80}))),
        )]);
        let findings = engine.run(&large, &base, &RunContext::new(".")).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].test_id, "health.count");
        match &findings[0].kind {
            FindingKind::Metric(m) => {
                assert!(m.regressed);
                assert_eq!(m.baseline, Some(100.0));
                assert_eq!(m.current, 80.0);
            }
            other => panic!("expected metric, got {other:?}"),
        }
    }

    struct SleepCheck(Duration);

    #[async_trait::async_trait]
    impl crate::suite::RegressionCheck for SleepCheck {
        async fn run(&self, _ctx: &RunContext) -> anyhow::Result<CheckOutput> {
            tokio::time::sleep(self.0).await;
            Ok(CheckOutput::outcome(json!({"ok": true})))
        }
    }

    fn timed_baseline(test_id: &str, duration_ms: u64) -> Baseline {
        baseline(&[], &[(test_id, json!({"ok": true}))])
            .with_durations(BTreeMap::from([(test_id.to_string(), duration_ms)]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_time_regression_reported_as_performance() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::new(
            "startup",
            "Startup",
            Category::Functional,
            SleepCheck(Duration::from_millis(300)),
        )]);
        let findings = engine
            .run(&suites, &timed_baseline("startup", 100), &RunContext::new("."))
            .await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, FindingKind::OutcomeMatched);
        assert_eq!(findings[1].test_id, "startup.duration_ms");
        assert_eq!(findings[1].category, Category::Performance);
        match &findings[1].kind {
            FindingKind::Metric(m) => {
                assert!(m.regressed);
                assert_eq!(m.direction, MetricDirection::LowerIsBetter);
                assert_eq!(m.threshold, DEFAULT_PERFORMANCE_THRESHOLD);
            }
            other => panic!("expected metric, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_time_within_threshold_or_below_floor_is_ignored() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::new(
            "startup",
            "Startup",
            Category::Functional,
            SleepCheck(Duration::from_millis(280)),
        )]);
        let findings = engine
            .run(&suites, &timed_baseline("startup", 250), &RunContext::new("."))
            .await;
        assert_eq!(findings.len(), 1);

        // 280ms against a 20ms baseline would be a big jump, but 20ms is under the floor.
        let findings = engine
            .run(&suites, &timed_baseline("startup", 20), &RunContext::new("."))
            .await;
        assert_eq!(findings.len(), 1);
    }

    #[tokio::test]
    async fn test_blocking_closure_honours_timeout() {
        // Single-threaded runtime: the timeout only fires if the closure is
        // off the worker thread.
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "blocking",
            "Blocking",
            Category::Functional,
            |_| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(CheckOutput::metric(1.0))
            },
        )
        .with_timeout(Duration::from_millis(50))]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        match &findings[0].kind {
            FindingKind::Failure { message } => assert!(message.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_suite() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![
            RegressionTest::from_fn("boom", "Boom", Category::Functional, |_| {
                anyhow::bail!("database unreachable")
            }),
            RegressionTest::from_fn("ok", "Ok", Category::Functional, |_| {
                Ok(CheckOutput::outcome(json!({"ok": true})))
            }),
        ]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        assert_eq!(findings.len(), 2);
        match &findings[0].kind {
            FindingKind::Failure { message } => assert!(message.contains("database unreachable")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(findings[1].kind, FindingKind::FirstObservation);
    }

    #[tokio::test]
    async fn test_panicking_check_becomes_failure() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "panics",
            "Panics",
            Category::Functional,
            |_| panic!("index out of bounds"),
        )]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        match &findings[0].kind {
            FindingKind::Failure { message } => assert!(message.contains("index out of bounds")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    struct SlowCheck;

    #[async_trait::async_trait]
    impl crate::suite::RegressionCheck for SlowCheck {
        async fn run(&self, _ctx: &RunContext) -> anyhow::Result<CheckOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CheckOutput::metric(1.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failure() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::new(
            "slow",
            "Slow",
            Category::Performance,
            SlowCheck,
        )
        .with_timeout(Duration::from_millis(100))]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        match &findings[0].kind {
            FindingKind::Failure { message } => assert!(message.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_tests_are_skipped() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "off",
            "Off",
            Category::Functional,
            |_| Ok(CheckOutput::metric(1.0)),
        )
        .disabled()]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_registration_order() {
        let engine = RegressionEngine::new(EngineConfig {
            max_concurrency: 4,
            ..EngineConfig::default()
        });
        let tests = (0..10)
            .map(|i| {
                RegressionTest::from_fn(format!("t{i}"), "T", Category::Regression, move |_| {
                    Ok(CheckOutput::metric(i as f64))
                })
            })
            .collect();
        let executions = engine.execute(&suite(tests), &RunContext::new(".")).await;
        let ids: Vec<String> = executions.iter().map(|e| e.test_id.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_metric_threshold_by_category() {
        let engine = RegressionEngine::default();
        // 15% drop: over the 10% metric threshold, under the 20% performance one.
        let suites = suite(vec![
            RegressionTest::from_fn("coverage", "Coverage", Category::Regression, |_| {
                Ok(CheckOutput::metric(85.0))
            }),
            RegressionTest::from_fn("throughput", "Throughput", Category::Performance, |_| {
                Ok(CheckOutput::metric(85.0))
            }),
        ]);
        let base = baseline(&[("coverage", 100.0), ("throughput", 100.0)], &[]);
        let findings = engine.run(&suites, &base, &RunContext::new(".")).await;
        match (&findings[0].kind, &findings[1].kind) {
            (FindingKind::Metric(a), FindingKind::Metric(b)) => {
                assert!(a.regressed);
                assert!(!b.regressed);
                assert_eq!(b.threshold, DEFAULT_PERFORMANCE_THRESHOLD);
            }
            other => panic!("expected metric findings, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duration_metric_regresses_when_slower() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "build_time",
            "Build time",
            Category::Performance,
            |_| Ok(CheckOutput::duration_metric(1.3)),
        )]);
        let base = baseline(&[("build_time", 1.0)], &[]);
        let findings = engine.run(&suites, &base, &RunContext::new(".")).await;
        match &findings[0].kind {
            FindingKind::Metric(m) => {
                assert!(m.regressed);
                assert!((m.delta.expect("delta") - 0.3).abs() < 1e-9);
            }
            other => panic!("expected metric, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_metric_is_never_a_regression() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "fresh",
            "Fresh",
            Category::Regression,
            |_| Ok(CheckOutput::metric(1.0)),
        )]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        match &findings[0].kind {
            FindingKind::Metric(m) => {
                assert!(!m.regressed);
                assert!(m.baseline.is_none());
                assert!(m.delta.is_none());
            }
            other => panic!("expected metric, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quality_bar_miss_recorded() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "doc_coverage",
            "Doc coverage",
            Category::Quality,
            |_| Ok(CheckOutput::metric(0.55)),
        )
        .with_quality_bar(0.8)]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        match &findings[0].kind {
            FindingKind::Metric(m) => assert_eq!(m.missed_quality_bar, Some(0.8)),
            other => panic!("expected metric, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_kind_switch_is_structural() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "health",
            "Health",
            Category::Functional,
            |_| Ok(CheckOutput::metric(1.0)),
        )]);
        let base = baseline(&[], &[("health", json!({"status": "healthy"}))]);
        let findings = engine.run(&suites, &base, &RunContext::new(".")).await;
        assert!(matches!(
            findings[0].kind,
            FindingKind::StructuralMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_non_finite_metric_is_failure() {
        let engine = RegressionEngine::default();
        let suites = suite(vec![RegressionTest::from_fn(
            "nan",
            "NaN",
            Category::Regression,
            |_| Ok(CheckOutput::metric(f64::NAN)),
        )]);
        let findings = engine
            .run(&suites, &Baseline::empty(Utc::now()), &RunContext::new("."))
            .await;
        assert!(matches!(findings[0].kind, FindingKind::Failure { .. }));
    }
}
