//! Regression test and suite definitions.
//!
//! A [`RegressionTest`] pairs identity metadata with an executable
//! [`RegressionCheck`]. A check returns either a numeric [`Metric`] or a
//! structural outcome value; returning an error marks the check as failed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Category;

/// Inputs shared by every check in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Root directory of the project under validation.
    pub project_root: PathBuf,
    /// Free-form values made available to custom checks.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl RunContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn var(&self, key: &str) -> Option<&serde_json::Value> {
        self.vars.get(key)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

/// Which way a metric moves when it gets worse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    /// Throughput, coverage, file counts. A drop is a regression.
    #[default]
    HigherIsBetter,
    /// Durations, latencies, error counts. A rise is a regression.
    LowerIsBetter,
}

/// A numeric measurement produced by a check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub value: f64,
    #[serde(default)]
    pub direction: MetricDirection,
}

impl Metric {
    pub fn higher_is_better(value: f64) -> Self {
        Self {
            value,
            direction: MetricDirection::HigherIsBetter,
        }
    }

    pub fn lower_is_better(value: f64) -> Self {
        Self {
            value,
            direction: MetricDirection::LowerIsBetter,
        }
    }
}

/// Value returned by a successful check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CheckOutput {
    Metric(Metric),
    Outcome(serde_json::Value),
}

impl CheckOutput {
    pub fn metric(value: f64) -> Self {
        Self::Metric(Metric::higher_is_better(value))
    }

    pub fn duration_metric(value: f64) -> Self {
        Self::Metric(Metric::lower_is_better(value))
    }

    pub fn outcome(value: serde_json::Value) -> Self {
        Self::Outcome(value)
    }
}

/// An executable check.
#[async_trait]
pub trait RegressionCheck: Send + Sync {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<CheckOutput>;
}

/// Adapter turning a plain closure into a [`RegressionCheck`].
///
/// The closure runs on tokio's blocking pool, so synchronous work (file
/// scans, subprocesses) neither stalls other checks nor escapes the timeout.
pub struct FnCheck<F>(Arc<F>);

impl<F> FnCheck<F> {
    pub fn new(f: F) -> Self {
        Self(Arc::new(f))
    }
}

#[async_trait]
impl<F> RegressionCheck for FnCheck<F>
where
    F: Fn(&RunContext) -> anyhow::Result<CheckOutput> + Send + Sync + 'static,
{
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<CheckOutput> {
        let f = Arc::clone(&self.0);
        let ctx = ctx.clone();
        match tokio::task::spawn_blocking(move || f(&ctx)).await {
            Ok(result) => result,
            // Re-raised so the engine reports it like any other panicking check.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(anyhow::anyhow!("blocking check was cancelled: {}", err)),
        }
    }
}

/// A single regression test.
#[derive(Clone)]
pub struct RegressionTest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    /// File the check is about; copied onto issues for rule file filters.
    pub file_path: Option<String>,
    /// Minimum acceptable value for quality-category metrics.
    pub quality_bar: Option<f64>,
    /// Overrides the engine-wide timeout.
    pub timeout: Option<Duration>,
    pub enabled: bool,
    check: Arc<dyn RegressionCheck>,
}

impl RegressionTest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        check: impl RegressionCheck + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            file_path: None,
            quality_bar: None,
            timeout: None,
            enabled: true,
            check: Arc::new(check),
        }
    }

    /// Build a test from a synchronous closure.
    pub fn from_fn<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        f: F,
    ) -> Self
    where
        F: Fn(&RunContext) -> anyhow::Result<CheckOutput> + Send + Sync + 'static,
    {
        Self::new(id, name, category, FnCheck::new(f))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_quality_bar(mut self, bar: f64) -> Self {
        self.quality_bar = Some(bar);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn check(&self) -> Arc<dyn RegressionCheck> {
        Arc::clone(&self.check)
    }
}

impl fmt::Debug for RegressionTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegressionTest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("file_path", &self.file_path)
            .field("quality_bar", &self.quality_bar)
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Named, ordered collection of tests. Insertion order is execution order.
#[derive(Debug, Clone)]
pub struct RegressionSuite {
    pub suite_id: String,
    pub name: String,
    pub tests: Vec<RegressionTest>,
}

impl RegressionSuite {
    pub fn new(suite_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite_id: suite_id.into(),
            name: name.into(),
            tests: Vec::new(),
        }
    }

    /// Add a test to the suite.
    pub fn add_test(mut self, test: RegressionTest) -> Self {
        self.tests.push(test);
        self
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_check_runs_closure() {
        let test = RegressionTest::from_fn("answer", "Answer", Category::Functional, |ctx| {
            let n = ctx.var("n").and_then(|v| v.as_f64()).unwrap_or(0.0);
            Ok(CheckOutput::metric(n * 2.0))
        });
        let ctx = RunContext::new(".").with_var("n", json!(21));
        let out = test.check().run(&ctx).await.expect("check runs");
        assert_eq!(out, CheckOutput::metric(42.0));
    }

    #[tokio::test]
    async fn test_fn_check_panic_propagates() {
        let test = RegressionTest::from_fn("boom", "Boom", Category::Functional, |_| {
            panic!("closure exploded")
        });
        let ctx = RunContext::new(".");
        let check = test.check();
        let joined = tokio::spawn(async move { check.run(&ctx).await }).await;
        let err = joined.expect_err("panic surfaces through the task");
        assert!(err.is_panic());
    }

    #[test]
    fn test_suite_preserves_insertion_order() {
        let suite = RegressionSuite::new("s", "Suite")
            .add_test(RegressionTest::from_fn("b", "B", Category::Quality, |_| {
                Ok(CheckOutput::metric(1.0))
            }))
            .add_test(RegressionTest::from_fn("a", "A", Category::Quality, |_| {
                Ok(CheckOutput::metric(1.0))
            }));
        let ids: Vec<&str> = suite.tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(suite.len(), 2);
    }

    #[test]
    fn test_builder_flags() {
        let test = RegressionTest::from_fn("t", "T", Category::Performance, |_| {
            Ok(CheckOutput::duration_metric(1.0))
        })
        .with_description("desc")
        .with_file_path("src/lib.rs")
        .with_timeout(Duration::from_millis(50))
        .disabled();
        assert_eq!(test.description, "desc");
        assert_eq!(test.file_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(test.timeout, Some(Duration::from_millis(50)));
        assert!(!test.enabled);
    }

    #[test]
    fn test_check_output_serde_shape() {
        let raw = serde_json::to_value(CheckOutput::duration_metric(1.5)).expect("serialize");
        assert_eq!(raw["kind"], json!("metric"));
        assert_eq!(raw["value"]["direction"], json!("lower_is_better"));
    }
}
