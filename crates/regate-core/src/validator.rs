//! Top-level orchestration: baseline capture and strict validation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::baseline_store::{BaselineStore, FsBaselineStore};
use crate::builtin;
use crate::classifier::SeverityClassifier;
use crate::clock::{Clock, SystemClock};
use crate::config::{BaselineMode, StrictValidationConfig};
use crate::domain::{Baseline, ConfigError, RegateError, Result, ValidationResult};
use crate::engine::{ExecutionOutcome, RegressionEngine};
use crate::metrics::METRICS;
use crate::obs;
use crate::reporting::{self, AuditReport};
use crate::suite::{CheckOutput, RegressionSuite, RunContext};
use crate::whitelist::WhitelistManager;

/// Runs registered suites against the stored baseline, classifies the
/// findings and applies the whitelist.
///
/// Owns exactly one [`WhitelistManager`] for its lifetime.
pub struct StrictValidator {
    config: StrictValidationConfig,
    clock: Arc<dyn Clock>,
    store: Box<dyn BaselineStore>,
    engine: RegressionEngine,
    classifier: SeverityClassifier,
    whitelist: WhitelistManager,
    suites: Vec<RegressionSuite>,
    /// Audit trail length before the most recent run.
    last_run_audit_offset: usize,
}

impl std::fmt::Debug for StrictValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrictValidator")
            .field("config", &self.config)
            .field("baseline", &self.store.location())
            .field("suites", &self.suites.len())
            .field("rules", &self.whitelist.rules().len())
            .finish_non_exhaustive()
    }
}

impl StrictValidator {
    /// Build a validator from configuration.
    ///
    /// Loads the whitelist when `whitelist_path` is set (a missing file is an
    /// error) and registers the built-in suite when enabled.
    pub fn new(config: StrictValidationConfig) -> Result<Self> {
        config.validate()?;
        let whitelist = match config.resolved_whitelist_path() {
            Some(path) => WhitelistManager::load(&path)?,
            None => WhitelistManager::new(),
        };
        let store = FsBaselineStore::new(config.resolved_baseline_dir());
        let engine = RegressionEngine::new(config.engine_config());

        let mut validator = Self {
            clock: Arc::new(SystemClock),
            store: Box::new(store),
            engine,
            classifier: SeverityClassifier::new(),
            whitelist,
            suites: Vec::new(),
            last_run_audit_offset: 0,
            config,
        };
        if validator.config.include_builtin_checks {
            let suite = builtin::default_suite(&validator.config.source_extensions);
            validator.register_suite(suite)?;
        }
        Ok(validator)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: impl BaselineStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Replace the whitelist, e.g. with rules built in code.
    pub fn with_whitelist(mut self, whitelist: WhitelistManager) -> Self {
        self.whitelist = whitelist;
        self.last_run_audit_offset = 0;
        self
    }

    /// Register a suite. Test ids must be unique across all suites.
    pub fn register_suite(&mut self, suite: RegressionSuite) -> std::result::Result<(), ConfigError> {
        let mut seen: HashSet<&str> = self
            .suites
            .iter()
            .flat_map(|s| s.tests.iter())
            .map(|t| t.id.as_str())
            .collect();
        for test in &suite.tests {
            if !seen.insert(test.id.as_str()) {
                return Err(ConfigError::DuplicateCheckId(test.id.clone()));
            }
        }
        tracing::debug!(suite = %suite.suite_id, tests = suite.len(), "suite registered");
        self.suites.push(suite);
        Ok(())
    }

    pub fn config(&self) -> &StrictValidationConfig {
        &self.config
    }

    pub fn suites(&self) -> &[RegressionSuite] {
        &self.suites
    }

    pub fn whitelist(&self) -> &WhitelistManager {
        &self.whitelist
    }

    /// Administrative access to the rule set (add, approve, revoke...).
    pub fn whitelist_mut(&mut self) -> &mut WhitelistManager {
        &mut self.whitelist
    }

    pub fn baseline_store(&self) -> &dyn BaselineStore {
        self.store.as_ref()
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.config.project_root.clone())
    }

    /// Run every registered check once and persist the outputs as the new
    /// baseline. If any check fails, nothing is written.
    pub async fn create_baseline(&self) -> Result<Baseline> {
        let now = self.clock.now();
        let executions = self.engine.execute(&self.suites, &self.run_context()).await;

        let mut metrics = BTreeMap::new();
        let mut outcomes = BTreeMap::new();
        let mut durations = BTreeMap::new();
        for exec in executions {
            if matches!(exec.outcome, ExecutionOutcome::Completed { .. }) {
                durations.insert(exec.test_id.clone(), exec.duration_ms);
            }
            match exec.outcome {
                ExecutionOutcome::Completed {
                    output: CheckOutput::Metric(m),
                } => {
                    metrics.insert(exec.test_id, m.value);
                }
                ExecutionOutcome::Completed {
                    output: CheckOutput::Outcome(v),
                } => {
                    outcomes.insert(exec.test_id, v);
                }
                ExecutionOutcome::Failed { message } => {
                    return Err(RegateError::BaselineCapture {
                        test_id: exec.test_id,
                        message,
                    });
                }
                ExecutionOutcome::TimedOut { after_ms } => {
                    return Err(RegateError::BaselineCapture {
                        test_id: exec.test_id,
                        message: format!("timed out after {}ms", after_ms),
                    });
                }
            }
        }

        let baseline = Baseline::from_parts(now, metrics, outcomes).with_durations(durations);
        self.store.save(&baseline)?;
        obs::emit_baseline_created(baseline.metrics().len(), baseline.outcomes().len());
        Ok(baseline)
    }

    fn load_baseline(&self) -> Result<Baseline> {
        match self.store.load() {
            Ok(baseline) => Ok(baseline),
            Err(RegateError::BaselineMissing { path })
                if self.config.baseline_mode == BaselineMode::Optional =>
            {
                tracing::info!(path = %path.display(), "no baseline yet; treating run as first observation");
                Ok(Baseline::empty(self.clock.now()))
            }
            Err(e) => Err(e),
        }
    }

    /// Validate every registered suite against the baseline.
    ///
    /// Only storage and configuration problems are errors. Failing checks
    /// and regressions are reported in the returned result.
    pub async fn validate_all(&mut self) -> Result<ValidationResult> {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string());
        self.validate_run(run_id).instrument(span).await
    }

    async fn validate_run(&mut self, run_id: Uuid) -> Result<ValidationResult> {
        let run_id_str = run_id.to_string();
        let started = Instant::now();
        let test_count: usize = self.suites.iter().map(|s| s.len()).sum();
        obs::emit_validation_started(&run_id_str, test_count, self.config.strict_mode);

        let baseline = self.load_baseline()?;
        let findings = self
            .engine
            .run(&self.suites, &baseline, &self.run_context())
            .await;

        let mut issues = self.classifier.classify_all(&findings);
        METRICS.add_issues_emitted(issues.len() as u64);

        let now = self.clock.now();
        self.last_run_audit_offset = self.whitelist.audit_trail().len();
        self.whitelist.apply(&mut issues, now);

        let result =
            ValidationResult::from_issues(issues, self.config.strict_mode, now).with_run_id(run_id);

        if self.config.write_reports {
            let dir = self.config.resolved_output_dir();
            reporting::write_validation_report(&dir, &result)?;
            let stamp = reporting::run_stamp(&result);
            reporting::write_audit_report(&dir, &stamp, &self.audit_report())?;
        }

        METRICS.inc_validations();
        obs::emit_validation_finished(
            &run_id_str,
            started.elapsed().as_millis() as u64,
            result.issues().len(),
            result.suppressed_count(),
            result.overall_passed(),
        );
        METRICS.flush();
        Ok(result)
    }

    /// Audit report covering suppressions from the most recent run.
    pub fn audit_report(&self) -> AuditReport {
        let entries = self.whitelist.audit_trail().tail(self.last_run_audit_offset);
        AuditReport::build(&self.whitelist, entries, self.clock.now())
    }
}
