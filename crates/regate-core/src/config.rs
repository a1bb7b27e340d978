//! Validator configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! the stock configuration. The CLI layers flag and `REGATE_*` environment
//! overrides on top of whatever the file provides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::engine::{
    EngineConfig, DEFAULT_DURATION_FLOOR_MS, DEFAULT_METRIC_THRESHOLD, DEFAULT_PERFORMANCE_THRESHOLD,
};

/// Whether validation may proceed without a stored baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMode {
    /// A missing baseline is treated as a first run: nothing to compare.
    #[default]
    Optional,
    /// A missing baseline is fatal.
    Required,
}

fn default_baseline_dir() -> PathBuf {
    PathBuf::from(".baselines")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".validation")
}

fn default_true() -> bool {
    true
}

fn default_metric_threshold() -> f64 {
    DEFAULT_METRIC_THRESHOLD
}

fn default_performance_threshold() -> f64 {
    DEFAULT_PERFORMANCE_THRESHOLD
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    8
}

fn default_duration_floor_ms() -> u64 {
    DEFAULT_DURATION_FLOOR_MS
}

fn default_extensions() -> Vec<String> {
    vec!["rs".to_string()]
}

/// Configuration for a [`crate::StrictValidator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictValidationConfig {
    pub project_root: PathBuf,
    /// Relative paths resolve against `project_root`.
    #[serde(default = "default_baseline_dir")]
    pub baseline_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub whitelist_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub strict_mode: bool,
    pub baseline_mode: BaselineMode,
    #[serde(default = "default_metric_threshold")]
    pub metric_threshold: f64,
    #[serde(default = "default_performance_threshold")]
    pub performance_threshold: f64,
    #[serde(default = "default_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Check run times are compared only above this baseline run time.
    #[serde(default = "default_duration_floor_ms")]
    pub duration_floor_ms: u64,
    #[serde(default = "default_extensions")]
    pub source_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub include_builtin_checks: bool,
    #[serde(default = "default_true")]
    pub write_reports: bool,
}

impl Default for StrictValidationConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            baseline_dir: default_baseline_dir(),
            output_dir: default_output_dir(),
            whitelist_path: None,
            strict_mode: true,
            baseline_mode: BaselineMode::Optional,
            metric_threshold: DEFAULT_METRIC_THRESHOLD,
            performance_threshold: DEFAULT_PERFORMANCE_THRESHOLD,
            test_timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            duration_floor_ms: DEFAULT_DURATION_FLOOR_MS,
            source_extensions: default_extensions(),
            include_builtin_checks: true,
            write_reports: true,
        }
    }
}

impl StrictValidationConfig {
    /// Defaults rooted at `project_root`.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file and validate.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("metric_threshold", self.metric_threshold),
            ("performance_threshold", self.performance_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn resolved_baseline_dir(&self) -> PathBuf {
        self.resolve(&self.baseline_dir)
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    pub fn resolved_whitelist_path(&self) -> Option<PathBuf> {
        self.whitelist_path.as_deref().map(|p| self.resolve(p))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            metric_threshold: self.metric_threshold,
            performance_threshold: self.performance_threshold,
            test_timeout: Duration::from_secs(self.test_timeout_secs),
            max_concurrency: self.max_concurrency.max(1),
            duration_floor_ms: self.duration_floor_ms,
        }
    }
}
