//! Built-in checks shipped with the default configuration.
//!
//! They go through the same engine, classifier and whitelist path as any
//! custom check.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::json;

use crate::domain::{Category, Severity, ValidationIssue};
use crate::suite::{CheckOutput, RegressionCheck, RegressionSuite, RegressionTest, RunContext};
use crate::whitelist::{WhitelistManager, WhitelistRule};

pub const BUILTIN_SUITE_ID: &str = "builtin";
pub const MODULE_IMPORTABILITY: &str = "module_importability";
pub const SMOKE: &str = "smoke";
pub const SOURCE_FILE_COUNT: &str = "source_file_count";

const ENTRY_POINTS: [&str; 2] = ["lib.rs", "main.rs"];

/// Recursively collect files under `dir` whose extension is in `extensions`.
/// Sorted for stable output. A missing directory yields no files.
fn source_files(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| want == ext))
            {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Checks that the source tree is present and every source file is readable
/// text. Outcome shape:
/// `{"source_root": bool, "entry_points": [..], "unreadable": [..]}`.
pub struct ModuleImportability {
    pub extensions: Vec<String>,
}

#[async_trait]
impl RegressionCheck for ModuleImportability {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<CheckOutput> {
        let root = ctx.project_root();
        let src = root.join("src");
        let entry_points: Vec<&str> = ENTRY_POINTS
            .iter()
            .copied()
            .filter(|name| src.join(name).is_file())
            .collect();

        let mut unreadable = Vec::new();
        for path in source_files(&src, &self.extensions)
            .with_context(|| format!("scan {}", src.display()))?
        {
            let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            if std::str::from_utf8(&bytes).is_err() {
                unreadable.push(relative(root, &path));
            }
        }

        Ok(CheckOutput::outcome(json!({
            "source_root": src.is_dir(),
            "entry_points": entry_points,
            "unreadable": unreadable,
        })))
    }
}

/// Exercises severity ordering, rule matching and the blocker gate against
/// an in-process whitelist.
pub struct SmokeCheck;

#[async_trait]
impl RegressionCheck for SmokeCheck {
    async fn run(&self, _ctx: &RunContext) -> anyhow::Result<CheckOutput> {
        let severity_order = Severity::ALL.windows(2).all(|w| w[0] < w[1]);

        let now = DateTime::from_timestamp(0, 0).context("epoch timestamp")?;
        let whitelist = WhitelistManager::with_rules(vec![WhitelistRule::new(
            "smoke-all",
            ".*",
            "smoke check",
            "regate",
        )
        .with_max_severity(Severity::Blocker)])?;

        let critical =
            ValidationIssue::new("smoke_metric", Category::Performance, Severity::Critical, "self-check");
        let blocker =
            ValidationIssue::new("smoke_shape", Category::Functional, Severity::Blocker, "self-check");

        Ok(CheckOutput::outcome(json!({
            "severity_order": severity_order,
            "rule_match": whitelist.find_match(&critical, now).is_some(),
            "blocker_gate": whitelist.find_match(&blocker, now).is_none(),
        })))
    }
}

/// Counts source files under `src/`. Higher is better: losing files is a
/// regression.
pub struct SourceFileCount {
    pub extensions: Vec<String>,
}

#[async_trait]
impl RegressionCheck for SourceFileCount {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<CheckOutput> {
        let src = ctx.project_root().join("src");
        let files =
            source_files(&src, &self.extensions).with_context(|| format!("scan {}", src.display()))?;
        Ok(CheckOutput::metric(files.len() as f64))
    }
}

/// The built-in suite: importability, smoke, source file count.
pub fn default_suite(extensions: &[String]) -> RegressionSuite {
    RegressionSuite::new(BUILTIN_SUITE_ID, "Built-in checks")
        .add_test(
            RegressionTest::new(
                MODULE_IMPORTABILITY,
                "Module importability",
                Category::Functional,
                ModuleImportability {
                    extensions: extensions.to_vec(),
                },
            )
            .with_description("source root, entry points and readable sources")
            .with_file_path("src"),
        )
        .add_test(
            RegressionTest::new(SMOKE, "Smoke", Category::Functional, SmokeCheck)
                .with_description("severity ordering, rule matching and blocker gate"),
        )
        .add_test(
            RegressionTest::new(
                SOURCE_FILE_COUNT,
                "Source file count",
                Category::Regression,
                SourceFileCount {
                    extensions: extensions.to_vec(),
                },
            )
            .with_description("number of source files under src/")
            .with_file_path("src"),
        )
}
