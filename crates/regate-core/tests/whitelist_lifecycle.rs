use chrono::{DateTime, Utc};
use regate_core::{
    Category, ConfigError, RuleStatus, Severity, ValidationIssue, WhitelistError,
    WhitelistManager, WhitelistRule,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn perf_issue(test_id: &str) -> ValidationIssue {
    ValidationIssue::new(test_id, Category::Performance, Severity::Critical, "slow")
        .with_file_path(Some("src/hot_path.rs".to_string()))
}

#[test]
fn json_toml_and_yaml_files_load_the_same_rules() {
    let dir = tempfile::tempdir().unwrap();
    let json = write(
        &dir,
        "w.json",
        r#"{"version": 1, "rules": [
            {"rule_id": "perf", "pattern": "^performance:", "reason": "noisy runners",
             "approved_by": "alice", "max_severity": "critical", "expires_at": 2000000000}
        ]}"#,
    );
    let toml = write(
        &dir,
        "w.toml",
        r#"
version = 1

[[rules]]
rule_id = "perf"
pattern = "^performance:"
reason = "noisy runners"
approved_by = "alice"
max_severity = "critical"
expires_at = 2000000000
"#,
    );
    let yaml = write(
        &dir,
        "w.yaml",
        r#"
- rule_id: perf
  pattern: "^performance:"
  reason: noisy runners
  approved_by: alice
  max_severity: critical
  expires_at: 2000000000
"#,
    );

    for path in [json, toml, yaml] {
        let wl = WhitelistManager::load(&path).unwrap();
        let rule = wl.get_rule("perf").unwrap();
        assert_eq!(rule.max_severity(), Severity::Critical);
        assert_eq!(rule.expiry(), Some(2_000_000_000));
        assert_eq!(rule.status(), RuleStatus::Active);
        assert!(wl.find_match(&perf_issue("latency"), at(1_700_000_000)).is_some());
    }
}

#[test]
fn missing_field_error_names_the_rule() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "w.json",
        r#"[{"rule_id": "no-approver", "pattern": ".*", "reason": "r"}]"#,
    );
    let err = WhitelistManager::load(&path).unwrap_err();
    match &err {
        ConfigError::MissingField { rule_id, field } => {
            assert_eq!(rule_id, "no-approver");
            assert_eq!(*field, "approved_by");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("no-approver"));
}

#[test]
fn invalid_severity_or_status_names_the_rule() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "w.json",
        r#"[{"rule_id": "ok", "pattern": ".*", "reason": "r", "approved_by": "a"},
            {"rule_id": "typo", "pattern": ".*", "reason": "r", "approved_by": "a",
             "max_severity": "critcal"}]"#,
    );
    let err = WhitelistManager::load(&path).unwrap_err();
    match &err {
        ConfigError::InvalidField { rule_id, field, value } => {
            assert_eq!(rule_id, "typo");
            assert_eq!(*field, "max_severity");
            assert_eq!(value, "critcal");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("typo"));

    let toml = write(
        &dir,
        "w.toml",
        r#"
[[rules]]
rule_id = "bad-status"
pattern = ".*"
reason = "r"
approved_by = "a"
status = "enabled"
"#,
    );
    assert!(matches!(
        WhitelistManager::load(&toml),
        Err(ConfigError::InvalidField { ref rule_id, field: "status", .. }) if rule_id == "bad-status"
    ));
}

#[test]
fn missing_and_unsupported_files_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        WhitelistManager::load(dir.path().join("absent.json")),
        Err(ConfigError::WhitelistNotFound { .. })
    ));
    let ini = write(&dir, "w.ini", "[rules]");
    assert!(matches!(
        WhitelistManager::load(&ini),
        Err(ConfigError::UnsupportedFormat { .. })
    ));
    let broken = write(&dir, "w.json", "{not json");
    assert!(matches!(
        WhitelistManager::load(&broken),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn duplicate_rule_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "w.json",
        r#"[
            {"rule_id": "a", "pattern": "x", "reason": "r", "approved_by": "p"},
            {"rule_id": "a", "pattern": "y", "reason": "r", "approved_by": "p"}
        ]"#,
    );
    assert!(matches!(
        WhitelistManager::load(&path),
        Err(ConfigError::DuplicateRuleId(id)) if id == "a"
    ));
}

#[test]
fn invalid_pattern_is_loaded_but_never_matches() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "w.json",
        r#"[
            {"rule_id": "broken", "pattern": "([", "reason": "r", "approved_by": "p",
             "max_severity": "critical"},
            {"rule_id": "ok", "pattern": "latency", "reason": "r", "approved_by": "p",
             "max_severity": "critical"}
        ]"#,
    );
    let mut wl = WhitelistManager::load(&path).unwrap();
    assert_eq!(wl.invalid_rules().count(), 1);

    let mut issues = vec![perf_issue("latency")];
    assert_eq!(wl.apply(&mut issues, at(0)), 1);
    assert_eq!(issues[0].suppressed_by(), Some("ok"));
}

#[test]
fn first_matching_rule_in_file_order_wins() {
    let mut wl = WhitelistManager::with_rules(vec![
        WhitelistRule::new("first", "latency", "r", "a").with_max_severity(Severity::Critical),
        WhitelistRule::new("second", ".*", "r", "a").with_max_severity(Severity::Critical),
    ])
    .unwrap();
    let mut issues = vec![perf_issue("latency"), perf_issue("throughput")];
    wl.apply(&mut issues, at(0));

    assert_eq!(issues[0].suppressed_by(), Some("first"));
    assert_eq!(issues[1].suppressed_by(), Some("second"));
    assert_eq!(wl.audit_trail().for_rule("second").count(), 1);
}

#[test]
fn filters_restrict_matching() {
    let wl = WhitelistManager::with_rules(vec![
        WhitelistRule::new("quality-only", ".*", "r", "a")
            .with_category(Category::Quality)
            .with_max_severity(Severity::Critical),
        WhitelistRule::new("tests-dir", ".*", "r", "a")
            .with_file_pattern("^tests/")
            .with_max_severity(Severity::Critical),
        WhitelistRule::new("warnings", ".*", "r", "a").with_max_severity(Severity::Warning),
    ])
    .unwrap();
    assert!(wl.find_match(&perf_issue("latency"), at(0)).is_none());

    let no_path = ValidationIssue::new("latency", Category::Performance, Severity::Warning, "w");
    assert_eq!(
        wl.find_match(&no_path, at(0)).map(|r| r.rule_id()),
        Some("warnings")
    );
}

#[test]
fn apply_is_idempotent() {
    let mut wl = WhitelistManager::with_rules(vec![
        WhitelistRule::new("all", ".*", "r", "a").with_max_severity(Severity::Critical),
    ])
    .unwrap();
    let mut issues = vec![perf_issue("latency")];
    assert_eq!(wl.apply(&mut issues, at(0)), 1);
    let snapshot = issues.clone();
    assert_eq!(wl.apply(&mut issues, at(0)), 0);
    assert_eq!(issues, snapshot);
    assert_eq!(wl.audit_trail().len(), 1);
}

#[test]
fn review_lifecycle_persists_across_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whitelist.yaml");
    let mut wl = WhitelistManager::with_rules(vec![
        WhitelistRule::new("proposed", "latency", "tracking in #42", "carol")
            .with_max_severity(Severity::Critical)
            .with_status(RuleStatus::PendingReview),
        WhitelistRule::new("temporary", ".*", "migration", "dave").expires_at(500),
    ])
    .unwrap();

    // Pending rules never match.
    assert!(wl.find_match(&perf_issue("latency"), at(0)).is_none());
    wl.approve("proposed").unwrap();
    assert!(wl.find_match(&perf_issue("latency"), at(0)).is_some());

    wl.refresh_expiry(at(1_000));
    assert!(matches!(
        wl.approve("temporary"),
        Err(WhitelistError::InvalidTransition { from: RuleStatus::Expired, .. })
    ));
    assert!(matches!(
        wl.revoke("ghost"),
        Err(WhitelistError::RuleNotFound(_))
    ));

    wl.save(&path, at(1_000)).unwrap();
    let reloaded = WhitelistManager::load(&path).unwrap();
    assert_eq!(
        reloaded.get_rule("proposed").map(|r| r.status()),
        Some(RuleStatus::Active)
    );
    assert_eq!(
        reloaded.get_rule("temporary").map(|r| r.status()),
        Some(RuleStatus::Expired)
    );

    let stats = reloaded.stats(at(1_000));
    assert_eq!(stats.total_rules, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.expired, 1);
}

#[test]
fn revoked_rule_stops_matching_until_reinstated() {
    let mut wl = WhitelistManager::with_rules(vec![
        WhitelistRule::new("r", ".*", "r", "a").with_max_severity(Severity::Critical),
    ])
    .unwrap();
    wl.revoke("r").unwrap();
    assert!(wl.find_match(&perf_issue("latency"), at(0)).is_none());
    assert_eq!(wl.revoked_rules().count(), 1);
    wl.reinstate("r").unwrap();
    assert!(wl.find_match(&perf_issue("latency"), at(0)).is_some());
}
