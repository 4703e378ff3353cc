use super::*;
use crate::core::errors::SpecLensError;

fn expect_validation_error<T: std::fmt::Debug>(result: Result<T>) -> SpecLensError {
    result.expect_err("expected validation failure")
}

#[test]
fn default_configs_validate_successfully() {
    SpecLensConfig::default()
        .validate()
        .expect("speclens default");
    OracleConfig::default().validate().expect("oracle default");
    GovernanceConfig::default()
        .validate()
        .expect("governance default");
    RiskThresholds::default()
        .validate()
        .expect("thresholds default");
}

#[test]
fn oracle_defaults_match_documented_values() {
    let config = OracleConfig::default();
    assert_eq!(config.trials, 20);
    assert_eq!(config.int_range, [-5, 5]);
    assert!(config.seed.is_none());
    assert_eq!(config.unresolved_policy, UnresolvedPolicy::AssumeSafe);
    assert!(!config.check_invariants);
}

#[test]
fn oracle_config_rejects_zero_trials_and_inverted_ranges() {
    let mut config = OracleConfig::default();
    config.trials = 0;
    let err = expect_validation_error(config.validate());
    assert!(format!("{err}").contains("oracle.trials"), "{err}");

    let mut config = OracleConfig::default();
    config.int_range = [5, -5];
    let err = expect_validation_error(config.validate());
    assert!(format!("{err}").contains("oracle.int_range"), "{err}");

    let mut config = OracleConfig::default();
    config.float_range = [0.0, f64::INFINITY];
    let err = expect_validation_error(config.validate());
    assert!(format!("{err}").contains("oracle.float_range"), "{err}");
}

#[test]
fn risk_thresholds_must_be_ordered() {
    let thresholds = RiskThresholds {
        low: 0.8,
        medium: 0.4,
    };
    let err = expect_validation_error(thresholds.validate());
    assert!(matches!(err, SpecLensError::Validation { .. }));
}

#[test]
fn governance_rejects_duplicate_candidates() {
    let mut config = GovernanceConfig::default();
    config.candidates.push(CandidateEntry {
        name: "logistic".into(),
        path: "elsewhere.json".into(),
    });
    let err = expect_validation_error(config.validate());
    assert!(format!("{err}").contains("duplicate"), "{err}");
}

#[test]
fn governance_min_recall_bounds() {
    let mut config = GovernanceConfig::default();
    config.min_recall = 1.2;
    let err = expect_validation_error(config.validate());
    assert!(format!("{err}").contains("min_recall"), "{err}");
}

#[test]
fn dataset_extensions_are_dotless() {
    let mut config = DatasetConfig::default();
    config.extensions = vec![".py".into()];
    let err = expect_validation_error(config.validate());
    assert!(format!("{err}").contains("without a dot"), "{err}");
}

#[test]
fn partial_yaml_falls_back_to_defaults() {
    let yaml = r#"
oracle:
  trials: 7
  seed: 11
  unresolved_policy: assume_risky
  name_hints:
    amount: int
    label: str
governance:
  min_recall: 0.95
"#;
    let config: SpecLensConfig = serde_yaml::from_str(yaml).expect("parse yaml");
    assert_eq!(config.oracle.trials, 7);
    assert_eq!(config.oracle.seed, Some(11));
    assert_eq!(config.oracle.unresolved_policy, UnresolvedPolicy::AssumeRisky);
    assert_eq!(config.oracle.name_hints.get("label"), Some(&TypeHint::Str));
    assert_eq!(config.oracle.step_budget, 100_000);
    assert_eq!(config.governance.min_recall, 0.95);
    assert_eq!(config.governance.candidates.len(), 2);
    assert_eq!(config.risk_thresholds.low, 0.3);
    config.validate().expect("partial config validates");
}

#[test]
fn yaml_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("speclens.yml");

    let mut config = SpecLensConfig::default();
    config.oracle.seed = Some(99);
    config.training.validation_fraction = 0.25;
    config.to_yaml_file(&path).expect("write");

    let loaded = SpecLensConfig::from_yaml_file(&path).expect("read");
    assert_eq!(loaded.oracle.seed, Some(99));
    assert_eq!(loaded.training.validation_fraction, 0.25);
}

#[test]
fn missing_config_file_is_io_error() {
    let err = SpecLensConfig::from_yaml_file("/definitely/not/here.yml").unwrap_err();
    assert!(matches!(err, SpecLensError::Io { .. }));
}
