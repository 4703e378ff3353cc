//! Integration tests for the SpecLens CLI
//!
//! These tests drive the binary end to end: parsing, labeling, dataset
//! building, training, promotion and prediction.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

/// Test helper to get the CLI binary
fn speclens_cmd() -> Command {
    Command::cargo_bin("speclens").unwrap()
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Configuration that keeps every artifact inside `dir`.
fn write_config(dir: &Path, min_recall: f64) -> PathBuf {
    let models = dir.join("models");
    let config = format!(
        r#"
oracle:
  seed: 11
dataset:
  parallel: false
governance:
  min_recall: {min_recall}
  candidates:
    - name: logistic
      path: {logistic}
    - name: tree
      path: {tree}
  pointer_path: {pointer}
  history_path: {history}
"#,
        logistic = models.join("logistic.json").display(),
        tree = models.join("tree.json").display(),
        pointer = models.join("active_model.txt").display(),
        history = models.join("promotions.jsonl").display(),
    );
    let path = dir.join("speclens.yml");
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn test_cli_help() {
    speclens_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build-dataset"))
        .stdout(predicate::str::contains("promote"));
}

#[test]
fn test_cli_version() {
    speclens_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_print_default_config() {
    speclens_cmd()
        .arg("print-default-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("min_recall"))
        .stdout(predicate::str::contains("unresolved_policy"));
}

#[test]
fn test_init_config_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speclens.yml");

    speclens_cmd()
        .args(["init-config", "--output"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    speclens_cmd()
        .args(["init-config", "--output"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    speclens_cmd()
        .args(["init-config", "--force", "--output"])
        .arg(&path)
        .assert()
        .success();

    speclens_cmd()
        .arg("validate-config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_validate_config_rejects_bad_thresholds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.yml");
    fs::write(&path, "risk_thresholds:\n  low: 0.9\n  medium: 0.2\n").unwrap();

    speclens_cmd()
        .arg("validate-config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("risk_thresholds"));
}

#[test]
fn test_parse_lists_units_as_json() {
    let output = speclens_cmd()
        .args(["parse", "--format", "json"])
        .arg(fixture("calc.py"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let units: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = units
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["div", "square", "__init__", "bump"]);
    assert_eq!(units[0]["requires"][0], "b != 0");
    assert_eq!(units[3]["invariants"][0], "self.count >= 0");
}

#[test]
fn test_parse_fails_fast_on_syntax_error() {
    speclens_cmd()
        .arg("parse")
        .arg(fixture("corpus/broken.py"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parse error"));
}

#[test]
fn test_label_reports_verdicts() {
    speclens_cmd()
        .args(["label", "--seed", "5"])
        .arg(fixture("corpus/arith.py"))
        .assert()
        .success()
        .stdout(predicate::str::contains("successor"))
        .stdout(predicate::str::contains("RISKY"))
        .stdout(predicate::str::contains("SAFE"));
}

#[test]
fn test_build_dataset_skips_broken_files() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), 0.8);
    let out = dir.path().join("dataset.csv");

    speclens_cmd()
        .arg("--config")
        .arg(&config)
        .arg("build-dataset")
        .arg(fixture("corpus"))
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("broken.py"));

    let table = fs::read_to_string(&out).unwrap();
    let header = table.lines().next().unwrap();
    assert!(header.starts_with("n_params,"));
    assert!(header.ends_with("label,source_file,name,class"));
    assert!(table.contains(",arith.py,div,"));
    assert!(table.contains(",accounts.py,withdraw,Account"));
    assert!(!table.contains("broken.py"));
    assert!(!table.contains("__init__"));
}

#[test]
fn test_build_dataset_is_reproducible_with_a_seed() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), 0.8);
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");

    for out in [&first, &second] {
        speclens_cmd()
            .arg("--config")
            .arg(&config)
            .arg("build-dataset")
            .arg(fixture("corpus"))
            .arg(out)
            .assert()
            .success();
    }
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_predict_without_active_model_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), 0.8);

    speclens_cmd()
        .arg("--config")
        .arg(&config)
        .arg("predict")
        .arg(fixture("calc.py"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active model"));
}

#[test]
fn test_promote_with_no_artifacts_is_a_reported_no_op() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), 0.8);
    let held_out = dir.path().join("held_out.csv");
    speclens_cmd()
        .arg("--config")
        .arg(&config)
        .arg("build-dataset")
        .arg(fixture("corpus"))
        .arg(&held_out)
        .assert()
        .success();

    speclens_cmd()
        .arg("--config")
        .arg(&config)
        .arg("promote")
        .arg(&held_out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to promote"));
    assert!(!dir.path().join("models").join("active_model.txt").exists());
}

#[test]
fn test_full_pipeline() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), 0.0);
    let dataset = dir.path().join("dataset.csv");

    speclens_cmd()
        .arg("--config")
        .arg(&config)
        .arg("build-dataset")
        .arg(fixture("corpus"))
        .arg(&dataset)
        .assert()
        .success();

    for model in ["logistic", "tree"] {
        speclens_cmd()
            .arg("--config")
            .arg(&config)
            .args(["train", "--model", model])
            .arg(&dataset)
            .assert()
            .success()
            .stdout(predicate::str::contains("Trained"));
        assert!(dir.path().join("models").join(format!("{model}.json")).exists());
    }

    let output = speclens_cmd()
        .arg("--config")
        .arg(&config)
        .args(["promote", "--format", "json"])
        .arg(&dataset)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["decision"]["decision"], "promoted");
    assert_eq!(report["pointer_after"]["version"], 1);

    // Same inputs again: nothing changes
    let output = speclens_cmd()
        .arg("--config")
        .arg(&config)
        .args(["promote", "--format", "json"])
        .arg(&dataset)
        .output()
        .unwrap();
    let again: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(again["decision"]["decision"], "already_active");
    assert_eq!(again["pointer_after"], report["pointer_after"]);

    let output = speclens_cmd()
        .arg("--config")
        .arg(&config)
        .args(["predict", "--format", "json"])
        .arg(fixture("calc.py"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let served: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = served["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 4);
    for entry in entries {
        let p = entry["probability"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
        assert!(["LOW", "MEDIUM", "HIGH"].contains(&entry["level"].as_str().unwrap()));
    }
}
