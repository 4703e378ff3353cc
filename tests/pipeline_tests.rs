//! Library-level end-to-end run: label a corpus, train both families,
//! promote, then score a file with whatever is active.

use std::path::{Path, PathBuf};

use speclens::core::config::{DatasetConfig, OracleConfig};
use speclens::governance::{CandidateModel, PointerStore, PromotionDecision, PromotionGovernor, StoreRegistry};
use speclens::models::{ArtifactStore, FsArtifactStore, ModelFamily, Trainer};
use speclens::oracle::Label;
use speclens::serving::{Predictor, RiskLevel};
use speclens::{Dataset, DatasetBuilder, FeatureSchema, SpecLensConfig};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn builder() -> DatasetBuilder {
    let oracle = OracleConfig {
        seed: Some(23),
        ..OracleConfig::default()
    };
    DatasetBuilder::new(oracle, DatasetConfig::default())
}

#[test]
fn corpus_labels_are_what_the_contracts_say() {
    let (dataset, summary) = builder().build(&fixture("corpus")).unwrap();

    assert_eq!(summary.files_seen, 4);
    assert_eq!(summary.files_skipped.len(), 1);
    assert_eq!(summary.files_skipped[0].file, "broken.py");
    assert_eq!(summary.units_skipped, 2);
    assert_eq!(dataset.schema, FeatureSchema::contract());

    let label_of = |name: &str| {
        dataset
            .examples
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.label)
            .unwrap_or_else(|| panic!("no row for {name}"))
    };
    assert_eq!(label_of("successor"), Label::Risky);
    assert_eq!(label_of("largest"), Label::Risky);
    assert_eq!(label_of("square"), Label::Safe);
    assert_eq!(label_of("clamp"), Label::Safe);
    assert_eq!(label_of("magnitude"), Label::Safe);
    assert_eq!(label_of("shout"), Label::Safe);
    assert_eq!(label_of("count"), Label::Safe);
}

#[test]
fn dataset_table_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.csv");
    let (dataset, _) = builder().build(&fixture("corpus")).unwrap();

    dataset.write_csv(&path).unwrap();
    let reread = Dataset::read_csv(&path).unwrap();
    assert_eq!(reread, dataset);
}

#[test]
fn trained_candidates_flow_through_governance_into_serving() {
    let dir = tempfile::tempdir().unwrap();
    let (dataset, _) = builder().build(&fixture("corpus")).unwrap();
    let config = SpecLensConfig::default();
    let trainer = Trainer::from_config(&config);

    let mut candidates = Vec::new();
    for family in [ModelFamily::Logistic, ModelFamily::Tree] {
        let outcome = trainer.train(&dataset, family, family.as_str()).unwrap();
        let path = dir.path().join(format!("{family}.json"));
        FsArtifactStore.save(&path, &outcome.artifact).unwrap();
        candidates.push(CandidateModel::new(family.as_str(), path));
    }

    let pointers = PointerStore::new(dir.path().join("active.txt"), dir.path().join("history.jsonl"));

    // An impossible bar: nothing moves
    let strict = PromotionGovernor::new(StoreRegistry::<FsArtifactStore>::default(), pointers.clone(), 1.0);
    let rejected = strict.run(&candidates, &dataset).unwrap();
    if let PromotionDecision::BelowThreshold { .. } = rejected.decision {
        assert_eq!(pointers.read().unwrap(), None);
    }

    let lenient = PromotionGovernor::new(StoreRegistry::<FsArtifactStore>::default(), pointers.clone(), 0.0);
    let report = lenient.run(&candidates, &dataset).unwrap();
    let selected = report.selected().unwrap().candidate.clone();
    let active = pointers.read().unwrap().unwrap();
    assert_eq!(active.artifact, selected.path);

    let predictor =
        Predictor::from_pointer(&pointers, &FsArtifactStore, config.risk_thresholds).unwrap();
    assert_eq!(predictor.artifact().name, selected.name);

    let report = predictor.analyze_file(&fixture("calc.py")).unwrap();
    assert_eq!(report.entries.len(), 4);
    let total = report.count(RiskLevel::Low) + report.count(RiskLevel::Medium) + report.count(RiskLevel::High);
    assert_eq!(total, 4);
}
