use std::path::Path;

use super::*;
use crate::core::config::TreeConfig;
use crate::core::featureset::{FeatureSchema, FeatureVector};
use crate::dataset::LabeledExample;
use crate::models::{DecisionTree, TrainedModel, TreeNode};
use crate::oracle::Label;

/// 100 RISKY rows with `k = 0..100` and 10 SAFE rows with `k = -1`.
fn held_out() -> Dataset {
    let row = |k: f64, label: Label| {
        let mut features = FeatureVector::new();
        features.insert("k", k);
        LabeledExample {
            features,
            label,
            source_file: "held_out.py".to_string(),
            name: format!("unit_{k}"),
            class: None,
        }
    };
    let mut examples: Vec<LabeledExample> = (0..100).map(|k| row(f64::from(k), Label::Risky)).collect();
    examples.extend((0..10).map(|_| row(-1.0, Label::Safe)));
    Dataset {
        schema: FeatureSchema::new(["k"]),
        examples,
    }
}

/// Tree flagging `k > threshold` as RISKY.
fn artifact(name: &str, threshold: f64) -> ModelArtifact {
    let tree = DecisionTree::from_root(
        TreeConfig::default(),
        TreeNode::Split {
            feature: 0,
            threshold,
            left: Box::new(TreeNode::Leaf { risky: 0.0, samples: 1 }),
            right: Box::new(TreeNode::Leaf { risky: 1.0, samples: 1 }),
        },
    );
    ModelArtifact::new(name, FeatureSchema::new(["k"]), TrainedModel::Tree(tree))
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    /// Saves an artifact with the given recall over `held_out()`.
    fn candidate(&self, name: &str, recall_percent: u32) -> CandidateModel {
        let path = self.root.join(format!("{name}.json"));
        let threshold = f64::from(100 - recall_percent) - 0.5;
        FsArtifactStore.save(&path, &artifact(name, threshold)).unwrap();
        CandidateModel::new(name, path)
    }

    fn pointers(&self) -> PointerStore {
        PointerStore::new(self.root.join("active_model.txt"), self.root.join("promotions.jsonl"))
    }

    fn governor(&self, min_recall: f64) -> PromotionGovernor {
        PromotionGovernor::new(StoreRegistry::default(), self.pointers(), min_recall)
    }
}

fn recall_of(report: &PromotionReport, name: &str) -> Option<f64> {
    report
        .evaluations
        .iter()
        .find(|e| e.candidate.name == name)
        .and_then(CandidateEvaluation::recall)
}

#[test]
fn promotes_the_higher_recall_candidate() {
    let ws = Workspace::new();
    let a = ws.candidate("a", 91);
    let b = ws.candidate("b", 84);

    let report = ws.governor(0.80).run(&[a.clone(), b], &held_out()).unwrap();

    assert!((recall_of(&report, "a").unwrap() - 0.91).abs() < 1e-9);
    assert!((recall_of(&report, "b").unwrap() - 0.84).abs() < 1e-9);
    assert!(report.decision.is_promoted());
    assert_eq!(report.pointer_before, None);
    let after = report.pointer_after.unwrap();
    assert_eq!(after.artifact, a.path);
    assert_eq!(after.version, 1);
    assert_eq!(ws.pointers().read().unwrap().unwrap().artifact, a.path);
}

#[test]
fn registration_order_does_not_beat_a_higher_recall() {
    let ws = Workspace::new();
    let a = ws.candidate("a", 91);
    let b = ws.candidate("b", 84);

    let report = ws.governor(0.80).run(&[b, a.clone()], &held_out()).unwrap();
    assert_eq!(report.selected().unwrap().candidate, a);
}

#[test]
fn ties_keep_the_first_registered() {
    let ws = Workspace::new();
    let first = ws.candidate("first", 90);
    let second = ws.candidate("second", 90);

    let report = ws.governor(0.80).run(&[first.clone(), second], &held_out()).unwrap();
    match report.decision {
        PromotionDecision::Promoted { candidate, .. } => assert_eq!(candidate, "first"),
        other => panic!("expected promotion, got {other:?}"),
    }
}

#[test]
fn below_threshold_leaves_the_pointer_alone() {
    let ws = Workspace::new();
    let a = ws.candidate("a", 91);
    let b = ws.candidate("b", 84);
    let pointers = ws.pointers();
    std::fs::write(pointers.pointer_path(), "old/model.json\n").unwrap();
    let before = pointers.read().unwrap();

    let report = ws.governor(0.95).run(&[a, b], &held_out()).unwrap();

    match &report.decision {
        PromotionDecision::BelowThreshold {
            candidate,
            recall,
            threshold,
        } => {
            assert_eq!(candidate, "a");
            assert!((recall - 0.91).abs() < 1e-9);
            assert_eq!(*threshold, 0.95);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(report.pointer_before, before);
    assert_eq!(report.pointer_after, before);
    assert_eq!(pointers.read().unwrap(), before);
    assert!(pointers.history().unwrap().is_empty());
}

#[test]
fn second_run_is_a_no_op() {
    let ws = Workspace::new();
    let candidates = [ws.candidate("a", 91), ws.candidate("b", 84)];
    let governor = ws.governor(0.80);

    let first = governor.run(&candidates, &held_out()).unwrap();
    let second = governor.run(&candidates, &held_out()).unwrap();

    assert!(first.decision.is_promoted());
    assert!(matches!(
        second.decision,
        PromotionDecision::AlreadyActive { ref candidate, .. } if candidate == "a"
    ));
    assert_eq!(second.pointer_before, first.pointer_after);
    assert_eq!(second.pointer_after, first.pointer_after);
    assert_eq!(ws.pointers().history().unwrap().len(), 1);
}

#[test]
fn missing_and_corrupt_artifacts_are_skipped() {
    let ws = Workspace::new();
    let missing = CandidateModel::new("missing", ws.root.join("missing.json"));
    let corrupt_path = ws.root.join("corrupt.json");
    std::fs::write(&corrupt_path, "{").unwrap();
    let corrupt = CandidateModel::new("corrupt", corrupt_path);
    let good = ws.candidate("good", 85);

    let report = ws.governor(0.80).run(&[missing, corrupt, good.clone()], &held_out()).unwrap();

    assert!(matches!(report.evaluations[0].status, CandidateStatus::Skipped { .. }));
    assert!(matches!(report.evaluations[1].status, CandidateStatus::Skipped { .. }));
    assert_eq!(report.selected().unwrap().candidate, good);
    assert!(report.decision.is_promoted());
}

#[test]
fn no_candidates_keeps_the_existing_pointer() {
    let ws = Workspace::new();
    let pointers = ws.pointers();
    std::fs::write(pointers.pointer_path(), "old/model.json\n").unwrap();

    let missing = CandidateModel::new("missing", ws.root.join("missing.json"));
    let report = ws.governor(0.80).run(&[missing], &held_out()).unwrap();

    assert_eq!(report.decision, PromotionDecision::NoCandidates);
    assert_eq!(
        pointers.read().unwrap().unwrap().artifact,
        Path::new("old/model.json")
    );
    assert_eq!(report.pointer_after, report.pointer_before);
}

#[test]
fn held_out_without_risky_rows_scores_zero() {
    let ws = Workspace::new();
    let a = ws.candidate("a", 91);
    let mut safe_only = held_out();
    safe_only.examples.retain(|e| e.label == Label::Safe);

    let report = ws.governor(0.80).run(&[a], &safe_only).unwrap();
    assert_eq!(recall_of(&report, "a"), Some(0.0));
    assert!(matches!(report.decision, PromotionDecision::BelowThreshold { .. }));
}
