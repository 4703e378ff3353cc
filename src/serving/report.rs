//! Serving-time risk report for a single source file.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::RiskThresholds;
use crate::core::errors::{Result, SpecLensError};
use crate::core::featureset::{ContractFeatureExtractor, FeatureExtractor, FeatureVector};
use crate::governance::PointerStore;
use crate::lang::{AnalyzableUnit, ContractParser, PythonSource};
use crate::models::{ArtifactStore, ModelArtifact};

/// Bucketed risk probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Below `low`
    Low,
    /// Below `medium`
    Medium,
    /// Everything else
    High,
}

impl RiskLevel {
    /// Bucket `probability` with `< low → Low`, `< medium → Medium`, else `High`
    pub fn from_probability(probability: f64, thresholds: &RiskThresholds) -> Self {
        if probability < thresholds.low {
            Self::Low
        } else if probability < thresholds.medium {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Uppercase label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEntry {
    /// Unit name
    pub name: String,
    /// Enclosing class, if a method
    pub class: Option<String>,
    /// Definition line (1-based)
    pub line: usize,
    /// `requires` clauses
    pub requires: Vec<String>,
    /// `ensures` clauses
    pub ensures: Vec<String>,
    /// Class invariants in force
    pub invariants: Vec<String>,
    /// Probability of RISKY
    pub probability: f64,
    /// Bucketed probability
    pub level: RiskLevel,
}

/// Per-unit risk for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingReport {
    /// File analysed
    pub file: String,
    /// Name of the model that scored it
    pub model: String,
    /// Units in source order
    pub entries: Vec<RiskEntry>,
}

impl ServingReport {
    /// Entries at `level`
    pub fn count(&self, level: RiskLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }
}

/// Scores source files with a trained artifact.
pub struct Predictor {
    artifact: ModelArtifact,
    thresholds: RiskThresholds,
    extractor: ContractFeatureExtractor,
}

impl Predictor {
    /// Predictor over an already-loaded artifact
    pub fn new(artifact: ModelArtifact, thresholds: RiskThresholds) -> Self {
        Self {
            artifact,
            thresholds,
            extractor: ContractFeatureExtractor::new(),
        }
    }

    /// Resolve the active pointer now and load the artifact it names.
    pub fn from_pointer(
        pointers: &PointerStore,
        store: &dyn ArtifactStore,
        thresholds: RiskThresholds,
    ) -> Result<Self> {
        let pointer = pointers.read()?.ok_or_else(|| {
            SpecLensError::model_artifact(
                "no active model; promote a candidate first",
                pointers.pointer_path().display().to_string(),
            )
        })?;
        let artifact = store.load(&pointer.artifact)?.ok_or_else(|| {
            SpecLensError::model_artifact(
                "active model artifact is missing",
                pointer.artifact.display().to_string(),
            )
        })?;
        info!(
            model = %artifact.name,
            artifact = %pointer.artifact.display(),
            version = pointer.version,
            "Resolved active model"
        );
        Ok(Self::new(artifact, thresholds))
    }

    /// Artifact in use
    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Parse and score a file. Parse failures are returned, not skipped.
    pub fn analyze_file(&self, path: &Path) -> Result<ServingReport> {
        let mut parser = ContractParser::new()?;
        let source = parser.parse_file(path)?;
        Ok(self.score_units(&source, parser.units(&source)))
    }

    /// Score an already-parsed source
    pub fn analyze_source(&self, source: &PythonSource) -> Result<ServingReport> {
        let units = ContractParser::new()?.units(source);
        Ok(self.score_units(source, units))
    }

    fn score_units(&self, source: &PythonSource, units: Vec<AnalyzableUnit>) -> ServingReport {
        let vectors: Vec<FeatureVector> = units.iter().map(|u| self.extractor.extract(u)).collect();
        let probabilities = self.artifact.risk_probabilities(&vectors);

        let entries: Vec<RiskEntry> = units
            .into_iter()
            .zip(probabilities)
            .map(|(unit, probability)| self.entry(unit, probability))
            .collect();
        debug!(file = source.path(), units = entries.len(), "Scored file");

        ServingReport {
            file: source.path().to_string(),
            model: self.artifact.name.clone(),
            entries,
        }
    }

    fn entry(&self, unit: AnalyzableUnit, probability: f64) -> RiskEntry {
        RiskEntry {
            level: RiskLevel::from_probability(probability, &self.thresholds),
            line: unit.source_line,
            name: unit.name,
            class: unit.enclosing_type,
            requires: unit.requires,
            ensures: unit.ensures,
            invariants: unit.invariants,
            probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TreeConfig;
    use crate::core::featureset::FeatureSchema;
    use crate::models::{DecisionTree, FsArtifactStore, TrainedModel, TreeNode};

    const SOURCE: &str = "\
# @ensures result == x + 1
def inc(x):
    return x + 1

# @requires b != 0
# @ensures result * b == a
# @ensures result <= a
def div(a, b):
    return a // b

# @invariant self.n >= 0
class Counter:
    def __init__(self):
        self.n = 0
";

    /// RISKY probability 0.1, 0.5 or 0.9 by number of ensures clauses.
    fn artifact() -> ModelArtifact {
        let tree = DecisionTree::from_root(
            TreeConfig::default(),
            TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                left: Box::new(TreeNode::Leaf { risky: 0.1, samples: 1 }),
                right: Box::new(TreeNode::Split {
                    feature: 0,
                    threshold: 1.5,
                    left: Box::new(TreeNode::Leaf { risky: 0.5, samples: 1 }),
                    right: Box::new(TreeNode::Leaf { risky: 0.9, samples: 1 }),
                }),
            },
        );
        ModelArtifact::new("tree", FeatureSchema::new(["n_ensures"]), TrainedModel::Tree(tree))
    }

    #[test]
    fn risk_levels_follow_the_cut_points() {
        let thresholds = RiskThresholds::default();
        assert_eq!(RiskLevel::from_probability(0.0, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.3, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.69, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.7, &thresholds), RiskLevel::High);
    }

    #[test]
    fn report_lists_every_unit_with_its_bucket() {
        let source = ContractParser::new()
            .unwrap()
            .parse_source(SOURCE, "calc.py")
            .unwrap();
        let report = Predictor::new(artifact(), RiskThresholds::default())
            .analyze_source(&source)
            .unwrap();

        assert_eq!(report.model, "tree");
        let names: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["inc", "div", "__init__"]);

        assert_eq!(report.entries[0].level, RiskLevel::Medium);
        assert_eq!(report.entries[1].level, RiskLevel::High);
        assert_eq!(report.entries[1].requires, ["b != 0"]);
        assert_eq!(report.entries[1].line, 8);
        assert_eq!(report.entries[2].class.as_deref(), Some("Counter"));
        assert_eq!(report.entries[2].invariants, ["self.n >= 0"]);
        assert_eq!(report.entries[2].level, RiskLevel::Low);
        assert_eq!(report.count(RiskLevel::High), 1);
    }

    #[test]
    fn predictor_resolves_the_pointer_at_call_time() {
        let dir = tempfile::tempdir().unwrap();
        let pointers = PointerStore::new(dir.path().join("active.txt"), dir.path().join("log.jsonl"));

        let missing = Predictor::from_pointer(&pointers, &FsArtifactStore, RiskThresholds::default());
        assert!(missing.is_err());

        let path = dir.path().join("tree.json");
        FsArtifactStore.save(&path, &artifact()).unwrap();
        pointers.promote("tree", &path, 0.9, 0.8).unwrap();

        let predictor =
            Predictor::from_pointer(&pointers, &FsArtifactStore, RiskThresholds::default()).unwrap();
        assert_eq!(predictor.artifact().name, "tree");
    }

    #[test]
    fn analyze_file_fails_fast_on_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.py");
        std::fs::write(&path, "def broken(:\n    pass\n").unwrap();

        let predictor = Predictor::new(artifact(), RiskThresholds::default());
        assert!(predictor.analyze_file(&path).is_err());
    }
}
