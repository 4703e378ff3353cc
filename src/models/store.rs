//! Model artifacts and where they live.

use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::{Classifier, ModelFamily, TrainedModel};
use crate::core::errors::{Result, SpecLensError};
use crate::core::featureset::{FeatureSchema, FeatureVector};
use crate::core::file_utils::{atomic_write, FileReader};

/// A trained model together with the schema it was trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Candidate name (`logistic`, `tree`, ...)
    pub name: String,
    /// Model family
    pub family: ModelFamily,
    /// Feature columns in training order
    pub schema: FeatureSchema,
    /// Fitted model
    pub model: TrainedModel,
    /// RISKY recall on the validation split, if one was held out
    #[serde(default)]
    pub validation_recall: Option<f64>,
    /// When training finished
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Wrap a fitted model
    pub fn new(name: impl Into<String>, schema: FeatureSchema, model: TrainedModel) -> Self {
        Self {
            name: name.into(),
            family: model.family(),
            schema,
            model,
            validation_recall: None,
            trained_at: Utc::now(),
        }
    }

    /// RISKY probability per vector, after projecting each onto the trained schema
    pub fn risk_probabilities(&self, vectors: &[FeatureVector]) -> Vec<f64> {
        let mut matrix = Array2::zeros((vectors.len(), self.schema.len()));
        for (mut row, vector) in matrix.outer_iter_mut().zip(vectors) {
            let projected = self.schema.project(vector);
            for (cell, (_, value)) in row.iter_mut().zip(projected.iter()) {
                *cell = value;
            }
        }
        self.model.predict_proba(&matrix).column(1).to_vec()
    }
}

/// Write a named blob, read it back.
pub trait ArtifactStore: Send + Sync {
    /// Persist `artifact` at `path`, replacing any previous one atomically
    fn save(&self, path: &Path, artifact: &ModelArtifact) -> Result<()>;

    /// Artifact at `path`; `Ok(None)` when nothing is stored there
    fn load(&self, path: &Path) -> Result<Option<ModelArtifact>>;
}

/// JSON files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactStore;

impl ArtifactStore for FsArtifactStore {
    fn save(&self, path: &Path, artifact: &ModelArtifact) -> Result<()> {
        let json = serde_json::to_vec_pretty(artifact)?;
        atomic_write(path, &json)?;
        debug!(path = %path.display(), model = %artifact.name, "Saved model artifact");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Option<ModelArtifact>> {
        if !path.is_file() {
            return Ok(None);
        }
        let text = FileReader::read_to_string(path)?;
        serde_json::from_str(&text).map(Some).map_err(|e| {
            SpecLensError::model_artifact(
                format!("corrupt model artifact: {e}"),
                path.display().to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TreeConfig;
    use crate::models::tree::{DecisionTree, TreeNode};

    fn artifact() -> ModelArtifact {
        let tree = DecisionTree::from_root(
            TreeConfig::default(),
            TreeNode::Split {
                feature: 0,
                threshold: 1.5,
                left: Box::new(TreeNode::Leaf { risky: 0.1, samples: 3 }),
                right: Box::new(TreeNode::Leaf { risky: 0.9, samples: 3 }),
            },
        );
        ModelArtifact::new("tree", FeatureSchema::new(["n_ensures"]), TrainedModel::Tree(tree))
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("tree.json");
        let store = FsArtifactStore;
        store.save(&path, &artifact()).unwrap();

        let loaded = store.load(&path).unwrap().unwrap();
        assert_eq!(loaded.name, "tree");
        assert_eq!(loaded.family, ModelFamily::Tree);
        assert_eq!(loaded.schema.columns(), ["n_ensures"]);
    }

    #[test]
    fn missing_artifact_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsArtifactStore.load(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn corrupt_artifact_is_a_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FsArtifactStore.load(&path).unwrap_err();
        assert!(matches!(err, SpecLensError::Model { .. }));
    }

    #[test]
    fn probabilities_use_the_trained_schema() {
        let mut low = FeatureVector::new();
        low.insert("n_ensures", 1.0);
        low.insert("unknown_column", 50.0);
        let high: FeatureVector = [("n_ensures".to_string(), 3.0)].into_iter().collect();
        let empty = FeatureVector::new();

        let probabilities = artifact().risk_probabilities(&[low, high, empty]);
        assert_eq!(probabilities, vec![0.1, 0.9, 0.1]);
    }
}
