//! Reference classifiers, metrics, training and model artifacts.
//!
//! The core treats a classifier as an opaque capability (`fit`, `predict`,
//! `predict_proba`). Two families ship with the crate: a standardised
//! logistic regression baseline and a depth-limited decision tree challenger.

pub mod classifier;
pub mod logistic;
pub mod metrics;
pub mod store;
pub mod training;
pub mod tree;

pub use classifier::{Classifier, ModelFamily, TrainedModel};
pub use logistic::LogisticRegression;
pub use metrics::{recall_risky, ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use store::{ArtifactStore, FsArtifactStore, ModelArtifact};
pub use training::{stratified_split, Trainer, TrainingOutcome};
pub use tree::{DecisionTree, TreeNode};
