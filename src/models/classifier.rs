//! Classifier capability and the closed set of trained model families.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::logistic::LogisticRegression;
use super::tree::DecisionTree;
use crate::core::config::ModelsConfig;
use crate::core::errors::{Result, SpecLensError};

/// Binary classifier over feature matrices. Labels are `0` (SAFE) and
/// `1` (RISKY).
pub trait Classifier: Send + Sync {
    /// Train on `features` (rows are examples) and `labels`
    fn fit(&mut self, features: &Array2<f64>, labels: &Array1<u8>) -> Result<()>;

    /// Per-row probabilities, columns `[SAFE, RISKY]`
    fn predict_proba(&self, features: &Array2<f64>) -> Array2<f64>;

    /// Per-row label at the 0.5 cut
    fn predict(&self, features: &Array2<f64>) -> Array1<u8> {
        self.predict_proba(features)
            .index_axis(Axis(1), 1)
            .mapv(|p| u8::from(p >= 0.5))
    }
}

/// Model families the crate can train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Standardised logistic regression
    Logistic,
    /// CART decision tree
    Tree,
}

impl ModelFamily {
    /// Lowercase identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logistic => "logistic",
            Self::Tree => "tree",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = SpecLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "logistic" => Ok(Self::Logistic),
            "tree" => Ok(Self::Tree),
            other => Err(SpecLensError::validation_field(
                format!("unknown model family '{other}' (expected logistic or tree)"),
                "model",
            )),
        }
    }
}

/// A fitted (or fittable) model of any family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum TrainedModel {
    /// Logistic regression
    Logistic(LogisticRegression),
    /// Decision tree
    Tree(DecisionTree),
}

impl TrainedModel {
    /// Untrained model of `family` with configured hyperparameters
    pub fn new(family: ModelFamily, config: &ModelsConfig) -> Self {
        match family {
            ModelFamily::Logistic => Self::Logistic(LogisticRegression::new(config.logistic.clone())),
            ModelFamily::Tree => Self::Tree(DecisionTree::new(config.tree.clone())),
        }
    }

    /// Family of the wrapped model
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::Logistic(_) => ModelFamily::Logistic,
            Self::Tree(_) => ModelFamily::Tree,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::Logistic(model) => model,
            Self::Tree(model) => model,
        }
    }
}

impl Classifier for TrainedModel {
    fn fit(&mut self, features: &Array2<f64>, labels: &Array1<u8>) -> Result<()> {
        match self {
            Self::Logistic(model) => model.fit(features, labels),
            Self::Tree(model) => model.fit(features, labels),
        }
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Array2<f64> {
        self.inner().predict_proba(features)
    }
}

/// Check that `features` and `labels` describe the same non-empty set of rows.
pub(crate) fn check_training_data(features: &Array2<f64>, labels: &Array1<u8>) -> Result<()> {
    if features.nrows() == 0 {
        return Err(SpecLensError::model("cannot fit on an empty dataset"));
    }
    if features.nrows() != labels.len() {
        return Err(SpecLensError::model(format!(
            "{} feature rows but {} labels",
            features.nrows(),
            labels.len()
        )));
    }
    if let Some(bad) = labels.iter().find(|&&label| label > 1) {
        return Err(SpecLensError::model(format!("label {bad} is not 0 or 1")));
    }
    Ok(())
}

/// Two-column probability matrix from RISKY probabilities.
pub(crate) fn proba_columns(risky: impl IntoIterator<Item = f64>) -> Array2<f64> {
    let risky: Vec<f64> = risky.into_iter().collect();
    let mut out = Array2::zeros((risky.len(), 2));
    for (mut row, p) in out.outer_iter_mut().zip(risky) {
        row[0] = 1.0 - p;
        row[1] = p;
    }
    out
}
