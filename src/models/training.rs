//! Stratified split, fit, and validation report.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use super::classifier::{Classifier, ModelFamily, TrainedModel};
use super::metrics::ClassificationReport;
use super::store::ModelArtifact;
use crate::core::config::{ModelsConfig, SpecLensConfig, TrainingConfig};
use crate::core::errors::{Result, SpecLensError};
use crate::dataset::Dataset;

/// Split row indices into `(train, validation)`, holding out `fraction` of
/// each class.
///
/// A class with at least two rows contributes at least one validation row and
/// keeps at least one training row. Both index lists come back sorted.
pub fn stratified_split(labels: &[u8], fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();

    for class in [0u8, 1u8] {
        let mut rows: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        rows.shuffle(&mut rng);

        let held_out = if rows.len() < 2 {
            0
        } else {
            ((rows.len() as f64 * fraction).round() as usize).clamp(1, rows.len() - 1)
        };
        validation.extend_from_slice(&rows[..held_out]);
        train.extend_from_slice(&rows[held_out..]);
    }

    train.sort_unstable();
    validation.sort_unstable();
    (train, validation)
}

/// What one training run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Fitted model, ready to save
    pub artifact: ModelArtifact,
    /// Report on the validation rows, absent when nothing was held out
    pub report: Option<ClassificationReport>,
    /// Rows used for fitting
    pub train_rows: usize,
    /// Rows held out
    pub validation_rows: usize,
}

/// Fits one model family on a labeled dataset.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    models: ModelsConfig,
    training: TrainingConfig,
}

impl Trainer {
    /// Trainer with explicit hyperparameters
    pub fn new(models: ModelsConfig, training: TrainingConfig) -> Self {
        Self { models, training }
    }

    /// Trainer from the `models` and `training` sections
    pub fn from_config(config: &SpecLensConfig) -> Self {
        Self::new(config.models.clone(), config.training.clone())
    }

    /// Split, fit on the training rows, and score the validation rows.
    pub fn train(
        &self,
        dataset: &Dataset,
        family: ModelFamily,
        name: impl Into<String>,
    ) -> Result<TrainingOutcome> {
        if dataset.is_empty() {
            return Err(SpecLensError::dataset("cannot train on an empty dataset"));
        }
        if dataset.risky_count() == 0 || dataset.risky_count() == dataset.len() {
            warn!(
                rows = dataset.len(),
                risky = dataset.risky_count(),
                "Dataset holds a single class"
            );
        }

        let labels = dataset.labels().to_vec();
        let (train_idx, validation_idx) =
            stratified_split(&labels, self.training.validation_fraction, self.training.seed);

        let train_set = dataset.select(&train_idx);
        let mut model = TrainedModel::new(family, &self.models);
        model.fit(&train_set.features(&dataset.schema), &train_set.labels())?;

        let mut artifact = ModelArtifact::new(name, dataset.schema.clone(), model);
        let report = if validation_idx.is_empty() {
            None
        } else {
            let held_out = dataset.select(&validation_idx);
            let predicted = artifact.model.predict(&held_out.features(&dataset.schema));
            let report = ClassificationReport::new(&held_out.labels(), &predicted);
            artifact.validation_recall = Some(report.confusion.recall_risky());
            Some(report)
        };

        info!(
            model = %artifact.name,
            family = %family,
            train_rows = train_idx.len(),
            validation_rows = validation_idx.len(),
            recall = ?artifact.validation_recall,
            "Trained model"
        );

        Ok(TrainingOutcome {
            artifact,
            report,
            train_rows: train_idx.len(),
            validation_rows: validation_idx.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::featureset::{FeatureSchema, FeatureVector};
    use crate::dataset::LabeledExample;
    use crate::oracle::Label;

    fn dataset(rows: usize) -> Dataset {
        let schema = FeatureSchema::new(["n_ensures", "ensures_has_arith"]);
        let examples = (0..rows)
            .map(|i| {
                let risky = i % 2 == 0;
                let mut features = FeatureVector::new();
                features.insert("n_ensures", if risky { 2.0 } else { 1.0 });
                features.insert("ensures_has_arith", f64::from(u8::from(risky)));
                LabeledExample {
                    features,
                    label: if risky { Label::Risky } else { Label::Safe },
                    source_file: "m.py".to_string(),
                    name: format!("f{i}"),
                    class: None,
                }
            })
            .collect();
        Dataset { schema, examples }
    }

    #[test]
    fn split_is_stratified_and_disjoint() {
        let labels = [0u8, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        let (train, validation) = stratified_split(&labels, 0.3, 1);

        assert_eq!(train.len() + validation.len(), labels.len());
        assert!(train.iter().all(|i| !validation.contains(i)));
        let risky_held_out = validation.iter().filter(|&&i| labels[i] == 1).count();
        let safe_held_out = validation.len() - risky_held_out;
        assert_eq!(risky_held_out, 1);
        assert_eq!(safe_held_out, 2);
    }

    #[test]
    fn split_keeps_singletons_in_training() {
        let (train, validation) = stratified_split(&[0, 0, 0, 1], 0.5, 3);
        assert!(train.contains(&3));
        assert!(!validation.contains(&3));
    }

    #[test]
    fn split_is_seeded() {
        let labels = [0u8, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        assert_eq!(stratified_split(&labels, 0.3, 9), stratified_split(&labels, 0.3, 9));
    }

    #[test]
    fn trains_and_reports_recall() {
        let outcome = Trainer::default()
            .train(&dataset(20), ModelFamily::Tree, "tree")
            .unwrap();

        assert_eq!(outcome.train_rows + outcome.validation_rows, 20);
        assert_eq!(outcome.artifact.family, ModelFamily::Tree);
        assert_eq!(outcome.artifact.validation_recall, Some(1.0));
        let report = outcome.report.unwrap();
        assert_eq!(report.confusion.false_negative, 0);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let err = Trainer::default()
            .train(&Dataset::default(), ModelFamily::Logistic, "logistic")
            .unwrap_err();
        assert!(matches!(err, SpecLensError::Dataset { .. }));
    }
}
