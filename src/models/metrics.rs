//! Classification metrics. RISKY (`1`) is the positive class.

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Counts of predicted versus true labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// RISKY predicted RISKY
    pub true_positive: usize,
    /// SAFE predicted RISKY
    pub false_positive: usize,
    /// SAFE predicted SAFE
    pub true_negative: usize,
    /// RISKY predicted SAFE
    pub false_negative: usize,
}

impl ConfusionMatrix {
    /// Tally aligned label arrays
    pub fn from_labels(truth: &Array1<u8>, predicted: &Array1<u8>) -> Self {
        let mut matrix = Self::default();
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            match (t == 1, p == 1) {
                (true, true) => matrix.true_positive += 1,
                (false, true) => matrix.false_positive += 1,
                (false, false) => matrix.true_negative += 1,
                (true, false) => matrix.false_negative += 1,
            }
        }
        matrix
    }

    /// Rows counted
    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// True RISKY rows
    pub fn positives(&self) -> usize {
        self.true_positive + self.false_negative
    }

    /// Recall of the RISKY class; 0.0 when there are no RISKY rows
    pub fn recall_risky(&self) -> f64 {
        ratio(self.true_positive, self.positives())
    }

    /// Fraction of rows predicted correctly
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// Per-class precision, recall and F1
    pub fn class_metrics(&self, risky: bool) -> ClassMetrics {
        let (hit, false_alarm, miss) = if risky {
            (self.true_positive, self.false_positive, self.false_negative)
        } else {
            (self.true_negative, self.false_negative, self.false_positive)
        };
        let precision = ratio(hit, hit + false_alarm);
        let recall = ratio(hit, hit + miss);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            precision,
            recall,
            f1,
            support: hit + miss,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Recall of the RISKY class for aligned label arrays.
pub fn recall_risky(truth: &Array1<u8>, predicted: &Array1<u8>) -> f64 {
    ConfusionMatrix::from_labels(truth, predicted).recall_risky()
}

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Precision
    pub precision: f64,
    /// Recall
    pub recall: f64,
    /// Harmonic mean of precision and recall
    pub f1: f64,
    /// True rows of the class
    pub support: usize,
}

/// Per-class metrics plus accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Underlying counts
    pub confusion: ConfusionMatrix,
    /// SAFE class
    pub safe: ClassMetrics,
    /// RISKY class
    pub risky: ClassMetrics,
    /// Overall accuracy
    pub accuracy: f64,
}

impl ClassificationReport {
    /// Report for aligned label arrays
    pub fn new(truth: &Array1<u8>, predicted: &Array1<u8>) -> Self {
        let confusion = ConfusionMatrix::from_labels(truth, predicted);
        Self {
            confusion,
            safe: confusion.class_metrics(false),
            risky: confusion.class_metrics(true),
            accuracy: confusion.accuracy(),
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        for (name, m) in [("SAFE (0)", &self.safe), ("RISKY (1)", &self.risky)] {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        write!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.confusion.total()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn confusion_counts() {
        let truth = array![1u8, 1, 1, 0, 0];
        let predicted = array![1u8, 0, 1, 1, 0];
        let matrix = ConfusionMatrix::from_labels(&truth, &predicted);
        assert_eq!(matrix.true_positive, 2);
        assert_eq!(matrix.false_negative, 1);
        assert_eq!(matrix.false_positive, 1);
        assert_eq!(matrix.true_negative, 1);
        assert_relative_eq!(matrix.recall_risky(), 2.0 / 3.0);
        assert_relative_eq!(matrix.accuracy(), 0.6);
    }

    #[test]
    fn recall_without_positives_is_zero() {
        assert_eq!(recall_risky(&array![0u8, 0], &array![0u8, 1]), 0.0);
    }

    #[test]
    fn per_class_metrics() {
        let report = ClassificationReport::new(&array![1u8, 1, 0, 0], &array![1u8, 0, 0, 0]);
        assert_relative_eq!(report.risky.precision, 1.0);
        assert_relative_eq!(report.risky.recall, 0.5);
        assert_relative_eq!(report.risky.f1, 2.0 / 3.0);
        assert_relative_eq!(report.safe.precision, 2.0 / 3.0);
        assert_relative_eq!(report.safe.recall, 1.0);
        assert_eq!(report.safe.support, 2);

        let text = report.to_string();
        assert!(text.contains("RISKY (1)"));
        assert!(text.contains("accuracy"));
    }
}
