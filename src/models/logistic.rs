//! Logistic regression trained by batch gradient descent.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::{check_training_data, proba_columns, Classifier};
use crate::core::config::LogisticConfig;
use crate::core::errors::Result;

/// Binary logistic regression over standardised features with an L2 penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LogisticConfig,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    /// Unfitted model
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            means: Vec::new(),
            scales: Vec::new(),
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    /// Learned weights in the standardised space
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Learned intercept
    pub fn bias(&self) -> f64 {
        self.bias
    }

    fn standardize(&self, features: &Array2<f64>) -> Array2<f64> {
        let mut out = features.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let mean = self.means.get(j).copied().unwrap_or(0.0);
            let scale = self.scales.get(j).copied().unwrap_or(1.0);
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, features: &Array2<f64>, labels: &Array1<u8>) -> Result<()> {
        check_training_data(features, labels)?;
        let n = features.nrows() as f64;

        self.means = features
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        self.scales = features
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > f64::EPSILON { s } else { 1.0 })
            .collect();

        let x = self.standardize(features);
        let y = labels.mapv(f64::from);
        let mut w = Array1::<f64>::zeros(features.ncols());
        let mut b = 0.0;
        let rate = self.config.learning_rate;

        for _ in 0..self.config.max_iter {
            let p = (x.dot(&w) + b).mapv(sigmoid);
            let error = &p - &y;
            let grad_w = x.t().dot(&error) / n + &w * self.config.l2;
            let grad_b = error.sum() / n;
            w = w - grad_w * rate;
            b -= grad_b * rate;
        }

        self.weights = w.to_vec();
        self.bias = b;
        debug!(
            rows = features.nrows(),
            columns = features.ncols(),
            bias = self.bias,
            "Fitted logistic regression"
        );
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Array2<f64> {
        let x = self.standardize(features);
        proba_columns(x.outer_iter().map(|row| {
            let z = row
                .iter()
                .zip(&self.weights)
                .map(|(v, w)| v * w)
                .sum::<f64>()
                + self.bias;
            sigmoid(z)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn separates_a_linear_boundary() {
        let x = array![[0.0, 1.0], [1.0, 1.0], [2.0, 0.0], [8.0, 0.0], [9.0, 1.0], [10.0, 0.0]];
        let y = array![0u8, 0, 0, 1, 1, 1];
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x), y);
        let proba = model.predict_proba(&array![[9.5, 0.5]]);
        assert!(proba[[0, 1]] > 0.8);
        assert_relative_eq!(proba[[0, 0]] + proba[[0, 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_columns_do_not_produce_nan() {
        let x = array![[1.0, 3.0], [1.0, 4.0], [1.0, 5.0]];
        let y = array![0u8, 1, 1];
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&x, &y).unwrap();
        assert!(model.predict_proba(&x).iter().all(|p| p.is_finite()));
    }

    #[test]
    fn unfitted_model_is_undecided() {
        let model = LogisticRegression::new(LogisticConfig::default());
        let proba = model.predict_proba(&array![[1.0, 2.0]]);
        assert_relative_eq!(proba[[0, 1]], 0.5);
    }

    #[test]
    fn rejects_mismatched_rows() {
        let mut model = LogisticRegression::new(LogisticConfig::default());
        assert!(model.fit(&array![[1.0], [2.0]], &array![1u8]).is_err());
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_relative_eq!(sigmoid(1000.0), 1.0);
        assert_relative_eq!(sigmoid(-1000.0), 0.0);
        assert_relative_eq!(sigmoid(0.0), 0.5);
    }
}
