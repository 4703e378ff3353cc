//! Serving-time scoring with the active model.

pub mod report;

pub use report::{Predictor, RiskEntry, RiskLevel, ServingReport};
