//! Configuration types and management for speclens.
//!
//! Every knob the core consumes is a scalar with a serde default, so a
//! partial YAML file (or none at all) yields a usable configuration.

pub mod validation;

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SpecLensError};
use crate::oracle::generator::TypeHint;

pub use validation::{
    validate_non_negative, validate_open_unit_range, validate_ordered_range,
    validate_positive_f64, validate_positive_u64, validate_positive_usize, validate_unit_range,
};

/// Main configuration for the speclens pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecLensConfig {
    /// Verification oracle settings
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Dataset generation settings
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Champion/challenger promotion policy
    #[serde(default)]
    pub governance: GovernanceConfig,

    /// Cut points used by the serving report
    #[serde(default)]
    pub risk_thresholds: RiskThresholds,

    /// Candidate classifier hyperparameters
    #[serde(default)]
    pub models: ModelsConfig,

    /// Training split settings
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Configuration construction and I/O methods for [`SpecLensConfig`].
impl SpecLensConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SpecLensError::io(format!("Failed to read config file: {}", path.display()), e)
        })?;

        serde_yaml::from_str(&content).map_err(Into::into)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|e| {
            SpecLensError::io(format!("Failed to write config file: {}", path.display()), e)
        })
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.oracle.validate()?;
        self.dataset.validate()?;
        self.governance.validate()?;
        self.risk_thresholds.validate()?;
        self.models.validate()?;
        self.training.validate()?;
        Ok(())
    }
}

/// What the oracle reports for a unit it cannot instantiate or execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Label SAFE (historical default; hides units the oracle never ran)
    #[default]
    AssumeSafe,
    /// Label RISKY
    AssumeRisky,
}

/// Verification oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Trial budget per unit
    #[serde(default = "OracleConfig::default_trials")]
    pub trials: usize,

    /// Seed for argument generation; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,

    /// Inclusive range for the integer family
    #[serde(default = "OracleConfig::default_int_range")]
    pub int_range: [i64; 2],

    /// Inclusive range for the float family
    #[serde(default = "OracleConfig::default_float_range")]
    pub float_range: [f64; 2],

    /// Longest sequence/mapping the generator produces
    #[serde(default = "OracleConfig::default_max_sequence_len")]
    pub max_sequence_len: usize,

    /// Argument passed to every constructor parameter when instantiating a class
    #[serde(default = "OracleConfig::default_constructor_arg")]
    pub constructor_arg: i64,

    /// Interpreted statements allowed per invocation
    #[serde(default = "OracleConfig::default_step_budget")]
    pub step_budget: u64,

    /// Maximum nested call depth before `RecursionError`
    #[serde(default = "OracleConfig::default_max_call_depth")]
    pub max_call_depth: usize,

    /// Label used when a unit cannot be resolved or executed
    #[serde(default)]
    pub unresolved_policy: UnresolvedPolicy,

    /// Also check enclosing-class invariants after each method call
    #[serde(default)]
    pub check_invariants: bool,

    /// Extra parameter-name rules consulted before the built-in table
    #[serde(default)]
    pub name_hints: IndexMap<String, TypeHint>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            trials: Self::default_trials(),
            seed: None,
            int_range: Self::default_int_range(),
            float_range: Self::default_float_range(),
            max_sequence_len: Self::default_max_sequence_len(),
            constructor_arg: Self::default_constructor_arg(),
            step_budget: Self::default_step_budget(),
            max_call_depth: Self::default_max_call_depth(),
            unresolved_policy: UnresolvedPolicy::default(),
            check_invariants: false,
            name_hints: IndexMap::new(),
        }
    }
}

impl OracleConfig {
    const fn default_trials() -> usize {
        20
    }

    const fn default_int_range() -> [i64; 2] {
        [-5, 5]
    }

    const fn default_float_range() -> [f64; 2] {
        [-5.0, 5.0]
    }

    const fn default_max_sequence_len() -> usize {
        4
    }

    const fn default_constructor_arg() -> i64 {
        10
    }

    const fn default_step_budget() -> u64 {
        100_000
    }

    const fn default_max_call_depth() -> usize {
        64
    }

    /// Validate oracle settings
    pub fn validate(&self) -> Result<()> {
        validate_positive_usize(self.trials, "oracle.trials")?;
        validate_ordered_range(&self.int_range, "oracle.int_range")?;
        if !self.float_range.iter().all(|v| v.is_finite()) {
            return Err(SpecLensError::validation_field(
                "oracle.float_range must be finite",
                "oracle.float_range",
            ));
        }
        validate_ordered_range(&self.float_range, "oracle.float_range")?;
        validate_positive_usize(self.max_sequence_len, "oracle.max_sequence_len")?;
        validate_positive_u64(self.step_budget, "oracle.step_budget")?;
        validate_positive_usize(self.max_call_depth, "oracle.max_call_depth")?;
        Ok(())
    }
}

/// Dataset generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// File extensions (without dot) treated as annotated sources
    #[serde(default = "DatasetConfig::default_extensions")]
    pub extensions: Vec<String>,

    /// Skip `__dunder__` units
    #[serde(default = "DatasetConfig::default_skip_dunder")]
    pub skip_dunder: bool,

    /// Process files on the rayon pool
    #[serde(default = "DatasetConfig::default_parallel")]
    pub parallel: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            extensions: Self::default_extensions(),
            skip_dunder: Self::default_skip_dunder(),
            parallel: Self::default_parallel(),
        }
    }
}

impl DatasetConfig {
    fn default_extensions() -> Vec<String> {
        vec!["py".to_string()]
    }

    const fn default_skip_dunder() -> bool {
        true
    }

    const fn default_parallel() -> bool {
        true
    }

    /// Validate dataset settings
    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(SpecLensError::validation_field(
                "dataset.extensions must list at least one extension",
                "dataset.extensions",
            ));
        }
        if let Some(bad) = self.extensions.iter().find(|ext| ext.starts_with('.')) {
            return Err(SpecLensError::validation_field(
                format!("dataset.extensions entries are written without a dot: '{bad}'"),
                "dataset.extensions",
            ));
        }
        Ok(())
    }
}

/// A registered candidate for promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEntry {
    /// Candidate name (e.g. "logistic")
    pub name: String,
    /// Artifact path
    pub path: PathBuf,
}

/// Promotion governance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Minimum RISKY-class recall a candidate needs to be promoted
    #[serde(default = "GovernanceConfig::default_min_recall")]
    pub min_recall: f64,

    /// Candidates in registration order (ties keep the earlier one)
    #[serde(default = "GovernanceConfig::default_candidates")]
    pub candidates: Vec<CandidateEntry>,

    /// File holding the active-model pointer
    #[serde(default = "GovernanceConfig::default_pointer_path")]
    pub pointer_path: PathBuf,

    /// Append-only promotion history (JSON lines)
    #[serde(default = "GovernanceConfig::default_history_path")]
    pub history_path: PathBuf,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            min_recall: Self::default_min_recall(),
            candidates: Self::default_candidates(),
            pointer_path: Self::default_pointer_path(),
            history_path: Self::default_history_path(),
        }
    }
}

impl GovernanceConfig {
    const fn default_min_recall() -> f64 {
        0.8
    }

    fn default_candidates() -> Vec<CandidateEntry> {
        vec![
            CandidateEntry {
                name: "logistic".to_string(),
                path: PathBuf::from("models/logistic.json"),
            },
            CandidateEntry {
                name: "tree".to_string(),
                path: PathBuf::from("models/tree.json"),
            },
        ]
    }

    fn default_pointer_path() -> PathBuf {
        PathBuf::from("models/active_model.txt")
    }

    fn default_history_path() -> PathBuf {
        PathBuf::from("models/promotions.jsonl")
    }

    /// Validate governance settings
    pub fn validate(&self) -> Result<()> {
        validate_unit_range(self.min_recall, "governance.min_recall")?;
        if self.candidates.is_empty() {
            return Err(SpecLensError::validation_field(
                "governance.candidates must register at least one candidate",
                "governance.candidates",
            ));
        }
        let mut seen = HashSet::new();
        for candidate in &self.candidates {
            if candidate.name.trim().is_empty() {
                return Err(SpecLensError::validation_field(
                    "candidate names must not be empty",
                    "governance.candidates",
                ));
            }
            if !seen.insert(candidate.name.as_str()) {
                return Err(SpecLensError::validation_field(
                    format!("duplicate candidate name '{}'", candidate.name),
                    "governance.candidates",
                ));
            }
        }
        Ok(())
    }
}

/// Probability cut points for LOW / MEDIUM / HIGH
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Scores below this are LOW
    #[serde(default = "RiskThresholds::default_low")]
    pub low: f64,
    /// Scores below this (and at least `low`) are MEDIUM
    #[serde(default = "RiskThresholds::default_medium")]
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: Self::default_low(),
            medium: Self::default_medium(),
        }
    }
}

impl RiskThresholds {
    const fn default_low() -> f64 {
        0.3
    }

    const fn default_medium() -> f64 {
        0.7
    }

    /// Validate the cut points
    pub fn validate(&self) -> Result<()> {
        validate_unit_range(self.low, "risk_thresholds.low")?;
        validate_unit_range(self.medium, "risk_thresholds.medium")?;
        if self.low > self.medium {
            return Err(SpecLensError::validation_field(
                "risk_thresholds.low must not exceed risk_thresholds.medium",
                "risk_thresholds",
            ));
        }
        Ok(())
    }
}

/// Hyperparameters for the reference classifiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Logistic regression (baseline)
    #[serde(default)]
    pub logistic: LogisticConfig,
    /// Decision tree (challenger)
    #[serde(default)]
    pub tree: TreeConfig,
}

impl ModelsConfig {
    /// Validate model hyperparameters
    pub fn validate(&self) -> Result<()> {
        validate_positive_usize(self.logistic.max_iter, "models.logistic.max_iter")?;
        validate_positive_f64(self.logistic.learning_rate, "models.logistic.learning_rate")?;
        validate_non_negative(self.logistic.l2, "models.logistic.l2")?;
        validate_positive_usize(self.tree.max_depth, "models.tree.max_depth")?;
        if self.tree.min_samples_split < 2 {
            return Err(SpecLensError::validation_field(
                "models.tree.min_samples_split must be at least 2",
                "models.tree.min_samples_split",
            ));
        }
        Ok(())
    }
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Gradient descent iterations
    #[serde(default = "LogisticConfig::default_max_iter")]
    pub max_iter: usize,
    /// Step size
    #[serde(default = "LogisticConfig::default_learning_rate")]
    pub learning_rate: f64,
    /// L2 penalty strength
    #[serde(default = "LogisticConfig::default_l2")]
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            max_iter: Self::default_max_iter(),
            learning_rate: Self::default_learning_rate(),
            l2: Self::default_l2(),
        }
    }
}

impl LogisticConfig {
    const fn default_max_iter() -> usize {
        1000
    }

    const fn default_learning_rate() -> f64 {
        0.1
    }

    const fn default_l2() -> f64 {
        0.01
    }
}

/// Decision tree hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth (root has depth 0)
    #[serde(default = "TreeConfig::default_max_depth")]
    pub max_depth: usize,
    /// Minimum samples required to split a node
    #[serde(default = "TreeConfig::default_min_samples_split")]
    pub min_samples_split: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            min_samples_split: Self::default_min_samples_split(),
        }
    }
}

impl TreeConfig {
    const fn default_max_depth() -> usize {
        5
    }

    const fn default_min_samples_split() -> usize {
        2
    }
}

/// Train/validation split configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of each class held out for validation
    #[serde(default = "TrainingConfig::default_validation_fraction")]
    pub validation_fraction: f64,
    /// Shuffle seed for the split
    #[serde(default = "TrainingConfig::default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_fraction: Self::default_validation_fraction(),
            seed: Self::default_seed(),
        }
    }
}

impl TrainingConfig {
    const fn default_validation_fraction() -> f64 {
        0.3
    }

    const fn default_seed() -> u64 {
        42
    }

    /// Validate training settings
    pub fn validate(&self) -> Result<()> {
        validate_open_unit_range(self.validation_fraction, "training.validation_fraction")
    }
}

#[cfg(test)]
mod tests;
