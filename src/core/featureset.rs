//! Feature extraction framework and data structures.
//!
//! A single [`FeatureSchema`] is shared by dataset generation and serving.
//! Vectors are produced in schema order and projected onto a trained schema
//! before being handed to a classifier, so a column missing at serving time
//! becomes an explicit zero and an unknown column is dropped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::lang::common::AnalyzableUnit;

#[cfg(test)]
#[path = "featureset_tests.rs"]
mod tests;

/// Definition of one feature column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureDefinition {
    /// Column name
    pub name: String,

    /// Human-readable description of what this feature measures
    pub description: String,

    /// Value used when a vector lacks this column
    pub default_value: f64,
}

impl FeatureDefinition {
    /// Create a new feature definition with a zero default
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default_value: 0.0,
        }
    }
}

/// Ordered set of feature column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Schema from column names in order
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// The contract feature schema
    pub fn contract() -> Self {
        Self::new(CONTRACT_FEATURES.iter().map(|(name, _)| *name))
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Re-key `vector` onto this schema: absent columns become 0.0, extra
    /// columns are dropped.
    pub fn project(&self, vector: &FeatureVector) -> FeatureVector {
        let values = self
            .columns
            .iter()
            .map(|column| (column.clone(), vector.get(column).unwrap_or(0.0)))
            .collect();
        FeatureVector { values }
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::contract()
    }
}

/// Feature name to value, in insertion (schema) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: IndexMap<String, f64>,
}

impl FeatureVector {
    /// Create an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a feature value
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Value of a feature
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Feature names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no feature is set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Dense row in `schema` order (missing columns are zero)
    pub fn to_row(&self, schema: &FeatureSchema) -> Vec<f64> {
        schema
            .columns()
            .iter()
            .map(|column| self.get(column).unwrap_or(0.0))
            .collect()
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Something that turns a unit into a feature vector.
pub trait FeatureExtractor: Send + Sync {
    /// Definitions of the features this extractor produces, in order
    fn features(&self) -> Vec<FeatureDefinition>;

    /// Extract features from a unit
    fn extract(&self, unit: &AnalyzableUnit) -> FeatureVector;

    /// Schema implied by [`Self::features`]
    fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.features().into_iter().map(|f| f.name))
    }
}

const CONTRACT_FEATURES: &[(&str, &str)] = &[
    ("n_params", "Parameters, excluding the implicit receiver"),
    ("n_requires", "Number of @requires clauses"),
    ("n_ensures", "Number of @ensures clauses"),
    ("n_invariants", "Invariants inherited from the enclosing class"),
    ("n_loc", "Lines spanned by the body"),
    ("has_self", "First parameter is self"),
    ("has_other", "A parameter is named other"),
    ("requires_complexity", "Total characters across @requires clauses"),
    ("ensures_complexity", "Total characters across @ensures clauses"),
    ("ensures_has_arith", "An @ensures clause contains an arithmetic operator"),
    ("ensures_has_cmp", "An @ensures clause contains a comparison operator"),
];

const ARITH_OPERATORS: &[&str] = &["+", "-", "*", "/", "//"];
const CMP_OPERATORS: &[&str] = &[">", "<", "=="];

/// Structural and contract metadata features. Deterministic: no I/O, no
/// randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContractFeatureExtractor;

impl ContractFeatureExtractor {
    /// Create the extractor
    pub fn new() -> Self {
        Self
    }
}

impl FeatureExtractor for ContractFeatureExtractor {
    fn features(&self) -> Vec<FeatureDefinition> {
        CONTRACT_FEATURES
            .iter()
            .map(|(name, description)| FeatureDefinition::new(*name, *description))
            .collect()
    }

    fn extract(&self, unit: &AnalyzableUnit) -> FeatureVector {
        let leading_receiver = unit.parameters.first().is_some_and(|p| p.is_receiver());
        let n_params = unit.parameters.len() - usize::from(leading_receiver);
        let has_self = unit.parameters.first().is_some_and(|p| p.name == "self");
        let has_other = unit.parameter_names().any(|name| name == "other");

        let complexity = |clauses: &[String]| -> f64 {
            clauses.iter().map(|c| c.chars().count()).sum::<usize>() as f64
        };
        let ensures_has = |ops: &[&str]| {
            unit.ensures
                .iter()
                .any(|clause| ops.iter().any(|op| clause.contains(op)))
        };

        let mut vector = FeatureVector::new();
        vector.insert("n_params", n_params as f64);
        vector.insert("n_requires", unit.requires.len() as f64);
        vector.insert("n_ensures", unit.ensures.len() as f64);
        vector.insert("n_invariants", unit.invariants.len() as f64);
        vector.insert("n_loc", unit.size_in_lines as f64);
        vector.insert("has_self", bool_feature(has_self));
        vector.insert("has_other", bool_feature(has_other));
        vector.insert("requires_complexity", complexity(&unit.requires));
        vector.insert("ensures_complexity", complexity(&unit.ensures));
        vector.insert("ensures_has_arith", bool_feature(ensures_has(ARITH_OPERATORS)));
        vector.insert("ensures_has_cmp", bool_feature(ensures_has(CMP_OPERATORS)));
        vector
    }
}

fn bool_feature(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
