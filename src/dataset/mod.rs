//! Labeled dataset construction and its tabular artifact.

pub mod builder;
pub mod table;

pub use builder::{BuildSummary, DatasetBuilder, LabeledUnit, SkippedFile};
pub use table::{Dataset, LabeledExample, IDENTITY_COLUMNS};
