//! # SpecLens: contract-driven risk labeling for Python code
//!
//! SpecLens reads lightweight PML contracts written as comments on Python
//! functions and methods, and turns them into a supervised-learning pipeline:
//!
//! - **Contract parsing**: tree-sitter recovers each function/method together
//!   with its `@requires`, `@ensures` and inherited `@invariant` clauses
//! - **Verification oracle**: an embedded interpreter loads the module and
//!   fuzzes every unit with generated arguments, labeling it SAFE or RISKY
//! - **Feature extraction**: a fixed schema of structural contract metrics
//! - **Dataset building**: one labeled row per unit across a source directory
//! - **Governance**: candidate classifiers are scored on held-out RISKY recall
//!   and at most one is promoted behind an atomically replaced pointer
//! - **Serving**: per-unit risk probability with LOW/MEDIUM/HIGH buckets
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ lang         │──▶│ oracle       │──▶│ dataset      │
//! │ • parser     │   │ • generator  │   │ • builder    │
//! │ • symbols    │   │ • labeler    │   │ • table      │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │           ┌──────┴───────┐          │
//!        │           │ runtime      │   ┌──────┴───────┐   ┌──────────────┐
//!        │           │ • interpreter│   │ models       │──▶│ governance   │
//!        │           │ • loader     │   │ • train      │   │ • governor   │
//!        │           └──────────────┘   └──────────────┘   │ • pointer    │
//!        │                                                  └──────┬───────┘
//!        └────────────────────────────▶ serving ◀──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use speclens::{DatasetBuilder, SpecLensConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SpecLensConfig::default();
//!     let (dataset, summary) = DatasetBuilder::from_config(&config).build("./src".as_ref())?;
//!
//!     println!("{} units labeled, {} RISKY", summary.units_labeled, summary.risky);
//!     dataset.write_csv("dataset.csv".as_ref())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Shared infrastructure
pub mod core {
    //! Errors, configuration, features and file helpers.

    pub mod config;
    pub mod errors;
    pub mod featureset;
    pub mod file_utils;
}

// Source front end
pub mod lang {
    //! Python parsing and contract extraction.

    pub mod common;
    pub mod contracts;
    pub mod python;
    pub mod symbols;

    pub use common::{AnalyzableUnit, ClauseKind, ContractClauses, Parameter, SourceLocation};
    pub use python::{ContractParser, PythonSource};
}

// Embedded evaluator for units under test
pub mod runtime;

// Argument generation and labeling
pub mod oracle;

// Labeled dataset construction
pub mod dataset;

// Classifiers, training and artifacts
pub mod models;

// Active-model pointer and promotion
pub mod governance;

// Serving-time risk report
pub mod serving;

// Re-export primary types for convenience
pub use crate::core::config::SpecLensConfig;
pub use crate::core::errors::{Result, ResultExt, SpecLensError};
pub use crate::core::featureset::{
    ContractFeatureExtractor, FeatureExtractor, FeatureSchema, FeatureVector,
};
pub use dataset::{BuildSummary, Dataset, DatasetBuilder};
pub use governance::{PointerStore, PromotionDecision, PromotionGovernor, PromotionReport};
pub use lang::{AnalyzableUnit, ContractParser};
pub use models::{ModelArtifact, ModelFamily, Trainer};
pub use oracle::{Label, Verdict, VerificationOracle};
pub use serving::{Predictor, RiskLevel, ServingReport};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
