//! Verification oracle: argument generation and dynamic labelling.
//!
//! The oracle never proves anything. It samples arguments for each unit,
//! discards samples that violate a precondition, calls the unit inside the
//! embedded runtime and checks its postconditions, turning the first
//! observed failure into a RISKY label.

pub mod generator;
pub mod labeler;

pub use generator::{
    unit_seed, ArgumentGenerator, GenerationContext, StrategyRegistry, TypeHint, ValueStrategy,
};
pub use labeler::{Label, Verdict, VerdictOutcome, VerificationOracle};
