//! Dynamic SAFE/RISKY labelling by contract-checked fuzzing.

use std::fmt;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::generator::{ArgumentGenerator, GenerationContext};
use crate::core::config::{OracleConfig, UnresolvedPolicy};
use crate::lang::common::AnalyzableUnit;
use crate::runtime::ast::Expr;
use crate::runtime::{parse_expression, Interpreter, LoadedModule, Namespace, RuntimeError};

/// Binary label; RISKY means a violation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Label {
    /// No violation observed
    Safe = 0,
    /// Runtime failure or contract violation observed
    Risky = 1,
}

impl Label {
    /// Numeric class (`0` / `1`)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Label for a numeric class
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Safe),
            1 => Some(Self::Risky),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => f.write_str("SAFE"),
            Self::Risky => f.write_str("RISKY"),
        }
    }
}

impl From<UnresolvedPolicy> for Label {
    fn from(policy: UnresolvedPolicy) -> Self {
        match policy {
            UnresolvedPolicy::AssumeSafe => Self::Safe,
            UnresolvedPolicy::AssumeRisky => Self::Risky,
        }
    }
}

/// Why the oracle settled on its label. `trial` is 0-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerdictOutcome {
    /// Every trial passed or was discarded
    NoViolation,
    /// The call raised or ran out of budget
    RuntimeFailure {
        /// Exception type (or `BudgetExhausted`)
        kind: String,
        /// Exception message
        message: String,
        /// Trial index
        trial: usize,
    },
    /// An `ensures` clause evaluated false
    PostconditionViolated {
        /// Clause text
        clause: String,
        /// Trial index
        trial: usize,
    },
    /// An `invariant` clause evaluated false after the call
    InvariantViolated {
        /// Clause text
        clause: String,
        /// Trial index
        trial: usize,
    },
    /// The unit could not be exercised
    Unresolved {
        /// What went wrong
        reason: String,
    },
}

impl fmt::Display for VerdictOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoViolation => f.write_str("no violation"),
            Self::RuntimeFailure {
                kind,
                message,
                trial,
            } if message.is_empty() => write!(f, "raised {kind} (trial {trial})"),
            Self::RuntimeFailure {
                kind,
                message,
                trial,
            } => write!(f, "raised {kind}: {message} (trial {trial})"),
            Self::PostconditionViolated { clause, trial } => {
                write!(f, "ensures `{clause}` failed (trial {trial})")
            }
            Self::InvariantViolated { clause, trial } => {
                write!(f, "invariant `{clause}` failed (trial {trial})")
            }
            Self::Unresolved { reason } => write!(f, "unresolved: {reason}"),
        }
    }
}

/// Label plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Final label
    pub label: Label,
    /// Evidence
    pub outcome: VerdictOutcome,
    /// Trials whose preconditions held and that were executed
    pub trials_run: usize,
    /// Trials discarded by a false precondition
    pub trials_discarded: usize,
}

impl Verdict {
    /// True when the unit was never exercised
    pub fn is_unresolved(&self) -> bool {
        matches!(self.outcome, VerdictOutcome::Unresolved { .. })
    }
}

/// Clause text with its parsed form; `None` when it does not parse.
struct Clause<'a> {
    text: &'a str,
    expr: Option<Expr>,
}

impl<'a> Clause<'a> {
    fn compile(text: &'a str) -> Self {
        let expr = match parse_expression(text) {
            Ok(expr) => Some(expr),
            Err(err) => {
                debug!(clause = %text, error = %err, "Contract clause does not parse");
                None
            }
        };
        Self { text, expr }
    }

    /// Any evaluation failure counts as false.
    fn holds(&self, interpreter: &mut Interpreter, bindings: &Namespace) -> bool {
        let Some(expr) = &self.expr else {
            return false;
        };
        interpreter.reset_budget();
        match interpreter.eval_sandboxed(expr, bindings) {
            Ok(value) => value.truthy(),
            Err(err) => {
                debug!(clause = %self.text, error = %err, "Contract clause raised");
                false
            }
        }
    }
}

/// Fuzzes one unit against its contracts.
pub struct VerificationOracle {
    generator: ArgumentGenerator,
    trials: usize,
    constructor_arg: i64,
    unresolved_policy: UnresolvedPolicy,
    check_invariants: bool,
}

impl VerificationOracle {
    /// Oracle with the default argument generator
    pub fn new(config: &OracleConfig) -> Self {
        Self::with_generator(config, ArgumentGenerator::new(config))
    }

    /// Oracle with a caller-supplied generator
    pub fn with_generator(config: &OracleConfig, generator: ArgumentGenerator) -> Self {
        Self {
            generator,
            trials: config.trials,
            constructor_arg: config.constructor_arg,
            unresolved_policy: config.unresolved_policy,
            check_invariants: config.check_invariants,
        }
    }

    /// Run up to the trial budget, stopping at the first violation.
    pub fn verify(&self, unit: &AnalyzableUnit, module: &LoadedModule, rng: &mut StdRng) -> Verdict {
        let requires: Vec<Clause<'_>> = unit.requires.iter().map(|c| Clause::compile(c)).collect();
        let ensures: Vec<Clause<'_>> = unit.ensures.iter().map(|c| Clause::compile(c)).collect();
        let invariants: Vec<Clause<'_>> = if self.check_invariants {
            unit.invariants.iter().map(|c| Clause::compile(c)).collect()
        } else {
            Vec::new()
        };

        let mut interpreter = module.interpreter();
        let resolved = match module.resolve(&mut interpreter, unit, self.constructor_arg) {
            Ok(resolved) => resolved,
            Err(reason) => return self.unresolved(unit, reason, 0, 0),
        };

        let parameters = unit.explicit_parameters();
        let mut trials_run = 0;
        let mut trials_discarded = 0;

        for trial in 0..self.trials {
            interpreter.reset_budget();
            let arguments = {
                let mut ctx = GenerationContext {
                    module,
                    interpreter: &mut interpreter,
                    enclosing_type: unit.enclosing_type.as_deref(),
                };
                match self.generator.arguments(parameters, &mut ctx, rng) {
                    Ok(arguments) => arguments,
                    Err(err) => {
                        let reason = format!("argument generation failed: {err}");
                        return self.unresolved(unit, reason, trials_run, trials_discarded);
                    }
                }
            };

            let mut bindings: Namespace = parameters
                .iter()
                .map(|p| p.name.clone())
                .zip(arguments.iter().cloned())
                .collect();
            if let Some(receiver) = &resolved.receiver {
                bindings.insert("self".to_string(), receiver.clone());
            }

            if !requires.iter().all(|c| c.holds(&mut interpreter, &bindings)) {
                trials_discarded += 1;
                continue;
            }

            interpreter.reset_budget();
            let result = match interpreter.call(&resolved.callable, arguments, Vec::new()) {
                Ok(result) => result,
                Err(err) if err.is_unsupported() => {
                    return self.unresolved(unit, err.message(), trials_run, trials_discarded);
                }
                Err(err) => {
                    return self.violation(
                        unit,
                        runtime_failure(&err, trial),
                        trials_run + 1,
                        trials_discarded,
                    );
                }
            };
            trials_run += 1;

            bindings.insert("result".to_string(), result);
            if let Some(failed) = ensures.iter().find(|c| !c.holds(&mut interpreter, &bindings)) {
                let outcome = VerdictOutcome::PostconditionViolated {
                    clause: failed.text.to_string(),
                    trial,
                };
                return self.violation(unit, outcome, trials_run, trials_discarded);
            }

            if resolved.receiver.is_some() {
                if let Some(failed) = invariants.iter().find(|c| !c.holds(&mut interpreter, &bindings)) {
                    let outcome = VerdictOutcome::InvariantViolated {
                        clause: failed.text.to_string(),
                        trial,
                    };
                    return self.violation(unit, outcome, trials_run, trials_discarded);
                }
            }
        }

        debug!(
            unit = %unit.qualified_name(),
            trials_run,
            trials_discarded,
            "No violation observed"
        );
        Verdict {
            label: Label::Safe,
            outcome: VerdictOutcome::NoViolation,
            trials_run,
            trials_discarded,
        }
    }

    fn violation(
        &self,
        unit: &AnalyzableUnit,
        outcome: VerdictOutcome,
        trials_run: usize,
        trials_discarded: usize,
    ) -> Verdict {
        debug!(unit = %unit.qualified_name(), outcome = %outcome, "Labelled RISKY");
        Verdict {
            label: Label::Risky,
            outcome,
            trials_run,
            trials_discarded,
        }
    }

    fn unresolved(
        &self,
        unit: &AnalyzableUnit,
        reason: String,
        trials_run: usize,
        trials_discarded: usize,
    ) -> Verdict {
        let label = Label::from(self.unresolved_policy);
        warn!(
            unit = %unit.qualified_name(),
            file = %unit.location.file_path,
            reason = %reason,
            label = %label,
            "Unit could not be exercised; labelled by unresolved policy"
        );
        Verdict {
            label,
            outcome: VerdictOutcome::Unresolved { reason },
            trials_run,
            trials_discarded,
        }
    }
}

fn runtime_failure(err: &RuntimeError, trial: usize) -> VerdictOutcome {
    let message = match err {
        RuntimeError::Exception(exc) => exc.message.clone(),
        other => other.message(),
    };
    VerdictOutcome::RuntimeFailure {
        kind: err.kind().to_string(),
        message,
        trial,
    }
}

#[cfg(test)]
#[path = "labeler_tests.rs"]
mod tests;
