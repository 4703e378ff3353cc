//! Errors raised while executing interpreted code.
//!
//! A [`RuntimeError`] is a signal for the oracle rather than a library
//! failure: a Python exception becomes a RISKY label, an unsupported
//! construct means the unit cannot be tested, and budget exhaustion is
//! treated like a hang.

use std::fmt;

use super::value::Value;

/// Builtin exception hierarchy, child to parent.
const EXCEPTION_PARENTS: &[(&str, &str)] = &[
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("LookupError", "Exception"),
    ("IndexError", "LookupError"),
    ("KeyError", "LookupError"),
    ("ValueError", "Exception"),
    ("TypeError", "Exception"),
    ("NameError", "Exception"),
    ("UnboundLocalError", "NameError"),
    ("AttributeError", "Exception"),
    ("AssertionError", "Exception"),
    ("RuntimeError", "Exception"),
    ("RecursionError", "RuntimeError"),
    ("NotImplementedError", "RuntimeError"),
    ("StopIteration", "Exception"),
    ("MemoryError", "Exception"),
];

/// True if `name` is a builtin exception type.
pub fn is_builtin_exception(name: &str) -> bool {
    name == "BaseException" || EXCEPTION_PARENTS.iter().any(|(child, _)| *child == name)
}

/// `name` followed by its builtin ancestors.
pub fn builtin_lineage(name: &str) -> Vec<String> {
    let mut lineage = vec![name.to_string()];
    let mut current = name;
    while let Some((_, parent)) = EXCEPTION_PARENTS.iter().find(|(child, _)| *child == current) {
        lineage.push((*parent).to_string());
        current = parent;
    }
    lineage
}

/// A raised Python-level exception.
#[derive(Debug, Clone)]
pub struct PyException {
    /// Exception type name (`ZeroDivisionError`, or a user class name)
    pub kind: String,
    /// `str(exc)`
    pub message: String,
    /// Type names an `except` clause may match, most specific first
    pub lineage: Vec<String>,
    /// The raised object, when one exists
    pub value: Option<Value>,
}

impl PyException {
    /// Builtin exception with a message
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            lineage: builtin_lineage(kind),
            value: None,
        }
    }

    /// True if an `except <name>` clause catches this exception
    pub fn matches(&self, name: &str) -> bool {
        self.lineage.iter().any(|kind| kind == name)
    }
}

/// Why interpreted execution stopped abnormally.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// A Python exception propagated out of the code
    Exception(PyException),
    /// The code used a construct the runtime does not implement
    Unsupported(String),
    /// The statement budget ran out
    BudgetExhausted {
        /// Budget that was exceeded
        limit: u64,
    },
}

impl RuntimeError {
    /// Builtin exception shortcut
    pub fn exception(kind: &str, message: impl Into<String>) -> Self {
        Self::Exception(PyException::new(kind, message))
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::exception("TypeError", message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::exception("ValueError", message)
    }

    pub(crate) fn zero_division(message: impl Into<String>) -> Self {
        Self::exception("ZeroDivisionError", message)
    }

    pub(crate) fn overflow() -> Self {
        Self::exception("OverflowError", "integer overflow")
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Exception type name, or a marker for non-Python failures
    pub fn kind(&self) -> &str {
        match self {
            Self::Exception(exc) => &exc.kind,
            Self::Unsupported(_) => "Unsupported",
            Self::BudgetExhausted { .. } => "BudgetExhausted",
        }
    }

    /// Human-readable detail
    pub fn message(&self) -> String {
        match self {
            Self::Exception(exc) => exc.message.clone(),
            Self::Unsupported(what) => format!("unsupported construct: {what}"),
            Self::BudgetExhausted { limit } => {
                format!("step budget of {limit} statements exhausted")
            }
        }
    }

    /// True when the failure says nothing about the code's correctness
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception(exc) if exc.message.is_empty() => write!(f, "{}", exc.kind),
            Self::Exception(exc) => write!(f, "{}: {}", exc.kind, exc.message),
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result of interpreted execution
pub type RtResult<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_walks_to_base_exception() {
        assert_eq!(
            builtin_lineage("ZeroDivisionError"),
            vec!["ZeroDivisionError", "ArithmeticError", "Exception", "BaseException"]
        );
        assert_eq!(builtin_lineage("BaseException"), vec!["BaseException"]);
    }

    #[test]
    fn except_matching_follows_hierarchy() {
        let exc = PyException::new("KeyError", "'missing'");
        assert!(exc.matches("KeyError"));
        assert!(exc.matches("LookupError"));
        assert!(exc.matches("Exception"));
        assert!(!exc.matches("IndexError"));
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = RuntimeError::zero_division("division by zero");
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert_eq!(err.kind(), "ZeroDivisionError");
        assert!(!err.is_unsupported());
        assert!(RuntimeError::unsupported("with statement").is_unsupported());
    }
}
