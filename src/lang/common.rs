//! Language-agnostic representation of analyzable units and their contracts.

use serde::{Deserialize, Serialize};

/// Contract clause keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    /// `@requires`: precondition
    Requires,
    /// `@ensures`: postcondition, may reference `result`
    Ensures,
    /// `@invariant`: class invariant
    Invariant,
}

impl ClauseKind {
    /// Map an annotation keyword (without `@`) to its kind.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "requires" => Some(Self::Requires),
            "ensures" => Some(Self::Ensures),
            "invariant" => Some(Self::Invariant),
            _ => None,
        }
    }

    /// Annotation keyword without the `@`.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Requires => "requires",
            Self::Ensures => "ensures",
            Self::Invariant => "invariant",
        }
    }
}

/// Clauses recovered from one comment scan, in source order per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractClauses {
    /// Preconditions
    pub requires: Vec<String>,
    /// Postconditions
    pub ensures: Vec<String>,
    /// Invariants
    pub invariants: Vec<String>,
}

impl ContractClauses {
    /// Append a clause of the given kind.
    pub fn push(&mut self, kind: ClauseKind, expr: impl Into<String>) {
        match kind {
            ClauseKind::Requires => self.requires.push(expr.into()),
            ClauseKind::Ensures => self.ensures.push(expr.into()),
            ClauseKind::Invariant => self.invariants.push(expr.into()),
        }
    }

    /// Append all clauses of `other` after the existing ones.
    pub fn extend(&mut self, other: ContractClauses) {
        self.requires.extend(other.requires);
        self.ensures.extend(other.ensures);
        self.invariants.extend(other.invariants);
    }

    /// True if no clause of any kind was found.
    pub fn is_empty(&self) -> bool {
        self.requires.is_empty() && self.ensures.is_empty() && self.invariants.is_empty()
    }
}

/// A formal parameter of a function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Source text of the type annotation, if any
    pub annotation: Option<String>,
    /// Whether the parameter declares a default value
    pub has_default: bool,
}

impl Parameter {
    /// Parameter with no annotation or default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            has_default: false,
        }
    }

    /// True for the implicit receiver (`self` / `cls`).
    pub fn is_receiver(&self) -> bool {
        self.name == "self" || self.name == "cls"
    }
}

/// Source location information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File path
    pub file_path: String,

    /// Start line (1-based)
    pub start_line: usize,

    /// End line (1-based)
    pub end_line: usize,
}

/// One top-level function or method together with its contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzableUnit {
    /// Function name
    pub name: String,

    /// Immediately enclosing class, absent for functions
    pub enclosing_type: Option<String>,

    /// Formal parameters in declaration order, receiver included
    pub parameters: Vec<Parameter>,

    /// Preconditions in extraction order
    pub requires: Vec<String>,

    /// Postconditions in extraction order
    pub ensures: Vec<String>,

    /// Invariants inherited from the enclosing class
    pub invariants: Vec<String>,

    /// 1-based line of the `def`
    pub source_line: usize,

    /// Lines spanned by the body block
    pub size_in_lines: usize,

    /// File and span
    pub location: SourceLocation,
}

impl AnalyzableUnit {
    /// `Class.method` for methods, bare name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.enclosing_type {
            Some(class) => format!("{}.{}", class, self.name),
            None => self.name.clone(),
        }
    }

    /// Parameter names in order, receiver included.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// True if the first parameter is the implicit instance or class.
    pub fn has_receiver(&self) -> bool {
        self.enclosing_type.is_some()
            && self
                .parameters
                .first()
                .map(Parameter::is_receiver)
                .unwrap_or(false)
    }

    /// Parameters that receive generated arguments (receiver excluded).
    pub fn explicit_parameters(&self) -> &[Parameter] {
        if self.has_receiver() {
            &self.parameters[1..]
        } else {
            &self.parameters
        }
    }

    /// `__name__`-style special method.
    pub fn is_dunder(&self) -> bool {
        self.name.len() > 4 && self.name.starts_with("__") && self.name.ends_with("__")
    }

    /// True for methods of a class.
    pub fn is_method(&self) -> bool {
        self.enclosing_type.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, class: Option<&str>, params: &[&str]) -> AnalyzableUnit {
        AnalyzableUnit {
            name: name.to_string(),
            enclosing_type: class.map(str::to_string),
            parameters: params.iter().map(|p| Parameter::named(*p)).collect(),
            requires: vec![],
            ensures: vec![],
            invariants: vec![],
            source_line: 1,
            size_in_lines: 1,
            location: SourceLocation {
                file_path: "t.py".into(),
                start_line: 1,
                end_line: 2,
            },
        }
    }

    #[test]
    fn receiver_is_excluded_from_explicit_parameters() {
        let method = unit("deposit", Some("Account"), &["self", "amount"]);
        assert!(method.has_receiver());
        assert_eq!(method.explicit_parameters().len(), 1);
        assert_eq!(method.qualified_name(), "Account.deposit");

        let function = unit("clamp", None, &["x", "lo", "hi"]);
        assert!(!function.has_receiver());
        assert_eq!(function.explicit_parameters().len(), 3);
    }

    #[test]
    fn top_level_self_parameter_is_not_a_receiver() {
        let function = unit("odd", None, &["self", "x"]);
        assert!(!function.has_receiver());
    }

    #[test]
    fn dunder_detection() {
        assert!(unit("__init__", Some("A"), &["self"]).is_dunder());
        assert!(!unit("__", None, &[]).is_dunder());
        assert!(!unit("_private", None, &[]).is_dunder());
    }

    #[test]
    fn clause_keywords_round_trip() {
        for kind in [ClauseKind::Requires, ClauseKind::Ensures, ClauseKind::Invariant] {
            assert_eq!(ClauseKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(ClauseKind::from_keyword("assumes"), None);
    }
}
