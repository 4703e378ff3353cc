//! One-pass symbol table for contract inheritance.
//!
//! Built once per file while walking the syntax tree: every class records its
//! invariant clauses, every function definition records the class whose body
//! directly contains it. Units then look their invariants up by name instead
//! of re-walking the tree.

use std::collections::HashMap;

use indexmap::IndexMap;

/// Per-class information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSymbol {
    /// Class name
    pub name: String,
    /// 1-based line of the `class` keyword
    pub line: usize,
    /// Invariant clauses in extraction order
    pub invariants: Vec<String>,
}

/// Class and method lookup tables for one source file.
#[derive(Debug, Default)]
pub struct SymbolTable {
    types: IndexMap<String, TypeSymbol>,
    enclosing: HashMap<usize, String>,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a class; a later class with the same name replaces the earlier
    /// one, matching module rebinding at runtime.
    pub fn add_type(&mut self, symbol: TypeSymbol) {
        self.types.insert(symbol.name.clone(), symbol);
    }

    /// Record that the definition with `def_id` sits directly in `class_name`.
    pub fn set_enclosing(&mut self, def_id: usize, class_name: impl Into<String>) {
        self.enclosing.insert(def_id, class_name.into());
    }

    /// Class directly enclosing a definition, if any.
    pub fn enclosing_type(&self, def_id: usize) -> Option<&str> {
        self.enclosing.get(&def_id).map(String::as_str)
    }

    /// Invariants declared on a class; empty for unknown names.
    pub fn invariants_of(&self, class_name: &str) -> &[String] {
        self.types
            .get(class_name)
            .map(|symbol| symbol.invariants.as_slice())
            .unwrap_or(&[])
    }

    /// Look a class up by name.
    pub fn get_type(&self, class_name: &str) -> Option<&TypeSymbol> {
        self.types.get(class_name)
    }

    /// All classes in first-definition order.
    pub fn types(&self) -> impl Iterator<Item = &TypeSymbol> {
        self.types.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariants_resolve_by_enclosing_type() {
        let mut table = SymbolTable::new();
        table.add_type(TypeSymbol {
            name: "Account".into(),
            line: 1,
            invariants: vec!["self.balance >= 0".into()],
        });
        table.set_enclosing(7, "Account");

        let class = table.enclosing_type(7).expect("method registered");
        assert_eq!(table.invariants_of(class), ["self.balance >= 0".to_string()]);
        assert_eq!(table.enclosing_type(8), None);
        assert!(table.invariants_of("Missing").is_empty());
    }

    #[test]
    fn later_class_definition_wins() {
        let mut table = SymbolTable::new();
        table.add_type(TypeSymbol {
            name: "A".into(),
            line: 1,
            invariants: vec!["first".into()],
        });
        table.add_type(TypeSymbol {
            name: "A".into(),
            line: 9,
            invariants: vec!["second".into()],
        });
        assert_eq!(table.invariants_of("A"), ["second".to_string()]);
        assert_eq!(table.types().count(), 1);
    }
}
