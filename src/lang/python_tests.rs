use super::*;

fn units_of(source: &str) -> Vec<AnalyzableUnit> {
    let mut parser = ContractParser::new().unwrap();
    parser.extract_units(source, "test.py").unwrap()
}

#[test]
fn test_contract_parser_creation() {
    let parser = ContractParser::new();
    assert!(parser.is_ok(), "Should create Python parser successfully");
}

#[test]
fn test_leading_clauses_attach_to_function() {
    let source = r#"
# Integer division helper.
# @requires b != 0
# @ensures result * b == a
def div(a, b):
    return a // b
"#;
    let units = units_of(source);
    assert_eq!(units.len(), 1);

    let div = &units[0];
    assert_eq!(div.name, "div");
    assert_eq!(div.enclosing_type, None);
    assert_eq!(div.parameter_names().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(div.requires, vec!["b != 0"]);
    assert_eq!(div.ensures, vec!["result * b == a"]);
    assert!(div.invariants.is_empty());
    assert_eq!(div.source_line, 5);
    assert_eq!(div.size_in_lines, 1);
    assert_eq!(div.location.file_path, "test.py");
}

#[test]
fn test_body_comments_after_docstring_and_inline() {
    let source = r#"
# @ensures result >= 0
def absolute(x):
    """Absolute value."""
    # @requires x > -100
    if x < 0:
        return -x
    return x  # @ensures result == abs(x)
"#;
    let units = units_of(source);
    let absolute = &units[0];
    assert_eq!(absolute.requires, vec!["x > -100"]);
    assert_eq!(absolute.ensures, vec!["result >= 0", "result == abs(x)"]);
    assert_eq!(absolute.size_in_lines, 5);
}

#[test]
fn test_class_invariants_inherited_by_methods() {
    let source = r#"
# @invariant self.balance >= 0
class Account:
    def __init__(self, balance):
        self.balance = balance

    # @requires amount > 0
    # @ensures self.balance >= amount
    def deposit(self, amount):
        self.balance += amount
        return self.balance


def helper(x):
    return x
"#;
    let units = units_of(source);
    let names: Vec<_> = units.iter().map(|u| u.qualified_name()).collect();
    assert_eq!(names, vec!["Account.__init__", "Account.deposit", "helper"]);

    let init = &units[0];
    assert!(init.requires.is_empty());
    assert_eq!(init.invariants, vec!["self.balance >= 0"]);

    let deposit = &units[1];
    assert_eq!(deposit.enclosing_type.as_deref(), Some("Account"));
    assert!(deposit.has_receiver());
    assert_eq!(deposit.requires, vec!["amount > 0"]);
    assert_eq!(deposit.ensures, vec!["self.balance >= amount"]);
    assert_eq!(deposit.invariants, vec!["self.balance >= 0"]);

    let helper = &units[2];
    assert!(helper.invariants.is_empty());
    assert_eq!(helper.enclosing_type, None);
}

#[test]
fn test_invariant_declared_inside_class_body() {
    let source = r#"
class Counter:
    # @invariant self.count >= 0
    def __init__(self):
        self.count = 0

    def bump(self):
        self.count += 1
"#;
    let units = units_of(source);
    assert_eq!(units.len(), 2);
    for unit in &units {
        assert_eq!(unit.invariants, vec!["self.count >= 0"]);
        assert!(unit.requires.is_empty());
    }
}

#[test]
fn test_nested_definition_comments_stay_with_nested_unit() {
    let source = r#"
def outer(n):
    def inner(m):
        # @ensures result == m
        return m
    # @requires n >= 0
    return inner(n)
"#;
    let units = units_of(source);
    let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["outer", "inner"]);

    let outer = &units[0];
    assert_eq!(outer.requires, vec!["n >= 0"]);
    assert!(outer.ensures.is_empty());

    let inner = &units[1];
    assert_eq!(inner.ensures, vec!["result == m"]);
    assert!(inner.requires.is_empty());
    assert_eq!(inner.enclosing_type, None);
}

#[test]
fn test_decorated_method_keeps_leading_comments() {
    let source = r#"
class Tools:
    # @requires x >= 0
    @staticmethod
    def root(x):
        return x
"#;
    let units = units_of(source);
    let root = &units[0];
    assert_eq!(root.enclosing_type.as_deref(), Some("Tools"));
    assert_eq!(root.requires, vec!["x >= 0"]);
    assert!(!root.has_receiver());
    assert_eq!(root.location.start_line, 4);
    assert_eq!(root.source_line, 5);
}

#[test]
fn test_parameter_details() {
    let source = r#"
class Shape:
    def scale(self, factor: float, times=2, *rest, keyword=3):
        return factor
"#;
    let units = units_of(source);
    let scale = &units[0];
    assert_eq!(
        scale.parameter_names().collect::<Vec<_>>(),
        vec!["self", "factor", "times"]
    );
    assert_eq!(scale.parameters[1].annotation.as_deref(), Some("float"));
    assert!(!scale.parameters[1].has_default);
    assert!(scale.parameters[2].has_default);
    assert_eq!(scale.explicit_parameters().len(), 2);
}

#[test]
fn test_unknown_annotations_are_ignored() {
    let source = r#"
# @assumes x > 0
# TODO: @requires is written below
def f(x):
    # @requires x > 0
    return x
"#;
    let units = units_of(source);
    assert_eq!(units[0].requires, vec!["x > 0"]);
    assert!(units[0].ensures.is_empty());
}

#[test]
fn test_syntax_error_fails_whole_file() {
    let mut parser = ContractParser::new().unwrap();
    let source = "def ok(x):\n    return x\n\ndef broken(:\n    return 1\n";
    let err = parser.extract_units(source, "broken.py").unwrap_err();
    match err {
        SpecLensError::Parse {
            file_path, line, ..
        } => {
            assert_eq!(file_path.as_deref(), Some("broken.py"));
            assert!(line.is_some());
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_empty_source_has_no_units() {
    assert!(units_of("").is_empty());
    assert!(units_of("# @requires x > 0\nx = 1\n").is_empty());
}

#[test]
fn test_module_name_is_file_stem() {
    let mut parser = ContractParser::new().unwrap();
    let source = parser
        .parse_source("x = 1\n", "samples/bank_account.py")
        .unwrap();
    assert_eq!(source.module_name(), "bank_account");
    assert_eq!(source.root().kind(), "module");
}
