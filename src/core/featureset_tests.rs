use super::*;
use crate::lang::common::{Parameter, SourceLocation};

fn account_deposit() -> AnalyzableUnit {
    AnalyzableUnit {
        name: "deposit".into(),
        enclosing_type: Some("Account".into()),
        parameters: vec![Parameter::named("self"), Parameter::named("amount")],
        requires: vec!["amount > 0".into()],
        ensures: vec!["self.balance >= amount".into()],
        invariants: vec!["self.balance >= 0".into()],
        source_line: 8,
        size_in_lines: 2,
        location: SourceLocation {
            file_path: "bank.py".into(),
            start_line: 6,
            end_line: 10,
        },
    }
}

#[test]
fn test_schema_order_is_fixed() {
    let schema = FeatureSchema::contract();
    assert_eq!(
        schema.columns(),
        [
            "n_params",
            "n_requires",
            "n_ensures",
            "n_invariants",
            "n_loc",
            "has_self",
            "has_other",
            "requires_complexity",
            "ensures_complexity",
            "ensures_has_arith",
            "ensures_has_cmp",
        ]
    );
    assert_eq!(ContractFeatureExtractor::new().schema(), schema);
}

#[test]
fn test_extract_method_features() {
    let vector = ContractFeatureExtractor::new().extract(&account_deposit());
    assert_eq!(vector.get("n_params"), Some(1.0));
    assert_eq!(vector.get("n_requires"), Some(1.0));
    assert_eq!(vector.get("n_invariants"), Some(1.0));
    assert_eq!(vector.get("n_loc"), Some(2.0));
    assert_eq!(vector.get("has_self"), Some(1.0));
    assert_eq!(vector.get("has_other"), Some(0.0));
    assert_eq!(vector.get("requires_complexity"), Some(10.0));
    assert_eq!(vector.get("ensures_complexity"), Some(22.0));
    assert_eq!(vector.get("ensures_has_arith"), Some(0.0));
    assert_eq!(vector.get("ensures_has_cmp"), Some(1.0));
    assert_eq!(
        vector.names().collect::<Vec<_>>(),
        FeatureSchema::contract().columns()
    );
}

#[test]
fn test_arithmetic_detection_in_ensures() {
    let mut unit = account_deposit();
    unit.ensures = vec!["result * b == a".into()];
    unit.parameters.push(Parameter::named("other"));
    let vector = ContractFeatureExtractor::new().extract(&unit);
    assert_eq!(vector.get("ensures_has_arith"), Some(1.0));
    assert_eq!(vector.get("has_other"), Some(1.0));
    assert_eq!(vector.get("n_params"), Some(2.0));
}

#[test]
fn test_projection_fills_missing_and_drops_extra() {
    let schema = FeatureSchema::new(["a", "b", "c"]);
    let mut vector = FeatureVector::new();
    vector.insert("c", 3.0);
    vector.insert("a", 1.0);
    vector.insert("unknown", 9.0);

    let projected = schema.project(&vector);
    assert_eq!(projected.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert_eq!(projected.get("b"), Some(0.0));
    assert_eq!(projected.get("unknown"), None);
    assert_eq!(vector.to_row(&schema), vec![1.0, 0.0, 3.0]);
}

#[test]
fn test_empty_unit_has_zero_features() {
    let mut unit = account_deposit();
    unit.enclosing_type = None;
    unit.parameters.clear();
    unit.requires.clear();
    unit.ensures.clear();
    unit.invariants.clear();
    unit.size_in_lines = 0;
    let vector = ContractFeatureExtractor::new().extract(&unit);
    assert!(vector.iter().all(|(_, value)| value == 0.0));
    assert_eq!(vector.len(), FeatureSchema::contract().len());
}
