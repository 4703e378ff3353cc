//! Property tests for feature-schema stability and oracle precondition gating.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use speclens::core::config::OracleConfig;
use speclens::dataset::{Dataset, LabeledExample};
use speclens::lang::{AnalyzableUnit, Parameter, SourceLocation};
use speclens::oracle::{Label, VerdictOutcome, VerificationOracle};
use speclens::runtime::{ExecutionLimits, LoadedModule};
use speclens::{ContractFeatureExtractor, ContractParser, FeatureExtractor, FeatureSchema};

fn oracle_config(seed: u64) -> OracleConfig {
    OracleConfig {
        seed: Some(seed),
        step_budget: 5_000,
        max_call_depth: 12,
        ..OracleConfig::default()
    }
}

fn verify(code: &str, name: &str, config: &OracleConfig) -> speclens::Verdict {
    let mut parser = ContractParser::new().unwrap();
    let source = parser.parse_source(code, "prop.py").unwrap();
    let unit = parser
        .units(&source)
        .into_iter()
        .find(|u| u.name == name)
        .unwrap();
    let module = LoadedModule::load(&source, ExecutionLimits::from(config)).unwrap();
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
    VerificationOracle::new(config).verify(&unit, &module, &mut rng)
}

fn clause() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("x > 0".to_string()),
        Just("result == a + b".to_string()),
        Just("len(items) <= 4".to_string()),
        "[a-z]{1,6} (<|>|==|!=) [0-9]{1,3}",
        "[a-z]{1,4} \\* [a-z]{1,4} - 1",
    ]
}

prop_compose! {
    fn unit()(
        name in "[a-z_][a-z0-9_]{0,10}",
        class in proptest::option::of("[A-Z][a-z]{0,8}"),
        params in proptest::collection::vec("[a-z]{1,6}", 0..5),
        requires in proptest::collection::vec(clause(), 0..4),
        ensures in proptest::collection::vec(clause(), 0..4),
        invariants in proptest::collection::vec(clause(), 0..3),
        line in 1usize..500,
        size in 0usize..80,
    ) -> AnalyzableUnit {
        let mut parameters: Vec<Parameter> = params.into_iter().map(Parameter::named).collect();
        if class.is_some() {
            parameters.insert(0, Parameter::named("self"));
        }
        AnalyzableUnit {
            name,
            invariants: if class.is_some() { invariants } else { Vec::new() },
            enclosing_type: class,
            parameters,
            requires,
            ensures,
            source_line: line,
            size_in_lines: size,
            location: SourceLocation {
                file_path: "prop.py".to_string(),
                start_line: line,
                end_line: line + size,
            },
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn feature_keys_always_match_the_schema(unit in unit()) {
        let extractor = ContractFeatureExtractor::new();
        let vector = extractor.extract(&unit);
        let keys: Vec<&str> = vector.names().collect();
        let schema = FeatureSchema::contract();
        let columns: Vec<&str> = schema.columns().iter().map(String::as_str).collect();
        prop_assert_eq!(keys, columns);
    }

    #[test]
    fn feature_keys_survive_the_dataset_table(units in proptest::collection::vec(unit(), 1..6)) {
        let extractor = ContractFeatureExtractor::new();
        let examples: Vec<LabeledExample> = units
            .iter()
            .map(|unit| LabeledExample {
                features: extractor.extract(unit),
                label: Label::Safe,
                source_file: "prop.py".to_string(),
                name: unit.name.clone(),
                class: unit.enclosing_type.clone(),
            })
            .collect();
        let dataset = Dataset { schema: FeatureSchema::contract(), examples };

        let parsed = Dataset::from_csv_str(&dataset.to_csv_string()).unwrap();
        prop_assert_eq!(&parsed.schema, &dataset.schema);
        for (served, stored) in units.iter().zip(&parsed.examples) {
            let fresh = extractor.extract(served);
            prop_assert_eq!(fresh.names().collect::<Vec<_>>(), stored.features.names().collect::<Vec<_>>());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn unsatisfiable_preconditions_never_decide_the_label(bound in 5i64..1_000, seed in any::<u64>()) {
        let code = format!(
            "# @requires x > {bound}\n# @ensures result == x\ndef explode(x):\n    raise ValueError('boom')\n"
        );
        let config = oracle_config(seed);
        let verdict = verify(&code, "explode", &config);

        prop_assert_eq!(verdict.label, Label::Safe);
        prop_assert_eq!(verdict.trials_run, 0);
        prop_assert_eq!(verdict.trials_discarded, config.trials);
    }

    #[test]
    fn a_raise_on_valid_input_is_always_risky(seed in any::<u64>()) {
        let code = "# @requires x >= -5\ndef explode(x):\n    raise ValueError('boom')\n";
        let verdict = verify(code, "explode", &oracle_config(seed));

        prop_assert_eq!(verdict.label, Label::Risky);
        let is_value_error = matches!(
            verdict.outcome,
            VerdictOutcome::RuntimeFailure { ref kind, trial: 0, .. } if kind == "ValueError"
        );
        prop_assert!(is_value_error);
    }
}
