use super::*;
use crate::lang::python::ContractParser;
use crate::runtime::ExecutionLimits;
use rand::SeedableRng;

fn config() -> OracleConfig {
    OracleConfig {
        seed: Some(7),
        step_budget: 5_000,
        max_call_depth: 12,
        ..OracleConfig::default()
    }
}

fn verdict_with(config: &OracleConfig, code: &str, qualified: &str) -> Verdict {
    let mut parser = ContractParser::new().unwrap();
    let source = parser.parse_source(code, "unit.py").unwrap();
    let units = parser.units(&source);
    let unit = units
        .iter()
        .find(|u| u.qualified_name() == qualified)
        .unwrap_or_else(|| panic!("no unit {qualified}"));
    let module = LoadedModule::load(&source, ExecutionLimits::from(config)).unwrap();
    let oracle = VerificationOracle::new(config);
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(0));
    oracle.verify(unit, &module, &mut rng)
}

fn verdict(code: &str, qualified: &str) -> Verdict {
    verdict_with(&config(), code, qualified)
}

const DIV: &str = "\
# @requires b != 0
# @ensures result * b == a
def div(a, b):
    return a // b
";

const CLAMP: &str = "\
# @requires lo <= hi
# @ensures result >= lo and result <= hi
def clamp(x, lo, hi):
    if x < lo:
        return lo
    if x > hi:
        return hi
    return x
";

#[test]
fn integer_division_violates_its_postcondition() {
    let verdict = verdict(DIV, "div");
    assert_eq!(verdict.label, Label::Risky);
    assert!(matches!(
        verdict.outcome,
        VerdictOutcome::PostconditionViolated { ref clause, .. } if clause == "result * b == a"
    ));
}

#[test]
fn correct_clamp_is_safe_for_every_seed() {
    for seed in 0..10 {
        let config = OracleConfig {
            seed: Some(seed),
            ..config()
        };
        let verdict = verdict_with(&config, CLAMP, "clamp");
        assert_eq!(verdict.label, Label::Safe, "seed {seed}");
        assert_eq!(verdict.outcome, VerdictOutcome::NoViolation);
        assert_eq!(verdict.trials_run + verdict.trials_discarded, 20);
    }
}

#[test]
fn unbound_name_in_ensures_is_false_not_fatal() {
    let code = "\
# @ensures result == undefined_name
def ident(x):
    return x
";
    let verdict = verdict(code, "ident");
    assert_eq!(verdict.label, Label::Risky);
    assert!(matches!(
        verdict.outcome,
        VerdictOutcome::PostconditionViolated { trial: 0, .. }
    ));
}

#[test]
fn unparseable_ensures_is_false() {
    let code = "\
# @ensures result ==
def ident(x):
    return x
";
    assert_eq!(verdict(code, "ident").label, Label::Risky);
}

#[test]
fn reachable_exception_is_risky() {
    let code = "def inverse(x):\n    return 10 // x\n";
    let config = OracleConfig {
        trials: 300,
        ..config()
    };
    let verdict = verdict_with(&config, code, "inverse");
    assert_eq!(verdict.label, Label::Risky);
    match verdict.outcome {
        VerdictOutcome::RuntimeFailure { kind, .. } => assert_eq!(kind, "ZeroDivisionError"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn unsatisfiable_precondition_never_influences_the_label() {
    let code = "\
# @requires x > 100
def explode(x):
    raise ValueError('boom')
";
    let verdict = verdict(code, "explode");
    assert_eq!(verdict.label, Label::Safe);
    assert_eq!(verdict.trials_run, 0);
    assert_eq!(verdict.trials_discarded, 20);
}

#[test]
fn runaway_loop_is_risky() {
    let code = "def spin(n):\n    while True:\n        n += 1\n";
    let verdict = verdict(code, "spin");
    assert_eq!(verdict.label, Label::Risky);
    assert!(matches!(
        verdict.outcome,
        VerdictOutcome::RuntimeFailure { ref kind, .. } if kind == "BudgetExhausted"
    ));
}

#[test]
fn failing_constructor_follows_unresolved_policy() {
    let code = "\
class Fragile:
    def __init__(self, n):
        raise RuntimeError('no')

    # @ensures result == 1
    def one(self):
        return 1
";
    let verdict = verdict(code, "Fragile.one");
    assert!(verdict.is_unresolved());
    assert_eq!(verdict.label, Label::Safe);

    let risky = OracleConfig {
        unresolved_policy: UnresolvedPolicy::AssumeRisky,
        ..config()
    };
    assert_eq!(verdict_with(&risky, code, "Fragile.one").label, Label::Risky);
}

#[test]
fn unsupported_construct_is_unresolved() {
    let code = "def read(path):\n    with open(path) as f:\n        return f.read()\n";
    let verdict = verdict(code, "read");
    assert!(verdict.is_unresolved());
    assert_eq!(verdict.label, Label::Safe);
}

const ACCOUNT: &str = "\
# @invariant self.balance >= 0
class Account:
    def __init__(self, balance):
        self.balance = balance

    def withdraw(self, amount):
        # @requires amount > 0
        self.balance -= amount
        return self.balance
";

#[test]
fn invariants_are_checked_only_when_enabled() {
    let verdict = verdict(ACCOUNT, "Account.withdraw");
    assert_eq!(verdict.label, Label::Safe);

    let checking = OracleConfig {
        check_invariants: true,
        ..config()
    };
    let verdict = verdict_with(&checking, ACCOUNT, "Account.withdraw");
    assert_eq!(verdict.label, Label::Risky);
    assert!(matches!(
        verdict.outcome,
        VerdictOutcome::InvariantViolated { ref clause, .. } if clause == "self.balance >= 0"
    ));
}

#[test]
fn peer_parameters_receive_instances() {
    let code = "\
class Vec:
    def __init__(self, x):
        self.x = x

    # @ensures result == self.x + other.x
    def dot_x(self, other):
        return self.x + other.x
";
    let verdict = verdict(code, "Vec.dot_x");
    assert_eq!(verdict.label, Label::Safe);
    assert_eq!(verdict.trials_run, 20);
}

#[test]
fn same_seed_same_verdict() {
    assert_eq!(verdict(DIV, "div"), verdict(DIV, "div"));
}

#[test]
fn label_numeric_round_trip() {
    assert_eq!(Label::Safe.as_u8(), 0);
    assert_eq!(Label::Risky.as_u8(), 1);
    assert_eq!(Label::from_u8(1), Some(Label::Risky));
    assert_eq!(Label::from_u8(2), None);
    assert_eq!(Label::Risky.to_string(), "RISKY");
}
