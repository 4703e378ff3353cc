//! Argument generation for oracle trials.
//!
//! Each parameter is mapped to a [`TypeHint`] (from its annotation, the
//! configured name rules, or the built-in name table) and the hint selects a
//! [`ValueStrategy`] from the [`StrategyRegistry`]. Every call draws a fresh
//! value; nothing is memoized across trials.

use std::collections::HashMap;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::core::config::OracleConfig;
use crate::lang::common::Parameter;
use crate::runtime::value::Dict;
use crate::runtime::{Interpreter, LoadedModule, RtResult, Value};

/// Lightweight declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeHint {
    /// Integer from the configured range
    Int,
    /// Float from the configured range
    Float,
    /// String from a literal pool
    Str,
    /// List of integers
    Sequence,
    /// `str -> int` dictionary
    Mapping,
    /// Short string usable as a dictionary key
    Key,
    /// `True` / `False`
    Bool,
    /// Fresh instance of the enclosing class
    Peer,
}

/// Parameter names recognised without configuration.
const NAME_TABLE: &[(&[&str], TypeHint)] = &[
    (&["s", "text", "name", "word", "string"], TypeHint::Str),
    (&["values", "items", "lst", "xs", "seq", "numbers"], TypeHint::Sequence),
    (&["d", "mapping", "dict", "table"], TypeHint::Mapping),
    (&["key", "k"], TypeHint::Key),
    (&["other"], TypeHint::Peer),
    (&["flag"], TypeHint::Bool),
];

const STRING_POOL: &[&str] = &["", "a", "abc", "Hello", "hello world", "42", "  padded  "];
const KEY_POOL: &[&str] = &["a", "b", "c", "key", "missing"];

impl TypeHint {
    /// Hint for a Python annotation, if it names a supported type.
    pub fn from_annotation(annotation: &str, enclosing_type: Option<&str>) -> Option<Self> {
        let annotation = annotation.trim().trim_matches(|c| c == '\'' || c == '"');
        let head = annotation
            .split('[')
            .next()
            .unwrap_or(annotation)
            .trim()
            .rsplit('.')
            .next()
            .unwrap_or(annotation);

        match head {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Str),
            "bool" => Some(Self::Bool),
            "list" | "List" | "Sequence" | "tuple" | "Tuple" => Some(Self::Sequence),
            "dict" | "Dict" | "Mapping" => Some(Self::Mapping),
            _ if enclosing_type == Some(head) || head == "Self" => Some(Self::Peer),
            _ => None,
        }
    }

    /// Hint from the built-in parameter-name table.
    pub fn from_name(name: &str) -> Option<Self> {
        NAME_TABLE
            .iter()
            .find(|(names, _)| names.contains(&name))
            .map(|(_, hint)| *hint)
    }
}

/// What a strategy may use besides randomness.
pub struct GenerationContext<'a> {
    /// Module the unit lives in
    pub module: &'a LoadedModule,
    /// Interpreter used for the current unit
    pub interpreter: &'a mut Interpreter,
    /// Class of the unit under test, if it is a method
    pub enclosing_type: Option<&'a str>,
}

/// Produces one argument value per call.
pub trait ValueStrategy: Send + Sync {
    /// Draw a value
    fn generate(&self, ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value>;
}

/// Uniform integers in an inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct IntStrategy {
    low: i64,
    high: i64,
}

impl IntStrategy {
    /// Range `[low, high]`
    pub fn new(low: i64, high: i64) -> Self {
        Self {
            low: low.min(high),
            high: low.max(high),
        }
    }

    fn draw(&self, rng: &mut StdRng) -> i64 {
        rng.gen_range(self.low..=self.high)
    }
}

impl ValueStrategy for IntStrategy {
    fn generate(&self, _ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        Ok(Value::Int(self.draw(rng)))
    }
}

/// Uniform floats, occasionally snapped to an integral value.
#[derive(Debug, Clone, Copy)]
pub struct FloatStrategy {
    low: f64,
    high: f64,
}

impl FloatStrategy {
    /// Range `[low, high]`
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low: low.min(high),
            high: low.max(high),
        }
    }
}

impl ValueStrategy for FloatStrategy {
    fn generate(&self, _ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        let value = if self.low == self.high {
            self.low
        } else {
            rng.gen_range(self.low..=self.high)
        };
        // Integral floats exercise equality checks that random draws never hit.
        if rng.gen_bool(0.2) {
            return Ok(Value::Float(value.round()));
        }
        Ok(Value::Float(value))
    }
}

/// Uniform choice from a fixed pool of strings.
#[derive(Debug, Clone)]
pub struct PoolStrategy {
    pool: Vec<String>,
}

impl PoolStrategy {
    /// Pool of literals; an empty pool yields `""`
    pub fn new<I, S>(pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pool: pool.into_iter().map(Into::into).collect(),
        }
    }
}

impl ValueStrategy for PoolStrategy {
    fn generate(&self, _ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        if self.pool.is_empty() {
            return Ok(Value::str(""));
        }
        let index = rng.gen_range(0..self.pool.len());
        Ok(Value::str(&self.pool[index]))
    }
}

/// Lists of integers with random length.
#[derive(Debug, Clone, Copy)]
pub struct SequenceStrategy {
    element: IntStrategy,
    max_len: usize,
}

impl SequenceStrategy {
    /// Lists of `0..=max_len` elements drawn from `element`
    pub fn new(element: IntStrategy, max_len: usize) -> Self {
        Self { element, max_len }
    }
}

impl ValueStrategy for SequenceStrategy {
    fn generate(&self, _ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        let len = rng.gen_range(0..=self.max_len);
        let items = (0..len).map(|_| Value::Int(self.element.draw(rng))).collect();
        Ok(Value::list(items))
    }
}

/// Dictionaries from pool keys to integers.
#[derive(Debug, Clone)]
pub struct MappingStrategy {
    keys: Vec<String>,
    value: IntStrategy,
    max_len: usize,
}

impl MappingStrategy {
    /// Up to `max_len` entries keyed from `keys`
    pub fn new(keys: Vec<String>, value: IntStrategy, max_len: usize) -> Self {
        Self {
            keys,
            value,
            max_len,
        }
    }
}

impl ValueStrategy for MappingStrategy {
    fn generate(&self, _ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        let mut dict = Dict::new();
        if self.keys.is_empty() {
            return Ok(Value::dict(dict));
        }
        let len = rng.gen_range(0..=self.max_len);
        for _ in 0..len {
            let key = &self.keys[rng.gen_range(0..self.keys.len())];
            dict.insert(Value::str(key), Value::Int(self.value.draw(rng)));
        }
        Ok(Value::dict(dict))
    }
}

/// Fair coin.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolStrategy;

impl ValueStrategy for BoolStrategy {
    fn generate(&self, _ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        Ok(Value::Bool(rng.gen_bool(0.5)))
    }
}

/// New instance of the enclosing class built with a fixed constructor
/// argument; integers when the unit has no class.
#[derive(Debug, Clone, Copy)]
pub struct PeerStrategy {
    constructor_arg: i64,
    fallback: IntStrategy,
}

impl PeerStrategy {
    /// Peer built with `constructor_arg`
    pub fn new(constructor_arg: i64, fallback: IntStrategy) -> Self {
        Self {
            constructor_arg,
            fallback,
        }
    }
}

impl ValueStrategy for PeerStrategy {
    fn generate(&self, ctx: &mut GenerationContext<'_>, rng: &mut StdRng) -> RtResult<Value> {
        match ctx.enclosing_type {
            Some(class_name) => {
                ctx.module
                    .construct(ctx.interpreter, class_name, self.constructor_arg)
            }
            None => self.fallback.generate(ctx, rng),
        }
    }
}

/// Strategy per hint. Callers may replace any entry.
pub struct StrategyRegistry {
    strategies: HashMap<TypeHint, Box<dyn ValueStrategy>>,
    fallback: IntStrategy,
}

impl StrategyRegistry {
    /// Default strategies parameterised by the oracle configuration
    pub fn from_config(config: &OracleConfig) -> Self {
        let ints = IntStrategy::new(config.int_range[0], config.int_range[1]);
        let max_len = config.max_sequence_len;

        let mut registry = Self {
            strategies: HashMap::new(),
            fallback: ints,
        };
        registry.register(TypeHint::Int, ints);
        registry.register(
            TypeHint::Float,
            FloatStrategy::new(config.float_range[0], config.float_range[1]),
        );
        registry.register(TypeHint::Str, PoolStrategy::new(STRING_POOL.iter().copied()));
        registry.register(TypeHint::Sequence, SequenceStrategy::new(ints, max_len));
        registry.register(
            TypeHint::Mapping,
            MappingStrategy::new(
                KEY_POOL.iter().map(|k| (*k).to_string()).collect(),
                ints,
                max_len,
            ),
        );
        registry.register(TypeHint::Key, PoolStrategy::new(KEY_POOL.iter().copied()));
        registry.register(TypeHint::Bool, BoolStrategy);
        registry.register(TypeHint::Peer, PeerStrategy::new(config.constructor_arg, ints));
        registry
    }

    /// Install or replace the strategy for `hint`
    pub fn register(&mut self, hint: TypeHint, strategy: impl ValueStrategy + 'static) {
        self.strategies.insert(hint, Box::new(strategy));
    }

    /// Draw a value for `hint`
    pub fn generate(
        &self,
        hint: TypeHint,
        ctx: &mut GenerationContext<'_>,
        rng: &mut StdRng,
    ) -> RtResult<Value> {
        match self.strategies.get(&hint) {
            Some(strategy) => strategy.generate(ctx, rng),
            None => self.fallback.generate(ctx, rng),
        }
    }
}

/// Resolves parameter hints and draws arguments.
pub struct ArgumentGenerator {
    registry: StrategyRegistry,
    name_hints: IndexMap<String, TypeHint>,
}

impl ArgumentGenerator {
    /// Generator with the default registry for `config`
    pub fn new(config: &OracleConfig) -> Self {
        Self::with_registry(StrategyRegistry::from_config(config), config.name_hints.clone())
    }

    /// Generator over a custom registry
    pub fn with_registry(registry: StrategyRegistry, name_hints: IndexMap<String, TypeHint>) -> Self {
        Self {
            registry,
            name_hints,
        }
    }

    /// Mutable access for registering replacement strategies
    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    /// Annotation, then configured names, then the built-in table, then `Int`.
    pub fn hint_for(&self, parameter: &Parameter, enclosing_type: Option<&str>) -> TypeHint {
        parameter
            .annotation
            .as_deref()
            .and_then(|annotation| TypeHint::from_annotation(annotation, enclosing_type))
            .or_else(|| self.name_hints.get(&parameter.name).copied())
            .or_else(|| TypeHint::from_name(&parameter.name))
            .unwrap_or(TypeHint::Int)
    }

    /// One value per parameter, in order
    pub fn arguments(
        &self,
        parameters: &[Parameter],
        ctx: &mut GenerationContext<'_>,
        rng: &mut StdRng,
    ) -> RtResult<Vec<Value>> {
        parameters
            .iter()
            .map(|parameter| {
                let hint = self.hint_for(parameter, ctx.enclosing_type);
                self.registry.generate(hint, ctx, rng)
            })
            .collect()
    }
}

/// Seed for one unit's RNG, independent of processing order.
pub fn unit_seed(seed: u64, file_name: &str, qualified_name: &str) -> u64 {
    let mut key = Vec::with_capacity(file_name.len() + qualified_name.len() + 1);
    key.extend_from_slice(file_name.as_bytes());
    key.push(0);
    key.extend_from_slice(qualified_name.as_bytes());
    xxh3_64_with_seed(&key, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::python::ContractParser;
    use crate::runtime::ExecutionLimits;
    use rand::SeedableRng;

    fn module(code: &str) -> LoadedModule {
        let mut parser = ContractParser::new().unwrap();
        let source = parser.parse_source(code, "gen.py").unwrap();
        LoadedModule::load(&source, ExecutionLimits::default()).unwrap()
    }

    fn param(name: &str, annotation: Option<&str>) -> Parameter {
        Parameter {
            name: name.to_string(),
            annotation: annotation.map(str::to_string),
            has_default: false,
        }
    }

    #[test]
    fn annotation_wins_over_name() {
        let generator = ArgumentGenerator::new(&OracleConfig::default());
        assert_eq!(generator.hint_for(&param("s", Some("int")), None), TypeHint::Int);
        assert_eq!(
            generator.hint_for(&param("x", Some("list[int]")), None),
            TypeHint::Sequence
        );
        assert_eq!(
            generator.hint_for(&param("x", Some("'Vector'")), Some("Vector")),
            TypeHint::Peer
        );
        assert_eq!(generator.hint_for(&param("text", None), None), TypeHint::Str);
        assert_eq!(generator.hint_for(&param("amount", None), None), TypeHint::Int);
    }

    #[test]
    fn configured_names_override_builtin_table() {
        let mut config = OracleConfig::default();
        config.name_hints.insert("items".into(), TypeHint::Mapping);
        config.name_hints.insert("ratio".into(), TypeHint::Float);
        let generator = ArgumentGenerator::new(&config);
        assert_eq!(generator.hint_for(&param("items", None), None), TypeHint::Mapping);
        assert_eq!(generator.hint_for(&param("ratio", None), None), TypeHint::Float);
    }

    #[test]
    fn integers_stay_in_range() {
        let module = module("x = 1\n");
        let mut interpreter = module.interpreter();
        let mut ctx = GenerationContext {
            module: &module,
            interpreter: &mut interpreter,
            enclosing_type: None,
        };
        let generator = ArgumentGenerator::new(&OracleConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let values = generator
                .arguments(&[param("a", None), param("xs", None)], &mut ctx, &mut rng)
                .unwrap();
            let a = values[0].as_int().unwrap();
            assert!((-5..=5).contains(&a));
            match &values[1] {
                Value::List(items) => assert!(items.borrow().len() <= 4),
                other => panic!("expected list, got {other:?}"),
            }
        }
    }

    #[test]
    fn peer_builds_enclosing_class() {
        let module = module(
            "class Point:\n    def __init__(self, x):\n        self.x = x\n",
        );
        let mut interpreter = module.interpreter();
        let mut ctx = GenerationContext {
            module: &module,
            interpreter: &mut interpreter,
            enclosing_type: Some("Point"),
        };
        let generator = ArgumentGenerator::new(&OracleConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let values = generator
            .arguments(&[param("other", None)], &mut ctx, &mut rng)
            .unwrap();
        assert_eq!(values[0].type_name(), "Point");
    }

    #[test]
    fn peer_without_class_falls_back_to_int() {
        let module = module("x = 1\n");
        let mut interpreter = module.interpreter();
        let mut ctx = GenerationContext {
            module: &module,
            interpreter: &mut interpreter,
            enclosing_type: None,
        };
        let generator = ArgumentGenerator::new(&OracleConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let values = generator
            .arguments(&[param("other", None)], &mut ctx, &mut rng)
            .unwrap();
        assert!(values[0].as_int().is_some());
    }

    #[test]
    fn replacement_strategy_is_used() {
        struct Constant;
        impl ValueStrategy for Constant {
            fn generate(&self, _: &mut GenerationContext<'_>, _: &mut StdRng) -> RtResult<Value> {
                Ok(Value::Int(99))
            }
        }

        let module = module("x = 1\n");
        let mut interpreter = module.interpreter();
        let mut ctx = GenerationContext {
            module: &module,
            interpreter: &mut interpreter,
            enclosing_type: None,
        };
        let mut generator = ArgumentGenerator::new(&OracleConfig::default());
        generator.registry_mut().register(TypeHint::Int, Constant);
        let mut rng = StdRng::seed_from_u64(3);
        let values = generator.arguments(&[param("n", None)], &mut ctx, &mut rng).unwrap();
        assert!(matches!(values[0], Value::Int(99)));
    }

    #[test]
    fn unit_seed_depends_on_identity() {
        let a = unit_seed(42, "a.py", "f");
        assert_eq!(a, unit_seed(42, "a.py", "f"));
        assert_ne!(a, unit_seed(42, "a.py", "g"));
        assert_ne!(a, unit_seed(43, "a.py", "f"));
        assert_ne!(unit_seed(1, "ab.py", "c"), unit_seed(1, "a.py", "bc"));
    }
}
