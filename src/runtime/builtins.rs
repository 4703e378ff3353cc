//! Builtin functions, methods of builtin types, and the `math` module.

use std::rc::Rc;

use super::ast::{BinOp, CmpOp};
use super::error::{RtResult, RuntimeError};
use super::interpreter::Interpreter;
use super::value::{binary_op, format_float, normalize_index, Class, Dict, Value};

/// A builtin callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Builtin {
    Len,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Range,
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Tuple,
    Round,
    All,
    Any,
    Enumerate,
    Zip,
    Print,
    Isinstance,
    Repr,
    Divmod,
    Pow,
    Chr,
    Ord,
    Map,
    Filter,
    Getattr,
    Setattr,
    Hasattr,
    StaticMethod,
    ClassMethod,
    Property,
    Object,
    MathSqrt,
    MathFloor,
    MathCeil,
    MathFabs,
    MathPow,
    MathLog,
    MathExp,
    MathIsclose,
    MathGcd,
    MathIsfinite,
    MathIsnan,
    MathTrunc,
}

const GLOBALS: &[(&str, Builtin)] = &[
    ("len", Builtin::Len),
    ("abs", Builtin::Abs),
    ("min", Builtin::Min),
    ("max", Builtin::Max),
    ("sum", Builtin::Sum),
    ("sorted", Builtin::Sorted),
    ("reversed", Builtin::Reversed),
    ("range", Builtin::Range),
    ("int", Builtin::Int),
    ("float", Builtin::Float),
    ("str", Builtin::Str),
    ("bool", Builtin::Bool),
    ("list", Builtin::List),
    ("dict", Builtin::Dict),
    ("tuple", Builtin::Tuple),
    ("round", Builtin::Round),
    ("all", Builtin::All),
    ("any", Builtin::Any),
    ("enumerate", Builtin::Enumerate),
    ("zip", Builtin::Zip),
    ("print", Builtin::Print),
    ("isinstance", Builtin::Isinstance),
    ("repr", Builtin::Repr),
    ("divmod", Builtin::Divmod),
    ("pow", Builtin::Pow),
    ("chr", Builtin::Chr),
    ("ord", Builtin::Ord),
    ("map", Builtin::Map),
    ("filter", Builtin::Filter),
    ("getattr", Builtin::Getattr),
    ("setattr", Builtin::Setattr),
    ("hasattr", Builtin::Hasattr),
    ("staticmethod", Builtin::StaticMethod),
    ("classmethod", Builtin::ClassMethod),
    ("property", Builtin::Property),
    ("object", Builtin::Object),
];

const MATH_FUNCTIONS: &[(&str, Builtin)] = &[
    ("sqrt", Builtin::MathSqrt),
    ("floor", Builtin::MathFloor),
    ("ceil", Builtin::MathCeil),
    ("fabs", Builtin::MathFabs),
    ("pow", Builtin::MathPow),
    ("log", Builtin::MathLog),
    ("exp", Builtin::MathExp),
    ("isclose", Builtin::MathIsclose),
    ("gcd", Builtin::MathGcd),
    ("isfinite", Builtin::MathIsfinite),
    ("isnan", Builtin::MathIsnan),
    ("trunc", Builtin::MathTrunc),
];

const MATH_CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("inf", f64::INFINITY),
    ("nan", f64::NAN),
];

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "find", "index", "count", "isdigit", "isalpha", "isalnum", "isupper", "islower",
    "isspace", "title", "capitalize",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "reverse", "sort", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "setdefault", "update", "copy", "clear",
];

impl Builtin {
    /// Every public name of the `math` module
    pub const MATH_NAMES: [&'static str; 17] = [
        "sqrt", "floor", "ceil", "fabs", "pow", "log", "exp", "isclose", "gcd", "isfinite",
        "isnan", "trunc", "pi", "e", "tau", "inf", "nan",
    ];

    /// Builtin bound to a global name
    pub fn from_name(name: &str) -> Option<Self> {
        GLOBALS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, builtin)| *builtin)
    }

    /// Attribute of the `math` module
    pub fn math_attr(name: &str) -> Option<Value> {
        if let Some((_, builtin)) = MATH_FUNCTIONS.iter().find(|(n, _)| *n == name) {
            return Some(Value::Builtin(*builtin));
        }
        MATH_CONSTANTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| Value::Float(*value))
    }

    /// Python-visible name
    pub fn name(self) -> &'static str {
        GLOBALS
            .iter()
            .chain(MATH_FUNCTIONS)
            .find(|(_, builtin)| *builtin == self)
            .map(|(name, _)| *name)
            .unwrap_or("builtin")
    }

    /// True if `value.name` is a method of a builtin type
    pub fn has_native_method(value: &Value, name: &str) -> bool {
        match value {
            Value::Str(_) => STR_METHODS.contains(&name),
            Value::List(_) => LIST_METHODS.contains(&name),
            Value::Dict(_) => DICT_METHODS.contains(&name),
            Value::Float(_) => name == "is_integer",
            _ => false,
        }
    }
}

type Kwargs = Vec<(String, Value)>;

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> RtResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else if args.len() < min {
            format!("at least {min}")
        } else {
            format!("at most {max}")
        };
        return Err(RuntimeError::type_error(format!(
            "{name}() takes {expected} argument{} ({} given)",
            if expected.ends_with(" 1") { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
    let position = kwargs.iter().position(|(name, _)| name == key)?;
    Some(kwargs.remove(position).1)
}

fn reject_kwargs(name: &str, kwargs: &Kwargs) -> RtResult<()> {
    match kwargs.first() {
        Some((key, _)) => Err(RuntimeError::type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

fn expect_int(name: &str, value: &Value) -> RtResult<i64> {
    value.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}() argument must be an integer, not '{}'",
            value.type_name()
        ))
    })
}

fn expect_f64(name: &str, value: &Value) -> RtResult<f64> {
    value.as_f64().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}() argument must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

fn expect_str<'a>(name: &str, value: &'a Value) -> RtResult<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::type_error(format!(
            "{name}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

/// Truncate a float to an int the way `int()` does
pub(crate) fn float_to_int(value: f64) -> RtResult<i64> {
    if value.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if value.is_infinite() {
        return Err(RuntimeError::exception(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(RuntimeError::overflow());
    }
    Ok(truncated as i64)
}

fn math_domain_error() -> RuntimeError {
    RuntimeError::value_error("math domain error")
}

fn class_derives(class: &Rc<Class>, target: &Rc<Class>) -> bool {
    Rc::ptr_eq(class, target) || class.bases.iter().any(|base| class_derives(base, target))
}

fn char_index(haystack: &str, byte_index: usize) -> i64 {
    haystack[..byte_index].chars().count() as i64
}

impl Interpreter {
    pub(crate) fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>, mut kwargs: Kwargs) -> RtResult<Value> {
        let name = builtin.name();
        match builtin {
            Builtin::Len => {
                reject_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let len = self.len_of(&args[0])?;
                Ok(Value::Int(len as i64))
            }
            Builtin::Abs => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    value => match value.as_int() {
                        Some(i) => i.checked_abs().map(Value::Int).ok_or_else(RuntimeError::overflow),
                        None => Err(RuntimeError::type_error(format!(
                            "bad operand type for abs(): '{}'",
                            value.type_name()
                        ))),
                    },
                }
            }
            Builtin::Min | Builtin::Max => self.min_max(builtin, args, kwargs),
            Builtin::Sum => {
                arity(name, &args, 1, 2)?;
                let start = take_kwarg(&mut kwargs, "start");
                reject_kwargs(name, &kwargs)?;
                let mut total = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
                if matches!(total, Value::Str(_)) {
                    return Err(RuntimeError::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                for item in self.iterate(&args[0])? {
                    total = self.binary(BinOp::Add, &total, &item)?;
                }
                Ok(total)
            }
            Builtin::Sorted => {
                arity(name, &args, 1, 1)?;
                let items = self.iterate(&args[0])?;
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
                reject_kwargs(name, &kwargs)?;
                Ok(Value::list(self.sort_values(items, key, reverse)?))
            }
            Builtin::Reversed => {
                arity(name, &args, 1, 1)?;
                let mut items = match &args[0] {
                    Value::Dict(_) => {
                        return Err(RuntimeError::type_error("'dict' object is not reversible"))
                    }
                    other => self.iterate(other)?,
                };
                items.reverse();
                Ok(Value::list(items))
            }
            Builtin::Range => {
                reject_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|a| {
                        a.as_int().ok_or_else(|| {
                            RuntimeError::type_error(format!(
                                "'{}' object cannot be interpreted as an integer",
                                a.type_name()
                            ))
                        })
                    })
                    .collect::<RtResult<Vec<i64>>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => unreachable!("arity checked"),
                };
                if step == 0 {
                    return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
                }
                let span = if step > 0 {
                    (stop as i128 - start as i128 + step as i128 - 1) / step as i128
                } else {
                    (start as i128 - stop as i128 - step as i128 - 1) / (-(step as i128))
                };
                let len = u64::try_from(span.max(0)).unwrap_or(u64::MAX);
                self.charge(len)?;
                let mut items = Vec::with_capacity(len as usize);
                let mut current = start;
                for _ in 0..len {
                    items.push(Value::Int(current));
                    current = current.wrapping_add(step);
                }
                Ok(Value::list(items))
            }
            Builtin::Int => {
                reject_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 2)?;
                match (args.first(), args.get(1)) {
                    (None, _) => Ok(Value::Int(0)),
                    (Some(Value::Str(text)), base) => {
                        let base = match base {
                            Some(b) => u32::try_from(expect_int(name, b)?)
                                .ok()
                                .filter(|b| (2..=36).contains(b))
                                .ok_or_else(|| {
                                    RuntimeError::value_error("int() base must be >= 2 and <= 36, or 0")
                                })?,
                            None => 10,
                        };
                        let cleaned = text.trim().replace('_', "");
                        i64::from_str_radix(&cleaned, base).map(Value::Int).map_err(|_| {
                            RuntimeError::value_error(format!(
                                "invalid literal for int() with base {base}: {}",
                                Value::str(text.as_ref()).repr()
                            ))
                        })
                    }
                    (Some(_), Some(_)) => Err(RuntimeError::type_error(
                        "int() can't convert non-string with explicit base",
                    )),
                    (Some(Value::Float(f)), None) => float_to_int(*f).map(Value::Int),
                    (Some(value), None) => value.as_int().map(Value::Int).ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "int() argument must be a string or a real number, not '{}'",
                            value.type_name()
                        ))
                    }),
                }
            }
            Builtin::Float => {
                reject_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Ok(Value::Float(0.0)),
                    Some(Value::Str(text)) => parse_float(text).map(Value::Float).ok_or_else(|| {
                        RuntimeError::value_error(format!(
                            "could not convert string to float: {}",
                            Value::str(text.as_ref()).repr()
                        ))
                    }),
                    Some(value) => expect_f64(name, value).map(Value::Float),
                }
            }
            Builtin::Str => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Ok(Value::str("")),
                    Some(value) => Ok(Value::str(self.str_of(value)?)),
                }
            }
            Builtin::Bool => {
                arity(name, &args, 0, 1)?;
                Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
            }
            Builtin::List => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Ok(Value::list(Vec::new())),
                    Some(value) => Ok(Value::list(self.iterate(value)?)),
                }
            }
            Builtin::Tuple => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Ok(Value::tuple(Vec::new())),
                    Some(value) => Ok(Value::tuple(self.iterate(value)?)),
                }
            }
            Builtin::Dict => {
                arity(name, &args, 0, 1)?;
                let mut dict = Dict::new();
                if let Some(source) = args.first() {
                    self.dict_update(&mut dict, source)?;
                }
                for (key, value) in kwargs {
                    dict.insert(Value::str(key), value);
                }
                Ok(Value::dict(dict))
            }
            Builtin::Round => {
                arity(name, &args, 1, 2)?;
                let digits = match args.get(1).or(take_kwarg(&mut kwargs, "ndigits").as_ref()) {
                    None | Some(Value::None) => None,
                    Some(value) => Some(expect_int(name, value)?),
                };
                match (&args[0], digits) {
                    (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
                    (Value::Float(f), Some(n)) => {
                        let factor = 10f64.powi(i32::try_from(n).unwrap_or(i32::MAX).min(300));
                        let rounded = (f * factor).round_ties_even() / factor;
                        Ok(Value::Float(if rounded.is_finite() { rounded } else { *f }))
                    }
                    (value, _) => value.as_int().map(Value::Int).ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "type {} doesn't define __round__ method",
                            value.type_name()
                        ))
                    }),
                }
            }
            Builtin::All | Builtin::Any => {
                arity(name, &args, 1, 1)?;
                let items = self.iterate(&args[0])?;
                let all = builtin == Builtin::All;
                let result = if all {
                    items.iter().all(Value::truthy)
                } else {
                    items.iter().any(Value::truthy)
                };
                Ok(Value::Bool(result))
            }
            Builtin::Enumerate => {
                arity(name, &args, 1, 2)?;
                let start = match args.get(1).cloned().or(take_kwarg(&mut kwargs, "start")) {
                    Some(value) => expect_int(name, &value)?,
                    None => 0,
                };
                let items = self.iterate(&args[0])?;
                let mut out = Vec::with_capacity(items.len());
                for (offset, item) in items.into_iter().enumerate() {
                    let index = start.checked_add(offset as i64).ok_or_else(RuntimeError::overflow)?;
                    out.push(Value::tuple(vec![Value::Int(index), item]));
                }
                Ok(Value::list(out))
            }
            Builtin::Zip => {
                reject_kwargs(name, &kwargs)?;
                let columns = args
                    .iter()
                    .map(|arg| self.iterate(arg))
                    .collect::<RtResult<Vec<_>>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let rows = (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|column| column[i].clone()).collect()))
                    .collect();
                Ok(Value::list(rows))
            }
            Builtin::Print => {
                for arg in &args {
                    self.str_of(arg)?;
                }
                Ok(Value::None)
            }
            Builtin::Isinstance => {
                arity(name, &args, 2, 2)?;
                self.isinstance(&args[0], &args[1]).map(Value::Bool)
            }
            Builtin::Repr => {
                arity(name, &args, 1, 1)?;
                Ok(Value::str(self.repr_of(&args[0])?))
            }
            Builtin::Divmod => {
                arity(name, &args, 2, 2)?;
                let quotient = binary_op(BinOp::FloorDiv, &args[0], &args[1])?;
                let remainder = binary_op(BinOp::Mod, &args[0], &args[1])?;
                Ok(Value::tuple(vec![quotient, remainder]))
            }
            Builtin::Pow => {
                arity(name, &args, 2, 3)?;
                match args.get(2) {
                    None => self.binary(BinOp::Pow, &args[0], &args[1]),
                    Some(modulus) => {
                        let base = expect_int(name, &args[0])?;
                        let exp = expect_int(name, &args[1])?;
                        let modulus = expect_int(name, modulus)?;
                        mod_pow(base, exp, modulus).map(Value::Int)
                    }
                }
            }
            Builtin::Chr => {
                arity(name, &args, 1, 1)?;
                let code = expect_int(name, &args[0])?;
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| Value::str(c.to_string()))
                    .ok_or_else(|| RuntimeError::value_error("chr() arg not in range(0x110000)"))
            }
            Builtin::Ord => {
                arity(name, &args, 1, 1)?;
                let text = expect_str(name, &args[0])?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                    _ => Err(RuntimeError::type_error(format!(
                        "ord() expected a character, but string of length {} found",
                        text.chars().count()
                    ))),
                }
            }
            Builtin::Map => {
                if args.len() < 2 {
                    return Err(RuntimeError::type_error("map() must have at least two arguments."));
                }
                let columns = args[1..]
                    .iter()
                    .map(|arg| self.iterate(arg))
                    .collect::<RtResult<Vec<_>>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    let row = columns.iter().map(|column| column[i].clone()).collect();
                    out.push(self.call(&args[0], row, Vec::new())?);
                }
                Ok(Value::list(out))
            }
            Builtin::Filter => {
                arity(name, &args, 2, 2)?;
                let mut out = Vec::new();
                for item in self.iterate(&args[1])? {
                    let keep = match &args[0] {
                        Value::None => item.truthy(),
                        predicate => self.call(predicate, vec![item.clone()], Vec::new())?.truthy(),
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }
            Builtin::Getattr => {
                arity(name, &args, 2, 3)?;
                let attr = expect_str(name, &args[1])?.to_string();
                match (self.get_attr(&args[0], &attr), args.get(2)) {
                    (Err(RuntimeError::Exception(exc)), Some(default)) if exc.matches("AttributeError") => {
                        Ok(default.clone())
                    }
                    (result, _) => result,
                }
            }
            Builtin::Hasattr => {
                arity(name, &args, 2, 2)?;
                let attr = expect_str(name, &args[1])?.to_string();
                match self.get_attr(&args[0], &attr) {
                    Ok(_) => Ok(Value::Bool(true)),
                    Err(RuntimeError::Exception(exc)) if exc.matches("AttributeError") => {
                        Ok(Value::Bool(false))
                    }
                    Err(err) => Err(err),
                }
            }
            Builtin::Setattr => {
                arity(name, &args, 3, 3)?;
                let attr = expect_str(name, &args[1])?.to_string();
                self.set_attr(&args[0], &attr, args[2].clone())?;
                Ok(Value::None)
            }
            Builtin::StaticMethod | Builtin::ClassMethod | Builtin::Property => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Function(function) => Ok(match builtin {
                        Builtin::StaticMethod => Value::StaticMethod(function.clone()),
                        Builtin::ClassMethod => Value::ClassMethod(function.clone()),
                        _ => Value::Property(function.clone()),
                    }),
                    other => Err(RuntimeError::unsupported(format!(
                        "{name}() applied to '{}'",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Object => Err(RuntimeError::unsupported("object()")),
            _ => {
                reject_kwargs(name, &kwargs)?;
                call_math(builtin, &args, &mut kwargs)
            }
        }
    }

    fn min_max(&mut self, builtin: Builtin, args: Vec<Value>, mut kwargs: Kwargs) -> RtResult<Value> {
        let name = builtin.name();
        let key = take_kwarg(&mut kwargs, "key");
        let default = take_kwarg(&mut kwargs, "default");
        reject_kwargs(name, &kwargs)?;
        let items = match args.len() {
            0 => {
                return Err(RuntimeError::type_error(format!(
                    "{name} expected at least 1 argument, got 0"
                )))
            }
            1 => self.iterate(&args[0])?,
            _ => args,
        };

        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let rank = match &key {
                Some(key) => self.call(key, vec![item.clone()], Vec::new())?,
                None => item.clone(),
            };
            let replace = match &best {
                None => true,
                Some((best_rank, _)) => {
                    let op = if builtin == Builtin::Min { CmpOp::Lt } else { CmpOp::Gt };
                    self.compare(op, &rank, best_rank)?
                }
            };
            if replace {
                best = Some((rank, item));
            }
        }
        match (best, default) {
            (Some((_, item)), _) => Ok(item),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(RuntimeError::value_error(format!(
                "{name}() arg is an empty sequence"
            ))),
        }
    }

    /// Stable sort that propagates comparison errors.
    fn sort_values(&mut self, items: Vec<Value>, key: Option<Value>, reverse: bool) -> RtResult<Vec<Value>> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let rank = match &key {
                Some(key) if !matches!(key, Value::None) => self.call(key, vec![item.clone()], Vec::new())?,
                _ => item.clone(),
            };
            keyed.push((rank, item));
        }
        self.charge(keyed.len() as u64)?;
        let sorted = self.merge_sort(keyed, reverse)?;
        Ok(sorted.into_iter().map(|(_, item)| item).collect())
    }

    fn merge_sort(&mut self, mut items: Vec<(Value, Value)>, reverse: bool) -> RtResult<Vec<(Value, Value)>> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items, reverse)?;
        let right = self.merge_sort(right, reverse)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
            let take_right = if reverse {
                self.compare(CmpOp::Lt, &l.0, &r.0)?
            } else {
                self.compare(CmpOp::Lt, &r.0, &l.0)?
            };
            let next = if take_right { right.next() } else { left.next() };
            merged.extend(next);
        }
        merged.extend(left);
        merged.extend(right);
        Ok(merged)
    }

    fn dict_update(&mut self, dict: &mut Dict, source: &Value) -> RtResult<()> {
        if let Value::Dict(other) = source {
            for (key, value) in other.borrow().items() {
                dict.insert(key, value);
            }
            return Ok(());
        }
        for pair in self.iterate(source)? {
            let items = self.iterate(&pair)?;
            match <[Value; 2]>::try_from(items) {
                Ok([key, value]) => {
                    key.check_hashable()?;
                    dict.insert(key, value);
                }
                Err(items) => {
                    return Err(RuntimeError::value_error(format!(
                        "dictionary update sequence element has length {}; 2 is required",
                        items.len()
                    )))
                }
            }
        }
        Ok(())
    }

    fn isinstance(&mut self, value: &Value, classinfo: &Value) -> RtResult<bool> {
        Ok(match classinfo {
            Value::Tuple(options) => {
                for option in options.iter() {
                    if self.isinstance(value, option)? {
                        return Ok(true);
                    }
                }
                false
            }
            Value::Builtin(Builtin::Object) => true,
            Value::Builtin(Builtin::Int) => matches!(value, Value::Int(_) | Value::Bool(_)),
            Value::Builtin(Builtin::Float) => matches!(value, Value::Float(_)),
            Value::Builtin(Builtin::Bool) => matches!(value, Value::Bool(_)),
            Value::Builtin(Builtin::Str) => matches!(value, Value::Str(_)),
            Value::Builtin(Builtin::List) => matches!(value, Value::List(_)),
            Value::Builtin(Builtin::Tuple) => matches!(value, Value::Tuple(_)),
            Value::Builtin(Builtin::Dict) => matches!(value, Value::Dict(_)),
            Value::Class(target) => match value {
                Value::Instance(instance) => class_derives(&instance.class, target),
                _ => false,
            },
            Value::ExceptionType(kind) => match value {
                Value::Exception(exc) => super::error::builtin_lineage(&exc.kind).iter().any(|k| k == kind.as_ref()),
                Value::Instance(instance) => instance.class.lineage().iter().any(|k| k == kind.as_ref()),
                _ => false,
            },
            other => {
                return Err(RuntimeError::type_error(format!(
                    "isinstance() arg 2 must be a type or tuple of types, not {}",
                    other.type_name()
                )))
            }
        })
    }

    pub(crate) fn call_native_method(&mut self, receiver: &Value, method: &str, args: Vec<Value>, mut kwargs: Kwargs) -> RtResult<Value> {
        match receiver {
            Value::Str(text) => {
                reject_kwargs(method, &kwargs)?;
                self.str_method(text, method, &args)
            }
            Value::List(_) => {
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
                reject_kwargs(method, &kwargs)?;
                self.list_method(receiver, method, args, key, reverse)
            }
            Value::Dict(dict) => self.dict_method(dict, method, args, kwargs),
            Value::Float(f) if method == "is_integer" => {
                arity(method, &args, 0, 0)?;
                Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
            }
            other => Err(RuntimeError::exception(
                "AttributeError",
                format!("'{}' object has no attribute '{method}'", other.type_name()),
            )),
        }
    }

    fn str_method(&mut self, text: &str, method: &str, args: &[Value]) -> RtResult<Value> {
        let strip_set = |args: &[Value]| -> RtResult<Option<Vec<char>>> {
            match args.first() {
                None | Some(Value::None) => Ok(None),
                Some(value) => Ok(Some(expect_str(method, value)?.chars().collect())),
            }
        };
        let predicate = |f: fn(char) -> bool| Value::Bool(!text.is_empty() && text.chars().all(f));

        match method {
            "upper" => Ok(Value::str(text.to_uppercase())),
            "lower" => Ok(Value::str(text.to_lowercase())),
            "strip" | "lstrip" | "rstrip" => {
                arity(method, args, 0, 1)?;
                let set = strip_set(args)?;
                let matches = |c: char| match &set {
                    Some(chars) => chars.contains(&c),
                    None => c.is_whitespace(),
                };
                Ok(Value::str(match method {
                    "strip" => text.trim_matches(matches),
                    "lstrip" => text.trim_start_matches(matches),
                    _ => text.trim_end_matches(matches),
                }))
            }
            "split" => {
                arity(method, args, 0, 2)?;
                let limit = match args.get(1) {
                    Some(value) => expect_int(method, value)?,
                    None => -1,
                };
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::None) => {
                        text.split_whitespace().map(Value::str).collect()
                    }
                    Some(sep) => {
                        let sep = expect_str(method, sep)?;
                        if sep.is_empty() {
                            return Err(RuntimeError::value_error("empty separator"));
                        }
                        if limit < 0 {
                            text.split(sep).map(Value::str).collect()
                        } else {
                            text.splitn(limit as usize + 1, sep).map(Value::str).collect()
                        }
                    }
                };
                Ok(Value::list(parts))
            }
            "join" => {
                arity(method, args, 1, 1)?;
                let mut pieces = Vec::new();
                for (i, item) in self.iterate(&args[0])?.into_iter().enumerate() {
                    match item {
                        Value::Str(s) => pieces.push(s.to_string()),
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "sequence item {i}: expected str instance, {} found",
                                other.type_name()
                            )))
                        }
                    }
                }
                Ok(Value::str(pieces.join(text)))
            }
            "replace" => {
                arity(method, args, 2, 3)?;
                let old = expect_str(method, &args[0])?;
                let new = expect_str(method, &args[1])?;
                Ok(Value::str(match args.get(2).map(|c| expect_int(method, c)).transpose()? {
                    Some(count) if count >= 0 => text.replacen(old, new, count as usize),
                    _ => text.replace(old, new),
                }))
            }
            "startswith" | "endswith" => {
                arity(method, args, 1, 1)?;
                let candidates = match &args[0] {
                    Value::Tuple(items) => items.iter().cloned().collect(),
                    other => vec![other.clone()],
                };
                for candidate in &candidates {
                    let affix = expect_str(method, candidate)?;
                    let hit = if method == "startswith" {
                        text.starts_with(affix)
                    } else {
                        text.ends_with(affix)
                    };
                    if hit {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "find" | "index" => {
                arity(method, args, 1, 1)?;
                let needle = expect_str(method, &args[0])?;
                match text.find(needle) {
                    Some(at) => Ok(Value::Int(char_index(text, at))),
                    None if method == "find" => Ok(Value::Int(-1)),
                    None => Err(RuntimeError::value_error("substring not found")),
                }
            }
            "count" => {
                arity(method, args, 1, 1)?;
                let needle = expect_str(method, &args[0])?;
                let count = if needle.is_empty() {
                    text.chars().count() + 1
                } else {
                    text.matches(needle).count()
                };
                Ok(Value::Int(count as i64))
            }
            "isdigit" => Ok(predicate(|c| c.is_ascii_digit())),
            "isalpha" => Ok(predicate(char::is_alphabetic)),
            "isalnum" => Ok(predicate(char::is_alphanumeric)),
            "isspace" => Ok(predicate(char::is_whitespace)),
            "isupper" | "islower" => {
                let cased: Vec<char> = text
                    .chars()
                    .filter(|c| c.is_uppercase() || c.is_lowercase())
                    .collect();
                let all = if method == "isupper" {
                    cased.iter().all(|c| c.is_uppercase())
                } else {
                    cased.iter().all(|c| c.is_lowercase())
                };
                Ok(Value::Bool(!cased.is_empty() && all))
            }
            "title" => {
                let mut out = String::with_capacity(text.len());
                let mut previous_cased = false;
                for c in text.chars() {
                    if previous_cased {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    previous_cased = c.is_alphabetic();
                }
                Ok(Value::str(out))
            }
            "capitalize" => {
                let mut chars = text.chars();
                let out = match chars.next() {
                    Some(first) => {
                        let rest = chars.as_str().to_lowercase();
                        first.to_uppercase().chain(rest.chars()).collect()
                    }
                    None => String::new(),
                };
                Ok(Value::str(out))
            }
            _ => Err(RuntimeError::exception(
                "AttributeError",
                format!("'str' object has no attribute '{method}'"),
            )),
        }
    }

    fn list_method(&mut self, receiver: &Value, method: &str, args: Vec<Value>, key: Option<Value>, reverse: bool) -> RtResult<Value> {
        let Value::List(list) = receiver else {
            return Err(RuntimeError::type_error("expected a list"));
        };
        match method {
            "append" => {
                arity(method, &args, 1, 1)?;
                list.borrow_mut().extend(args);
                Ok(Value::None)
            }
            "extend" => {
                arity(method, &args, 1, 1)?;
                let items = self.iterate(&args[0])?;
                list.borrow_mut().extend(items);
                Ok(Value::None)
            }
            "pop" => {
                arity(method, &args, 0, 1)?;
                let len = list.borrow().len();
                if len == 0 {
                    return Err(RuntimeError::exception("IndexError", "pop from empty list"));
                }
                let index = match args.first() {
                    Some(value) => expect_int(method, value)?,
                    None => -1,
                };
                let index = normalize_index(index, len)
                    .ok_or_else(|| RuntimeError::exception("IndexError", "pop index out of range"))?;
                Ok(list.borrow_mut().remove(index))
            }
            "insert" => {
                arity(method, &args, 2, 2)?;
                let len = list.borrow().len() as i64;
                let index = expect_int(method, &args[0])?;
                let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
                list.borrow_mut().insert(index as usize, args[1].clone());
                Ok(Value::None)
            }
            "remove" | "index" | "count" => {
                arity(method, &args, 1, 1)?;
                let snapshot = list.borrow().clone();
                let mut hits = Vec::new();
                for (i, item) in snapshot.iter().enumerate() {
                    if self.compare(CmpOp::Eq, item, &args[0])? {
                        hits.push(i);
                        if method != "count" {
                            break;
                        }
                    }
                }
                match (method, hits.first()) {
                    ("count", _) => Ok(Value::Int(hits.len() as i64)),
                    ("index", Some(i)) => Ok(Value::Int(*i as i64)),
                    ("remove", Some(i)) => {
                        list.borrow_mut().remove(*i);
                        Ok(Value::None)
                    }
                    ("index", None) => Err(RuntimeError::value_error(format!(
                        "{} is not in list",
                        args[0].repr()
                    ))),
                    _ => Err(RuntimeError::value_error("list.remove(x): x not in list")),
                }
            }
            "reverse" => {
                arity(method, &args, 0, 0)?;
                list.borrow_mut().reverse();
                Ok(Value::None)
            }
            "sort" => {
                arity(method, &args, 0, 0)?;
                let snapshot = list.borrow().clone();
                let sorted = self.sort_values(snapshot, key, reverse)?;
                *list.borrow_mut() = sorted;
                Ok(Value::None)
            }
            "copy" => {
                arity(method, &args, 0, 0)?;
                Ok(Value::list(list.borrow().clone()))
            }
            "clear" => {
                arity(method, &args, 0, 0)?;
                list.borrow_mut().clear();
                Ok(Value::None)
            }
            _ => Err(RuntimeError::exception(
                "AttributeError",
                format!("'list' object has no attribute '{method}'"),
            )),
        }
    }

    fn dict_method(
        &mut self,
        dict: &Rc<std::cell::RefCell<Dict>>,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> RtResult<Value> {
        if method != "update" {
            reject_kwargs(method, &kwargs)?;
        }
        if let Some(key) = args.first() {
            if matches!(method, "get" | "pop" | "setdefault") {
                key.check_hashable()?;
            }
        }
        match method {
            "get" => {
                arity(method, &args, 1, 2)?;
                let found = dict.borrow().get(&args[0]);
                Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
            }
            "keys" => Ok(Value::list(dict.borrow().keys())),
            "values" => Ok(Value::list(dict.borrow().values())),
            "items" => Ok(Value::list(
                dict.borrow()
                    .items()
                    .into_iter()
                    .map(|(k, v)| Value::tuple(vec![k, v]))
                    .collect(),
            )),
            "pop" => {
                arity(method, &args, 1, 2)?;
                let removed = dict.borrow_mut().remove(&args[0]);
                removed
                    .or_else(|| args.get(1).cloned())
                    .ok_or_else(|| RuntimeError::exception("KeyError", args[0].repr()))
            }
            "setdefault" => {
                arity(method, &args, 1, 2)?;
                let existing = dict.borrow().get(&args[0]);
                match existing {
                    Some(value) => Ok(value),
                    None => {
                        let value = args.get(1).cloned().unwrap_or(Value::None);
                        dict.borrow_mut().insert(args[0].clone(), value.clone());
                        Ok(value)
                    }
                }
            }
            "update" => {
                arity(method, &args, 0, 1)?;
                let mut updated = dict.borrow().clone();
                if let Some(source) = args.first() {
                    self.dict_update(&mut updated, source)?;
                }
                for (key, value) in kwargs {
                    updated.insert(Value::str(key), value);
                }
                *dict.borrow_mut() = updated;
                Ok(Value::None)
            }
            "copy" => Ok(Value::dict(dict.borrow().clone())),
            "clear" => {
                dict.borrow_mut().clear();
                Ok(Value::None)
            }
            _ => Err(RuntimeError::exception(
                "AttributeError",
                format!("'dict' object has no attribute '{method}'"),
            )),
        }
    }
}

fn call_math(builtin: Builtin, args: &[Value], kwargs: &mut Kwargs) -> RtResult<Value> {
    let name = builtin.name();
    let unary = |args: &[Value]| -> RtResult<f64> {
        arity(name, args, 1, 1)?;
        expect_f64(name, &args[0])
    };
    match builtin {
        Builtin::MathSqrt => {
            let x = unary(args)?;
            if x < 0.0 {
                return Err(math_domain_error());
            }
            Ok(Value::Float(x.sqrt()))
        }
        Builtin::MathFloor | Builtin::MathCeil | Builtin::MathTrunc => {
            arity(name, args, 1, 1)?;
            if let Some(i) = args[0].as_int() {
                return Ok(Value::Int(i));
            }
            let x = expect_f64(name, &args[0])?;
            let rounded = match builtin {
                Builtin::MathFloor => x.floor(),
                Builtin::MathCeil => x.ceil(),
                _ => x.trunc(),
            };
            float_to_int(rounded).map(Value::Int)
        }
        Builtin::MathFabs => unary(args).map(|x| Value::Float(x.abs())),
        Builtin::MathPow => {
            arity(name, args, 2, 2)?;
            let base = expect_f64(name, &args[0])?;
            let exp = expect_f64(name, &args[1])?;
            if base < 0.0 && exp.fract() != 0.0 {
                return Err(math_domain_error());
            }
            let result = base.powf(exp);
            if result.is_infinite() && base.is_finite() && exp.is_finite() {
                return Err(RuntimeError::exception("OverflowError", "math range error"));
            }
            Ok(Value::Float(result))
        }
        Builtin::MathLog => {
            arity(name, args, 1, 2)?;
            let x = expect_f64(name, &args[0])?;
            if x <= 0.0 {
                return Err(math_domain_error());
            }
            match args.get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(base) => {
                    let base = expect_f64(name, base)?;
                    if base <= 0.0 {
                        return Err(math_domain_error());
                    }
                    if base == 1.0 {
                        return Err(RuntimeError::zero_division("float division by zero"));
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        Builtin::MathExp => {
            let x = unary(args)?;
            let result = x.exp();
            if result.is_infinite() && x.is_finite() {
                return Err(RuntimeError::exception("OverflowError", "math range error"));
            }
            Ok(Value::Float(result))
        }
        Builtin::MathIsclose => {
            arity(name, args, 2, 2)?;
            let a = expect_f64(name, &args[0])?;
            let b = expect_f64(name, &args[1])?;
            let rel_tol = match take_kwarg(kwargs, "rel_tol") {
                Some(v) => expect_f64(name, &v)?,
                None => 1e-9,
            };
            let abs_tol = match take_kwarg(kwargs, "abs_tol") {
                Some(v) => expect_f64(name, &v)?,
                None => 0.0,
            };
            reject_kwargs(name, kwargs)?;
            if a == b {
                return Ok(Value::Bool(true));
            }
            let diff = (a - b).abs();
            Ok(Value::Bool(
                diff.is_finite() && (diff <= rel_tol * a.abs().max(b.abs()) || diff <= abs_tol),
            ))
        }
        Builtin::MathGcd => {
            let mut acc: i64 = 0;
            for arg in args {
                let mut other = expect_int(name, arg)?.checked_abs().ok_or_else(RuntimeError::overflow)?;
                let mut current = acc;
                while other != 0 {
                    let rem = current % other;
                    current = other;
                    other = rem;
                }
                acc = current;
            }
            Ok(Value::Int(acc))
        }
        Builtin::MathIsfinite => unary(args).map(|x| Value::Bool(x.is_finite())),
        Builtin::MathIsnan => unary(args).map(|x| Value::Bool(x.is_nan())),
        _ => Err(RuntimeError::unsupported(format!("builtin {name}"))),
    }
}

fn mod_pow(base: i64, exp: i64, modulus: i64) -> RtResult<i64> {
    if modulus == 0 {
        return Err(RuntimeError::value_error("pow() 3rd argument cannot be 0"));
    }
    if exp < 0 {
        return Err(RuntimeError::unsupported("pow() with negative exponent and modulus"));
    }
    let m = i128::from(modulus);
    let mut result: i128 = 1;
    let mut b = i128::from(base).rem_euclid(m);
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b).rem_euclid(m);
        }
        b = (b * b).rem_euclid(m);
        e >>= 1;
    }
    // Python gives the result the sign of the modulus
    let result = if modulus < 0 && result > 0 { result + m } else { result };
    i64::try_from(result).map_err(|_| RuntimeError::overflow())
}

fn parse_float(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace('_', "");
    match cleaned.to_ascii_lowercase().trim_start_matches(['+', '-']) {
        "inf" | "infinity" | "nan" => {
            let magnitude = if cleaned.to_ascii_lowercase().contains("nan") {
                f64::NAN
            } else {
                f64::INFINITY
            };
            Some(if cleaned.starts_with('-') { -magnitude } else { magnitude })
        }
        _ => cleaned.parse().ok(),
    }
}

struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: Option<char>,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Option<FormatSpec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut parsed = FormatSpec {
        fill: ' ',
        align: None,
        sign: None,
        width: 0,
        grouping: None,
        precision: None,
        kind: None,
    };
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = chars[0];
        parsed.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            parsed.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'0') && parsed.align.is_none() {
        parsed.fill = '0';
        parsed.align = Some('=');
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        parsed.width = chars[start..i].iter().collect::<String>().parse().ok()?;
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            parsed.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        parsed.precision = Some(chars[start..i].iter().collect::<String>().parse().ok()?);
    }
    if let Some(&c) = chars.get(i) {
        parsed.kind = Some(c);
        i += 1;
    }
    (i == chars.len()).then_some(parsed)
}

fn group_digits(digits: &str, separator: char) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(dot) => digits.split_at(dot),
        None => (digits, ""),
    };
    let mut out = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out.push_str(rest);
    out
}

fn exponent_form(value: f64, precision: usize) -> String {
    let raw = format!("{value:.precision$e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => raw,
    }
}

fn general_form(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return format_float(value);
    }
    let precision = precision.max(1);
    let exp = if value == 0.0 {
        0
    } else {
        value.abs().log10().floor() as i32
    };
    let text = if exp < -4 || exp >= precision as i32 {
        exponent_form(value, precision - 1)
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        format!("{value:.decimals$}")
    };
    match text.split_once('e') {
        Some((mantissa, exp)) if mantissa.contains('.') => {
            format!("{}e{exp}", mantissa.trim_end_matches('0').trim_end_matches('.'))
        }
        None if text.contains('.') => text.trim_end_matches('0').trim_end_matches('.').to_string(),
        _ => text,
    }
}

/// Render `value` with a format spec (`f"{x:.2f}"`, `format(x, ">8")`)
pub fn format_with_spec(value: &Value, spec: &str) -> RtResult<String> {
    let unsupported = || RuntimeError::unsupported(format!("format spec '{spec}'"));
    let parsed = parse_spec(spec).ok_or_else(unsupported)?;
    let wrong_type = |code: char| {
        RuntimeError::value_error(format!(
            "Unknown format code '{code}' for object of type '{}'",
            value.type_name()
        ))
    };

    let numeric = value.as_num().is_some();
    let (negative, body) = match (parsed.kind, value) {
        (Some('s') | None, Value::Str(s)) => {
            let text = match parsed.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            (false, text)
        }
        (Some('s'), _) => return Err(wrong_type('s')),
        (Some(code @ ('d' | 'x' | 'o' | 'b')), v) => {
            let Some(i) = v.as_int() else {
                return Err(wrong_type(code));
            };
            let magnitude = i.unsigned_abs();
            let text = match code {
                'x' => format!("{magnitude:x}"),
                'o' => format!("{magnitude:o}"),
                'b' => format!("{magnitude:b}"),
                _ => magnitude.to_string(),
            };
            (i < 0, text)
        }
        (Some(code @ ('f' | 'F' | 'e' | 'E' | '%' | 'g' | 'G')), v) => {
            let Some(x) = v.as_f64() else {
                return Err(wrong_type(code));
            };
            let precision = parsed.precision.unwrap_or(6);
            let magnitude = x.abs();
            let text = match code {
                'f' | 'F' => format!("{magnitude:.precision$}"),
                'e' | 'E' => exponent_form(magnitude, precision),
                '%' => format!("{:.precision$}%", magnitude * 100.0),
                _ => general_form(magnitude, precision),
            };
            let text = if code.is_ascii_uppercase() { text.to_uppercase() } else { text };
            (x.is_sign_negative() && !x.is_nan(), text)
        }
        (None, v) if numeric => match (v, parsed.precision) {
            (Value::Float(x), Some(p)) => (x.is_sign_negative(), general_form(x.abs(), p)),
            (Value::Float(x), None) => (x.is_sign_negative(), format_float(x.abs())),
            (v, _) => {
                let i = v.as_int().unwrap_or(0);
                (i < 0, i.unsigned_abs().to_string())
            }
        },
        (None, v) => (false, v.to_str()),
        _ => return Err(unsupported()),
    };

    let body = match parsed.grouping {
        Some(separator) if numeric => group_digits(&body, separator),
        _ => body,
    };
    let sign = match (negative, parsed.sign) {
        (true, _) => "-",
        (false, Some('+')) if numeric => "+",
        (false, Some(' ')) if numeric => " ",
        _ => "",
    };

    let len = sign.chars().count() + body.chars().count();
    let pad = parsed.width.saturating_sub(len);
    let fill = |n: usize| std::iter::repeat(parsed.fill).take(n).collect::<String>();
    let default_align = if numeric { '>' } else { '<' };
    Ok(match parsed.align.unwrap_or(default_align) {
        '<' => format!("{sign}{body}{}", fill(pad)),
        '^' => format!("{}{sign}{body}{}", fill(pad / 2), fill(pad - pad / 2)),
        '=' => format!("{sign}{}{body}", fill(pad)),
        _ => format!("{}{sign}{body}", fill(pad)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_round_trip() {
        assert_eq!(Builtin::from_name("len"), Some(Builtin::Len));
        assert_eq!(Builtin::Len.name(), "len");
        assert_eq!(Builtin::MathSqrt.name(), "sqrt");
        assert_eq!(Builtin::from_name("open"), None);
    }

    #[test]
    fn math_attributes_resolve() {
        assert!(matches!(Builtin::math_attr("sqrt"), Some(Value::Builtin(Builtin::MathSqrt))));
        assert!(matches!(Builtin::math_attr("pi"), Some(Value::Float(f)) if (f - std::f64::consts::PI).abs() < 1e-12));
        assert!(Builtin::math_attr("tan").is_none());
        for name in Builtin::MATH_NAMES {
            assert!(Builtin::math_attr(name).is_some(), "{name}");
        }
    }

    #[test]
    fn format_spec_covers_common_forms() {
        assert_eq!(format_with_spec(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_with_spec(&Value::Int(42), ">5").unwrap(), "   42");
        assert_eq!(format_with_spec(&Value::Int(-42), "05d").unwrap(), "-0042");
        assert_eq!(format_with_spec(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_with_spec(&Value::str("ab"), "<4").unwrap(), "ab  ");
        assert_eq!(format_with_spec(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_with_spec(&Value::Float(0.25), ".0%").unwrap(), "25%");
        assert_eq!(format_with_spec(&Value::Int(255), "x").unwrap(), "ff");
        assert_eq!(format_with_spec(&Value::Float(12345.678), ".3g").unwrap(), "1.23e+04");
        assert!(format_with_spec(&Value::str("x"), "d").is_err());
    }

    #[test]
    fn float_conversion_guards() {
        assert_eq!(float_to_int(-2.7).unwrap(), -2);
        assert!(float_to_int(f64::NAN).is_err());
        assert!(float_to_int(f64::INFINITY).is_err());
        assert_eq!(parse_float(" -inf ").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parse_float("1_000.5").unwrap(), 1000.5);
        assert!(parse_float("abc").is_none());
    }

    #[test]
    fn modular_power_follows_modulus_sign() {
        assert_eq!(mod_pow(3, 4, 5).unwrap(), 1);
        assert_eq!(mod_pow(2, 10, 1000).unwrap(), 24);
        assert_eq!(mod_pow(3, 3, -4).unwrap(), -1);
    }
}
