//! Runtime values and the operations that need no interpreter state.
//!
//! Containers and objects are reference-counted and interior-mutable so
//! aliasing behaves like Python (`a = b; a.append(1)` is visible through
//! `b`). Values are `!Send`: a module, its values and the oracle verifying
//! it stay on one thread.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::ast::{BinOp, FunctionDef};
use super::builtins::Builtin;
use super::error::{builtin_lineage, RtResult, RuntimeError};

/// Variables of one scope
pub type Namespace = HashMap<String, Value>;

/// Module globals, shared by every function defined in the module
pub type Globals = Rc<RefCell<Namespace>>;

/// A function's local scope, kept alive by closures defined inside it.
#[derive(Debug, Default)]
pub struct Env {
    /// Variables bound in this scope
    pub vars: RefCell<Namespace>,
    /// Enclosing function scope
    pub parent: Option<Rc<Env>>,
}

impl Env {
    /// Empty scope nested in `parent`
    pub fn new(parent: Option<Rc<Env>>) -> Self {
        Self {
            vars: RefCell::new(Namespace::new()),
            parent,
        }
    }

    /// Look a name up through the enclosing chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }
}

/// A user-defined function object.
pub struct Function {
    /// Shared definition
    pub def: Rc<FunctionDef>,
    /// Evaluated defaults, aligned with `def.params`
    pub defaults: Vec<Option<Value>>,
    /// Globals of the defining module
    pub globals: Weak<RefCell<Namespace>>,
    /// Scope of the enclosing function, if nested
    pub closure: Option<Rc<Env>>,
}

impl Function {
    /// Function name
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// A user-defined class.
pub struct Class {
    /// Class name
    pub name: String,
    /// Base classes defined in the same module
    pub bases: Vec<Rc<Class>>,
    /// Builtin exception type named directly as a base
    pub exception_base: Option<String>,
    /// Class attributes and methods
    pub attrs: RefCell<IndexMap<String, Value>>,
}

impl Class {
    /// Attribute lookup through the base chain (depth-first, left to right)
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(value.clone());
        }
        self.bases.iter().find_map(|base| base.lookup(name))
    }

    /// Builtin exception this class ultimately derives from
    pub fn exception_ancestor(&self) -> Option<String> {
        self.exception_base
            .clone()
            .or_else(|| self.bases.iter().find_map(|base| base.exception_ancestor()))
    }

    /// Class names an `except` clause may match, most specific first
    pub fn lineage(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for base in &self.bases {
            for name in base.lineage() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        if let Some(builtin) = &self.exception_base {
            for name in builtin_lineage(builtin) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// An instance of a user-defined class.
pub struct Instance {
    /// Class of the instance
    pub class: Rc<Class>,
    /// Instance attributes
    pub attrs: RefCell<IndexMap<String, Value>>,
}

/// An instance of a builtin exception type.
#[derive(Debug)]
pub struct ExceptionValue {
    /// Exception type name
    pub kind: String,
    /// Constructor arguments
    pub args: Vec<Value>,
}

impl ExceptionValue {
    /// `str(exc)`
    pub fn message(&self) -> String {
        exception_message(&self.args)
    }
}

/// `str()` of an exception built from `args`.
pub fn exception_message(args: &[Value]) -> String {
    match args {
        [] => String::new(),
        [single] => single.to_str(),
        many => Value::tuple(many.to_vec()).repr(),
    }
}

/// Which module an `import` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// The `math` module
    Math,
    /// Any other module; using it is unsupported
    Opaque,
}

/// An imported module.
#[derive(Debug)]
pub struct ModuleValue {
    /// Dotted module name
    pub name: String,
    /// Implementation
    pub kind: ModuleKind,
}

/// Method bound to a receiver.
pub struct BoundMethod {
    /// `self` (or the class, for class methods)
    pub receiver: Value,
    /// Underlying function
    pub function: Rc<Function>,
}

/// Method of a builtin type bound to a receiver (`xs.append`).
pub struct NativeMethod {
    /// Receiver
    pub receiver: Value,
    /// Method name
    pub name: String,
}

/// Insertion-ordered mapping with Python key equality (`1 == 1.0 == True`).
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    /// Empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| py_eq(k, key))
    }

    /// Value for a key
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.position(key).map(|i| self.entries[i].1.clone())
    }

    /// True if the key is present
    pub fn contains_key(&self, key: &Value) -> bool {
        self.position(key).is_some()
    }

    /// Insert or replace, keeping the original insertion slot
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Values in insertion order
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    /// `(key, value)` pairs in insertion order
    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    StaticMethod(Rc<Function>),
    ClassMethod(Rc<Function>),
    Property(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Builtin(Builtin),
    NativeMethod(Rc<NativeMethod>),
    Module(Rc<ModuleValue>),
    ExceptionType(Rc<str>),
    Exception(Rc<ExceptionValue>),
}

/// Numeric view of a value (`bool` counts as `int`).
#[derive(Debug, Clone, Copy)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

impl Value {
    /// String value
    pub fn str(text: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(text.as_ref()))
    }

    /// New list
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// New tuple
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    /// New dict
    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    /// Numeric view, if numeric
    pub fn as_num(&self) -> Option<Num> {
        match self {
            Self::Bool(b) => Some(Num::Int(i64::from(*b))),
            Self::Int(i) => Some(Num::Int(*i)),
            Self::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Integer view (`bool` included)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of any number
    pub fn as_f64(&self) -> Option<f64> {
        self.as_num().map(Num::as_f64)
    }

    /// Python type name
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Float(_) => "float".into(),
            Self::Str(_) => "str".into(),
            Self::List(_) => "list".into(),
            Self::Tuple(_) => "tuple".into(),
            Self::Dict(_) => "dict".into(),
            Self::Function(_) => "function".into(),
            Self::BoundMethod(_) => "method".into(),
            Self::StaticMethod(_) => "staticmethod".into(),
            Self::ClassMethod(_) => "classmethod".into(),
            Self::Property(_) => "property".into(),
            Self::Class(_) | Self::ExceptionType(_) => "type".into(),
            Self::Instance(instance) => instance.class.name.clone(),
            Self::Builtin(_) | Self::NativeMethod(_) => "builtin_function_or_method".into(),
            Self::Module(_) => "module".into(),
            Self::Exception(exc) => exc.kind.clone(),
        }
    }

    /// Python truthiness (user objects are always true)
    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(dict) => !dict.borrow().is_empty(),
            _ => true,
        }
    }

    /// Raise `TypeError` for values that cannot be dict keys
    pub fn check_hashable(&self) -> RtResult<()> {
        match self {
            Self::List(_) | Self::Dict(_) => Err(RuntimeError::type_error(format!(
                "unhashable type: '{}'",
                self.type_name()
            ))),
            Self::Tuple(items) => items.iter().try_for_each(Value::check_hashable),
            _ => Ok(()),
        }
    }

    /// `str(value)` without user `__str__` dispatch
    pub fn to_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::Exception(exc) => exc.message(),
            _ => self.repr(),
        }
    }

    /// `repr(value)` without user `__repr__` dispatch
    pub fn repr(&self) -> String {
        match self {
            Self::None => "None".into(),
            Self::Bool(true) => "True".into(),
            Self::Bool(false) => "False".into(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Str(s) => repr_str(s),
            Self::List(items) => format!("[{}]", join_repr(&items.borrow())),
            Self::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Self::Tuple(items) => format!("({})", join_repr(items)),
            Self::Dict(dict) => {
                let body: Vec<String> = dict
                    .borrow()
                    .items()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Self::Function(f) | Self::StaticMethod(f) | Self::ClassMethod(f) => {
                format!("<function {}>", f.name())
            }
            Self::Property(_) => "<property object>".into(),
            Self::BoundMethod(m) => format!("<bound method {}>", m.function.name()),
            Self::Class(class) => format!("<class '{}'>", class.name),
            Self::ExceptionType(name) => format!("<class '{name}'>"),
            Self::Instance(instance) => format!("<{} object>", instance.class.name),
            Self::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Self::NativeMethod(m) => format!("<built-in method {}>", m.name),
            Self::Module(module) => format!("<module '{}'>", module.name),
            Self::Exception(exc) => format!("{}({})", exc.kind, join_repr(&exc.args)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Format a float the way Python's `repr` does for common magnitudes.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{value:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }
    if value == value.trunc() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Python `==` for builtin values; user objects compare by identity.
pub fn py_eq(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        return match (a, b) {
            (Num::Int(x), Num::Int(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        };
    }
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())
        }
        (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.items()
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| py_eq(v, &other)))
        }
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => py_is(left, right),
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| py_eq(x, y))
}

/// Python `is`. Immutable scalars compare by value.
pub fn py_is(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => false,
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`. `Ok(None)` means unordered (NaN).
pub fn py_compare(left: &Value, right: &Value, symbol: &str) -> RtResult<Option<Ordering>> {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        return Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            _ => a.as_f64().partial_cmp(&b.as_f64()),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => seq_compare(&a.borrow(), &b.borrow(), symbol),
        (Value::Tuple(a), Value::Tuple(b)) => seq_compare(a, b, symbol),
        _ => Err(RuntimeError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn seq_compare(a: &[Value], b: &[Value], symbol: &str) -> RtResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if !py_eq(x, y) {
            return py_compare(x, y, symbol);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// `item in container` for builtin containers
pub fn py_contains(container: &Value, item: &Value) -> RtResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| py_eq(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| py_eq(v, item))),
        Value::Dict(dict) => {
            item.check_hashable()?;
            Ok(dict.borrow().contains_key(item))
        }
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

const MAX_REPEAT_LEN: usize = 1_000_000;

/// Binary operator on builtin values
pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> RtResult<Value> {
    if let (Some(a), Some(b)) = (left.as_num(), right.as_num()) {
        return numeric_op(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if count.as_int().is_some()
                && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            let times = usize::try_from(count.as_int().unwrap_or(0).max(0)).unwrap_or(0);
            repeat(seq, times)
        }
        (BinOp::Mod, Value::Str(_), _) => Err(RuntimeError::unsupported("%-formatting")),
        _ => Err(RuntimeError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn repeat(seq: &Value, times: usize) -> RtResult<Value> {
    let len = match seq {
        Value::Str(s) => s.len(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        _ => 0,
    };
    if len.saturating_mul(times) > MAX_REPEAT_LEN {
        return Err(RuntimeError::exception("MemoryError", ""));
    }
    Ok(match seq {
        Value::Str(s) => Value::str(s.repeat(times)),
        Value::List(items) => {
            let items = items.borrow();
            Value::list((0..times).flat_map(|_| items.iter().cloned()).collect())
        }
        Value::Tuple(items) => Value::tuple((0..times).flat_map(|_| items.iter().cloned()).collect()),
        other => other.clone(),
    })
}

fn numeric_op(op: BinOp, a: Num, b: Num) -> RtResult<Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
        _ => float_op(op, a.as_f64(), b.as_f64()),
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> RtResult<Value> {
    let checked = |value: Option<i64>| value.map(Value::Int).ok_or_else(RuntimeError::overflow);
    match op {
        BinOp::Add => checked(x.checked_add(y)),
        BinOp::Sub => checked(x.checked_sub(y)),
        BinOp::Mul => checked(x.checked_mul(y)),
        BinOp::Div => {
            if y == 0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let q = x.checked_div(y).ok_or_else(RuntimeError::overflow)?;
            let adjust = x % y != 0 && ((x < 0) != (y < 0));
            Ok(Value::Int(if adjust { q - 1 } else { q }))
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(RuntimeError::zero_division("integer modulo by zero"));
            }
            let r = x.checked_rem(y).unwrap_or(0);
            Ok(Value::Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }))
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(RuntimeError::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| RuntimeError::overflow())?;
            checked(x.checked_pow(exp))
        }
        BinOp::BitAnd => Ok(Value::Int(x & y)),
        BinOp::BitOr => Ok(Value::Int(x | y)),
        BinOp::BitXor => Ok(Value::Int(x ^ y)),
        BinOp::LShift => {
            if y < 0 {
                return Err(RuntimeError::value_error("negative shift count"));
            }
            if x == 0 {
                return Ok(Value::Int(0));
            }
            let shift = u32::try_from(y).map_err(|_| RuntimeError::overflow())?;
            let shifted = x.checked_shl(shift).ok_or_else(RuntimeError::overflow)?;
            if shifted >> shift != x {
                return Err(RuntimeError::overflow());
            }
            Ok(Value::Int(shifted))
        }
        BinOp::RShift => {
            if y < 0 {
                return Err(RuntimeError::value_error("negative shift count"));
            }
            Ok(Value::Int(if y >= 64 {
                if x < 0 {
                    -1
                } else {
                    0
                }
            } else {
                x >> y
            }))
        }
    }
}

fn float_op(op: BinOp, x: f64, y: f64) -> RtResult<Value> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(RuntimeError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(RuntimeError::unsupported("complex result of power"));
            }
            let result = x.powf(y);
            if result.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(RuntimeError::exception(
                    "OverflowError",
                    "(34, 'Numerical result out of range')",
                ));
            }
            result
        }
        _ => {
            return Err(RuntimeError::type_error(format!(
                "unsupported operand type(s) for {}: 'float' and 'float'",
                op.symbol()
            )))
        }
    };
    Ok(Value::Float(value))
}

/// Normalise a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Indices selected by a slice with Python semantics.
pub fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> RtResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }
    let len = i64::try_from(len).map_err(|_| RuntimeError::overflow())?;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };

    let mut indices = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| clamp(b, 0, len));
        let stop = upper.map_or(len, |b| clamp(b, 0, len));
        let mut i = start;
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
        let mut i = start;
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn floor_division_and_modulo_follow_python_signs() {
        assert!(py_eq(&binary_op(BinOp::FloorDiv, &int(7), &int(2)).unwrap(), &int(3)));
        assert!(py_eq(&binary_op(BinOp::FloorDiv, &int(-7), &int(2)).unwrap(), &int(-4)));
        assert!(py_eq(&binary_op(BinOp::Mod, &int(-7), &int(2)).unwrap(), &int(1)));
        assert!(py_eq(&binary_op(BinOp::Mod, &int(7), &int(-2)).unwrap(), &int(-1)));
    }

    #[test]
    fn division_by_zero_raises() {
        let err = binary_op(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.kind(), "ZeroDivisionError");
        let err = binary_op(BinOp::Mod, &Value::Float(1.0), &int(0)).unwrap_err();
        assert_eq!(err.kind(), "ZeroDivisionError");
    }

    #[test]
    fn int_overflow_raises_overflow_error() {
        let err = binary_op(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
    }

    #[test]
    fn mixed_numeric_equality() {
        assert!(py_eq(&int(1), &Value::Float(1.0)));
        assert!(py_eq(&Value::Bool(true), &int(1)));
        assert!(!py_eq(&Value::str("1"), &int(1)));
        assert!(!py_eq(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
    }

    #[test]
    fn sequences_compare_lexicographically() {
        let a = Value::list(vec![int(1), int(2)]);
        let b = Value::list(vec![int(1), int(3)]);
        assert_eq!(py_compare(&a, &b, "<").unwrap(), Some(Ordering::Less));
        assert!(py_compare(&int(1), &Value::str("x"), "<").is_err());
    }

    #[test]
    fn slices_match_python() {
        assert_eq!(slice_indices(5, None, None, Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(1), Some(-1), None).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice_indices(3, Some(0), Some(10), Some(2)).unwrap(), vec![0, 2]);
        assert!(slice_indices(3, None, None, Some(0)).is_err());
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
    }

    #[test]
    fn repr_formats() {
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::Float(0.5).repr(), "0.5");
        assert_eq!(Value::Float(1e-5).repr(), "1e-05");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::tuple(vec![int(1)]).repr(), "(1,)");
        let mut dict = Dict::new();
        dict.insert(Value::str("a"), int(1));
        assert_eq!(Value::dict(dict).repr(), "{'a': 1}");
    }

    #[test]
    fn dict_keys_use_python_equality() {
        let mut dict = Dict::new();
        dict.insert(int(1), Value::str("one"));
        dict.insert(Value::Float(1.0), Value::str("uno"));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Value::Bool(true)).unwrap().to_str(), "uno");
        assert!(Value::list(vec![]).check_hashable().is_err());
    }
}
