//! Tree-walking evaluator for the supported Python subset.
//!
//! Every executed statement and loop iteration is charged against a step
//! budget; nested calls are bounded by a depth limit that raises
//! `RecursionError`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, Expr, FStringPart, FunctionDef, Literal, Stmt, Target,
    UnaryOp,
};
use super::builtins::{format_with_spec, Builtin};
use super::error::{is_builtin_exception, PyException, RtResult, RuntimeError};
use super::value::{
    binary_op, exception_message, normalize_index, py_compare, py_contains, py_eq, py_is,
    slice_indices, BoundMethod, Class, Dict, Env, ExceptionValue, Function, Globals, Instance,
    ModuleKind, ModuleValue, Namespace, NativeMethod, Value,
};
use crate::core::config::OracleConfig;

/// Resource limits for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Statements and loop iterations allowed
    pub step_budget: u64,
    /// Deepest allowed call nesting
    pub max_call_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            step_budget: 100_000,
            max_call_depth: 64,
        }
    }
}

impl From<&OracleConfig> for ExecutionLimits {
    fn from(config: &OracleConfig) -> Self {
        Self {
            step_budget: config.step_budget,
            max_call_depth: config.max_call_depth,
        }
    }
}

/// Control flow out of a block.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Name resolution context for executing a block.
struct Frame {
    /// `None` at module level, where names live in `globals`
    locals: Option<Rc<Env>>,
    globals: Globals,
    /// Scope captured by functions defined in this frame
    capture: Option<Rc<Env>>,
    global_names: RefCell<HashSet<String>>,
}

impl Frame {
    fn module(globals: Globals) -> Self {
        Self {
            locals: None,
            globals,
            capture: None,
            global_names: RefCell::default(),
        }
    }

    fn function(env: Rc<Env>, globals: Globals) -> Self {
        Self {
            locals: Some(env.clone()),
            globals,
            capture: Some(env),
            global_names: RefCell::default(),
        }
    }

    fn nested(&self, env: Rc<Env>, capture: Option<Rc<Env>>) -> Self {
        Self {
            locals: Some(env),
            globals: self.globals.clone(),
            capture,
            global_names: RefCell::default(),
        }
    }
}

enum CompOutput<'a> {
    List {
        element: &'a Expr,
        items: Vec<Value>,
    },
    Dict {
        key: &'a Expr,
        value: &'a Expr,
        dict: Dict,
    },
}

/// Executes lowered code. Cheap to create; one per module load or oracle run.
pub struct Interpreter {
    limits: ExecutionLimits,
    steps: u64,
    depth: usize,
    handling: Vec<PyException>,
}

impl Interpreter {
    /// Create an interpreter with the given limits
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            steps: 0,
            depth: 0,
            handling: Vec::new(),
        }
    }

    /// Limits in force
    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Statements executed since the last reset
    pub fn steps_used(&self) -> u64 {
        self.steps
    }

    /// Start a fresh budget for the next invocation
    pub fn reset_budget(&mut self) {
        self.steps = 0;
        self.depth = 0;
        self.handling.clear();
    }

    pub(crate) fn tick(&mut self) -> RtResult<()> {
        self.charge(1)
    }

    pub(crate) fn charge(&mut self, steps: u64) -> RtResult<()> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.limits.step_budget {
            return Err(RuntimeError::BudgetExhausted {
                limit: self.limits.step_budget,
            });
        }
        Ok(())
    }

    /// Execute a module body against `globals`
    pub fn exec_module(&mut self, body: &[Stmt], globals: &Globals) -> RtResult<()> {
        let frame = Frame::module(globals.clone());
        self.exec_block(body, &frame).map(|_| ())
    }

    /// Evaluate an expression with only `bindings` (plus builtins) in scope
    pub fn eval_sandboxed(&mut self, expr: &Expr, bindings: &Namespace) -> RtResult<Value> {
        let env = Rc::new(Env::new(None));
        env.vars
            .borrow_mut()
            .extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        let frame = Frame::function(env, Globals::default());
        self.eval(expr, &frame)
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], frame: &Frame) -> RtResult<Flow> {
        for stmt in body {
            self.tick()?;
            match self.exec_stmt(stmt, frame)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &Frame) -> RtResult<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value, frame)?;
                for target in targets {
                    self.assign(target, value.clone(), frame)?;
                }
            }
            Stmt::AugAssign { target, op, value } => self.exec_aug_assign(target, *op, value, frame)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If { test, body, orelse } => {
                let branch = if self.eval(test, frame)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, frame);
            }
            Stmt::While { test, body, orelse } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, frame)?.truthy() {
                        break;
                    }
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, frame)?;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    self.assign(target, item, frame)?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Pass => {}
            Stmt::Raise(None) => {
                let active = self.handling.last().cloned().ok_or_else(|| {
                    RuntimeError::exception("RuntimeError", "No active exception to reraise")
                })?;
                return Err(RuntimeError::Exception(active));
            }
            Stmt::Raise(Some(expr)) => {
                let value = self.eval(expr, frame)?;
                let exception = self.to_exception(value)?;
                return Err(RuntimeError::Exception(exception));
            }
            Stmt::Assert { test, msg } => {
                if !self.eval(test, frame)?.truthy() {
                    let message = match msg {
                        Some(msg) => {
                            let value = self.eval(msg, frame)?;
                            self.str_of(&value)?
                        }
                        None => String::new(),
                    };
                    return Err(RuntimeError::exception("AssertionError", message));
                }
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, frame),
            Stmt::Import(modules) => {
                for (module, bound) in modules {
                    self.store_name(frame, bound, module_value(module));
                }
            }
            Stmt::ImportFrom { module, names } => self.exec_import_from(module, names, frame)?,
            Stmt::FunctionDef { def, decorators } => {
                let mut function = Value::Function(self.make_function(def, frame)?);
                for decorator in decorators.iter().rev() {
                    let decorator = self.eval(decorator, frame)?;
                    function = self.call(&decorator, vec![function], Vec::new())?;
                }
                self.store_name(frame, &def.name, function);
            }
            Stmt::ClassDef {
                name,
                bases,
                body,
                decorators,
            } => {
                let mut class = self.make_class(name, bases, body, frame)?;
                for decorator in decorators.iter().rev() {
                    let decorator = self.eval(decorator, frame)?;
                    class = self.call(&decorator, vec![class], Vec::new())?;
                }
                self.store_name(frame, name, class);
            }
            Stmt::Global(names) => {
                frame.global_names.borrow_mut().extend(names.iter().cloned());
            }
            Stmt::Delete(targets) => {
                for target in targets {
                    self.delete(target, frame)?;
                }
            }
            Stmt::Unsupported { what, line } => {
                return Err(RuntimeError::unsupported(format!("{what} (line {line})")));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr, frame: &Frame) -> RtResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name, frame)?;
                let rhs = self.eval(value, frame)?;
                let updated = self.inplace_op(op, current, &rhs)?;
                self.store_name(frame, name, updated);
            }
            Target::Attribute(object, attr) => {
                let object = self.eval(object, frame)?;
                let current = self.get_attr(&object, attr)?;
                let rhs = self.eval(value, frame)?;
                let updated = self.inplace_op(op, current, &rhs)?;
                self.set_attr(&object, attr, updated)?;
            }
            Target::Subscript(object, index) => {
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                let current = self.get_item(&object, &index)?;
                let rhs = self.eval(value, frame)?;
                let updated = self.inplace_op(op, current, &rhs)?;
                self.set_item(&object, index, updated)?;
            }
            Target::Sequence(_) => {
                return Err(RuntimeError::exception(
                    "SyntaxError",
                    "illegal expression for augmented assignment",
                ))
            }
            Target::Unsupported(what) => return Err(RuntimeError::unsupported(what.clone())),
        }
        Ok(())
    }

    /// `+=` on a list extends it in place; everything else rebinds.
    fn inplace_op(&mut self, op: BinOp, current: Value, rhs: &Value) -> RtResult<Value> {
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let extra = self.iterate(rhs)?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        self.binary(op, &current, rhs)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[super::ast::ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        frame: &Frame,
    ) -> RtResult<Flow> {
        let outcome = match self.exec_block(body, frame) {
            Err(RuntimeError::Exception(exception)) => {
                let mut chosen = None;
                for handler in handlers {
                    let matches = match &handler.kind {
                        None => true,
                        Some(kind) => {
                            let kind = self.eval(kind, frame)?;
                            exception_matches(&exception, &kind)?
                        }
                    };
                    if matches {
                        chosen = Some(handler);
                        break;
                    }
                }
                match chosen {
                    Some(handler) => {
                        if let Some(name) = &handler.name {
                            self.store_name(frame, name, exception_value(&exception));
                        }
                        self.handling.push(exception);
                        let result = self.exec_block(&handler.body, frame);
                        self.handling.pop();
                        result
                    }
                    None => Err(RuntimeError::Exception(exception)),
                }
            }
            Ok(Flow::Normal) => self.exec_block(orelse, frame),
            other => other,
        };

        if finalbody.is_empty() {
            return outcome;
        }
        if let Err(err) = &outcome {
            if !matches!(err, RuntimeError::Exception(_)) {
                return outcome;
            }
        }
        match self.exec_block(finalbody, frame)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn exec_import_from(&mut self, module: &str, names: &[(String, String)], frame: &Frame) -> RtResult<()> {
        if module == "__future__" {
            return Ok(());
        }
        let source = module_value(module);
        let is_math = matches!(&source, Value::Module(m) if m.kind == ModuleKind::Math);
        for (name, bound) in names {
            if name == "*" {
                if !is_math {
                    return Err(RuntimeError::unsupported(format!("from {module} import *")));
                }
                for attr in Builtin::MATH_NAMES {
                    let value = self.get_attr(&source, attr)?;
                    self.store_name(frame, attr, value);
                }
                continue;
            }
            let value = if is_math {
                self.get_attr(&source, name)?
            } else {
                Value::Module(Rc::new(ModuleValue {
                    name: format!("{module}.{name}"),
                    kind: ModuleKind::Opaque,
                }))
            };
            self.store_name(frame, bound, value);
        }
        Ok(())
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>, frame: &Frame) -> RtResult<Rc<Function>> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, frame)?),
                None => None,
            });
        }
        Ok(Rc::new(Function {
            def: def.clone(),
            defaults,
            globals: Rc::downgrade(&frame.globals),
            closure: frame.capture.clone(),
        }))
    }

    fn make_class(&mut self, name: &str, bases: &[Expr], body: &[Stmt], frame: &Frame) -> RtResult<Value> {
        let mut base_classes = Vec::new();
        let mut exception_base = None;
        for base in bases {
            match self.eval(base, frame)? {
                Value::Class(class) => base_classes.push(class),
                Value::ExceptionType(kind) => exception_base = Some(kind.to_string()),
                Value::Builtin(Builtin::Object) => {}
                other => {
                    return Err(RuntimeError::unsupported(format!(
                        "class base of type '{}'",
                        other.type_name()
                    )))
                }
            }
        }

        let env = Rc::new(Env::new(frame.capture.clone()));
        let class_frame = frame.nested(env.clone(), frame.capture.clone());
        self.exec_block(body, &class_frame)?;

        let mut attrs: Vec<(String, Value)> = env.vars.borrow_mut().drain().collect();
        attrs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Value::Class(Rc::new(Class {
            name: name.to_string(),
            bases: base_classes,
            exception_base,
            attrs: RefCell::new(attrs.into_iter().collect::<IndexMap<_, _>>()),
        })))
    }

    fn assign(&mut self, target: &Target, value: Value, frame: &Frame) -> RtResult<()> {
        match target {
            Target::Name(name) => {
                self.store_name(frame, name, value);
                Ok(())
            }
            Target::Attribute(object, attr) => {
                let object = self.eval(object, frame)?;
                self.set_attr(&object, attr, value)
            }
            Target::Subscript(object, index) => {
                if matches!(index, Expr::Slice { .. }) {
                    return Err(RuntimeError::unsupported("slice assignment"));
                }
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                self.set_item(&object, index, value)
            }
            Target::Sequence(targets) => {
                let items = self.iterate(&value)?;
                if items.len() != targets.len() {
                    let message = if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    };
                    return Err(RuntimeError::value_error(message));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, frame)?;
                }
                Ok(())
            }
            Target::Unsupported(what) => Err(RuntimeError::unsupported(what.clone())),
        }
    }

    fn delete(&mut self, target: &Target, frame: &Frame) -> RtResult<()> {
        match target {
            Target::Name(name) => {
                let removed = match &frame.locals {
                    Some(env) if !frame.global_names.borrow().contains(name) => {
                        env.vars.borrow_mut().remove(name)
                    }
                    _ => frame.globals.borrow_mut().remove(name),
                };
                removed
                    .map(|_| ())
                    .ok_or_else(|| name_error(name))
            }
            Target::Subscript(object, index) => {
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                match &object {
                    Value::List(items) => {
                        let i = index.as_int().ok_or_else(|| {
                            RuntimeError::type_error("list indices must be integers or slices")
                        })?;
                        let len = items.borrow().len();
                        let i = normalize_index(i, len).ok_or_else(|| {
                            RuntimeError::exception("IndexError", "list assignment index out of range")
                        })?;
                        items.borrow_mut().remove(i);
                        Ok(())
                    }
                    Value::Dict(dict) => {
                        index.check_hashable()?;
                        dict.borrow_mut()
                            .remove(&index)
                            .map(|_| ())
                            .ok_or_else(|| RuntimeError::exception("KeyError", index.repr()))
                    }
                    other => Err(RuntimeError::type_error(format!(
                        "'{}' object doesn't support item deletion",
                        other.type_name()
                    ))),
                }
            }
            Target::Attribute(object, attr) => {
                let object = self.eval(object, frame)?;
                let removed = match &object {
                    Value::Instance(instance) => instance.attrs.borrow_mut().shift_remove(attr),
                    _ => None,
                };
                removed
                    .map(|_| ())
                    .ok_or_else(|| attribute_error(&object, attr))
            }
            Target::Sequence(targets) => targets.iter().try_for_each(|t| self.delete(t, frame)),
            Target::Unsupported(what) => Err(RuntimeError::unsupported(what.clone())),
        }
    }

    // ------------------------------------------------------------------
    // names
    // ------------------------------------------------------------------

    fn lookup(&self, name: &str, frame: &Frame) -> RtResult<Value> {
        if !frame.global_names.borrow().contains(name) {
            if let Some(value) = frame.locals.as_ref().and_then(|env| env.lookup(name)) {
                return Ok(value);
            }
        }
        if let Some(value) = frame.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        builtin_value(name).ok_or_else(|| name_error(name))
    }

    fn store_name(&self, frame: &Frame, name: &str, value: Value) {
        match &frame.locals {
            Some(env) if !frame.global_names.borrow().contains(name) => {
                env.vars.borrow_mut().insert(name.to_string(), value);
            }
            _ => {
                frame.globals.borrow_mut().insert(name.to_string(), value);
            }
        }
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr, frame: &Frame) -> RtResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Name(name) => self.lookup(name, frame),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Text(text) => out.push_str(text),
                        FStringPart::Value { expr, format_spec } => {
                            let value = self.eval(expr, frame)?;
                            let text = match format_spec {
                                Some(spec) if !spec.is_empty() => format_with_spec(&value, spec)?,
                                _ => self.str_of(&value)?,
                            };
                            out.push_str(&text);
                        }
                    }
                }
                Ok(Value::str(out))
            }
            Expr::List(items) => Ok(Value::list(self.eval_all(items, frame)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items, frame)?)),
            Expr::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval(key, frame)?;
                    key.check_hashable()?;
                    let value = self.eval(value, frame)?;
                    dict.insert(key, value);
                }
                Ok(Value::dict(dict))
            }
            Expr::Attribute(object, attr) => {
                let object = self.eval(object, frame)?;
                self.get_attr(&object, attr)
            }
            Expr::Subscript(object, index) => {
                let object = self.eval(object, frame)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let lower = self.eval_slice_bound(lower.as_deref(), frame)?;
                    let upper = self.eval_slice_bound(upper.as_deref(), frame)?;
                    let step = self.eval_slice_bound(step.as_deref(), frame)?;
                    return get_slice(&object, lower, upper, step);
                }
                let index = self.eval(index, frame)?;
                self.get_item(&object, &index)
            }
            Expr::Slice { .. } => Err(RuntimeError::unsupported("slice outside subscript")),
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func, frame)?;
                let args = self.eval_all(args, frame)?;
                let mut evaluated = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    evaluated.push((name.clone(), self.eval(value, frame)?));
                }
                self.call(&callee, args, evaluated)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, frame)?;
                self.unary(*op, &value)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                self.binary(*op, &left, &right)
            }
            Expr::Bool(op, left, right) => {
                let left = self.eval(left, frame)?;
                match (op, left.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right, frame),
                }
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first, frame)?;
                for (op, right) in rest {
                    let right = self.eval(right, frame)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, frame)?.truthy() {
                    self.eval(body, frame)
                } else {
                    self.eval(orelse, frame)
                }
            }
            Expr::ListComp {
                element,
                generators,
            } => {
                let mut output = CompOutput::List {
                    element,
                    items: Vec::new(),
                };
                self.run_comprehension(generators, frame, &mut output)?;
                match output {
                    CompOutput::List { items, .. } => Ok(Value::list(items)),
                    CompOutput::Dict { dict, .. } => Ok(Value::dict(dict)),
                }
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let mut output = CompOutput::Dict {
                    key,
                    value,
                    dict: Dict::new(),
                };
                self.run_comprehension(generators, frame, &mut output)?;
                match output {
                    CompOutput::Dict { dict, .. } => Ok(Value::dict(dict)),
                    CompOutput::List { items, .. } => Ok(Value::list(items)),
                }
            }
            Expr::Lambda(def) => Ok(Value::Function(self.make_function(def, frame)?)),
            Expr::Unsupported(what) => Err(RuntimeError::unsupported(what.clone())),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], frame: &Frame) -> RtResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr, frame)).collect()
    }

    fn eval_slice_bound(&mut self, expr: Option<&Expr>, frame: &Frame) -> RtResult<Option<i64>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match self.eval(expr, frame)? {
            Value::None => Ok(None),
            value => value.as_int().map(Some).ok_or_else(|| {
                RuntimeError::type_error(
                    "slice indices must be integers or None or have an __index__ method",
                )
            }),
        }
    }

    fn run_comprehension(
        &mut self,
        generators: &[Comprehension],
        frame: &Frame,
        output: &mut CompOutput<'_>,
    ) -> RtResult<()> {
        let scope = Rc::new(Env::new(frame.locals.clone()));
        let comp_frame = frame.nested(scope.clone(), Some(scope));
        self.comprehension_level(generators, &comp_frame, output)
    }

    fn comprehension_level(
        &mut self,
        generators: &[Comprehension],
        frame: &Frame,
        output: &mut CompOutput<'_>,
    ) -> RtResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            match output {
                CompOutput::List { element, items } => {
                    let item = self.eval(element, frame)?;
                    items.push(item);
                }
                CompOutput::Dict { key, value, dict } => {
                    let k = self.eval(key, frame)?;
                    k.check_hashable()?;
                    let v = self.eval(value, frame)?;
                    dict.insert(k, v);
                }
            }
            return Ok(());
        };

        let iterable = self.eval(&first.iter, frame)?;
        'items: for item in self.iterate(&iterable)? {
            self.tick()?;
            self.assign(&first.target, item, frame)?;
            for condition in &first.conditions {
                if !self.eval(condition, frame)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehension_level(rest, frame, output)?;
        }
        Ok(())
    }

    fn unary(&mut self, op: UnaryOp, value: &Value) -> RtResult<Value> {
        if op == UnaryOp::Not {
            return Ok(Value::Bool(!value.truthy()));
        }
        let dunder = match op {
            UnaryOp::Neg => "__neg__",
            UnaryOp::Pos => "__pos__",
            _ => "__invert__",
        };
        if let Some(result) = self.call_dunder(value, dunder, Vec::new())? {
            return Ok(result);
        }
        match (op, value) {
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
            (UnaryOp::Neg, v) if v.as_int().is_some() => v
                .as_int()
                .and_then(i64::checked_neg)
                .map(Value::Int)
                .ok_or_else(RuntimeError::overflow),
            (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
            (UnaryOp::Invert, v) if v.as_int().is_some() => Ok(Value::Int(!v.as_int().unwrap_or(0))),
            (op, v) => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Pos => "+",
                    _ => "~",
                };
                Err(RuntimeError::type_error(format!(
                    "bad operand type for unary {symbol}: '{}'",
                    v.type_name()
                )))
            }
        }
    }

    pub(crate) fn binary(&mut self, op: BinOp, left: &Value, right: &Value) -> RtResult<Value> {
        let (name, reflected) = dunder_names(op);
        if let Some(result) = self.call_dunder(left, name, vec![right.clone()])? {
            return Ok(result);
        }
        if let Some(result) = self.call_dunder(right, reflected, vec![left.clone()])? {
            return Ok(result);
        }
        binary_op(op, left, right)
    }

    pub(crate) fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> RtResult<bool> {
        match op {
            CmpOp::Eq | CmpOp::NotEq => {
                let equal = match self.call_dunder(left, "__eq__", vec![right.clone()])? {
                    Some(result) => result.truthy(),
                    None => py_eq(left, right),
                };
                Ok(equal == (op == CmpOp::Eq))
            }
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
                let dunder = match op {
                    CmpOp::Lt => "__lt__",
                    CmpOp::LtE => "__le__",
                    CmpOp::Gt => "__gt__",
                    _ => "__ge__",
                };
                if let Some(result) = self.call_dunder(left, dunder, vec![right.clone()])? {
                    return Ok(result.truthy());
                }
                Ok(match py_compare(left, right, op.symbol())? {
                    None => false,
                    Some(ordering) => match op {
                        CmpOp::Lt => ordering == Ordering::Less,
                        CmpOp::LtE => ordering != Ordering::Greater,
                        CmpOp::Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    },
                })
            }
            CmpOp::In | CmpOp::NotIn => {
                let contained = match self.call_dunder(right, "__contains__", vec![left.clone()])? {
                    Some(result) => result.truthy(),
                    None => py_contains(right, left)?,
                };
                Ok(contained == (op == CmpOp::In))
            }
            CmpOp::Is => Ok(py_is(left, right)),
            CmpOp::IsNot => Ok(!py_is(left, right)),
        }
    }

    /// Call a special method defined by a user class, if present.
    fn call_dunder(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> RtResult<Option<Value>> {
        let Value::Instance(instance) = receiver else {
            return Ok(None);
        };
        match instance.class.lookup(name) {
            Some(Value::Function(function)) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.clone());
                full.extend(args);
                self.call_function(&function, full, Vec::new()).map(Some)
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // objects
    // ------------------------------------------------------------------

    /// `getattr(value, name)`
    pub fn get_attr(&mut self, value: &Value, name: &str) -> RtResult<Value> {
        match value {
            Value::Instance(instance) => {
                if let Some(found) = instance.attrs.borrow().get(name) {
                    return Ok(found.clone());
                }
                match instance.class.lookup(name) {
                    Some(Value::Function(function)) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: value.clone(),
                        function,
                    }))),
                    Some(Value::StaticMethod(function)) => Ok(Value::Function(function)),
                    Some(Value::ClassMethod(function)) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: Value::Class(instance.class.clone()),
                        function,
                    }))),
                    Some(Value::Property(getter)) => self.call_function(&getter, vec![value.clone()], Vec::new()),
                    Some(other) => Ok(other),
                    None if name == "__class__" => Ok(Value::Class(instance.class.clone())),
                    None => Err(attribute_error(value, name)),
                }
            }
            Value::Class(class) => match class.lookup(name) {
                Some(Value::StaticMethod(function)) => Ok(Value::Function(function)),
                Some(Value::ClassMethod(function)) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: value.clone(),
                    function,
                }))),
                Some(other) => Ok(other),
                None if name == "__name__" => Ok(Value::str(&class.name)),
                None => Err(RuntimeError::exception(
                    "AttributeError",
                    format!("type object '{}' has no attribute '{name}'", class.name),
                )),
            },
            Value::Module(module) => match module.kind {
                ModuleKind::Math => Builtin::math_attr(name).ok_or_else(|| {
                    RuntimeError::exception(
                        "AttributeError",
                        format!("module 'math' has no attribute '{name}'"),
                    )
                }),
                ModuleKind::Opaque => Err(RuntimeError::unsupported(format!(
                    "module '{}'",
                    module.name
                ))),
            },
            Value::Exception(exception) if name == "args" => Ok(Value::tuple(exception.args.clone())),
            Value::Function(function) if name == "__name__" => Ok(Value::str(function.name())),
            _ if Builtin::has_native_method(value, name) => Ok(Value::NativeMethod(Rc::new(NativeMethod {
                receiver: value.clone(),
                name: name.to_string(),
            }))),
            _ => Err(attribute_error(value, name)),
        }
    }

    /// `setattr(value, name, new)`
    pub fn set_attr(&mut self, value: &Value, name: &str, new: Value) -> RtResult<()> {
        match value {
            Value::Instance(instance) => {
                if let Some(Value::Property(_)) = instance.class.lookup(name) {
                    return Err(RuntimeError::exception(
                        "AttributeError",
                        format!("can't set attribute '{name}'"),
                    ));
                }
                instance.attrs.borrow_mut().insert(name.to_string(), new);
                Ok(())
            }
            Value::Class(class) => {
                class.attrs.borrow_mut().insert(name.to_string(), new);
                Ok(())
            }
            other => Err(attribute_error(other, name)),
        }
    }

    pub(crate) fn get_item(&mut self, object: &Value, index: &Value) -> RtResult<Value> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let i = sequence_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = sequence_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let i = sequence_index(index, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Dict(dict) => {
                index.check_hashable()?;
                dict.borrow()
                    .get(index)
                    .ok_or_else(|| RuntimeError::exception("KeyError", index.repr()))
            }
            Value::Instance(_) => self
                .call_dunder(object, "__getitem__", vec![index.clone()])?
                .ok_or_else(|| not_subscriptable(object)),
            other => Err(not_subscriptable(other)),
        }
    }

    fn set_item(&mut self, object: &Value, index: Value, value: Value) -> RtResult<()> {
        match object {
            Value::List(items) => {
                let len = items.borrow().len();
                let i = index
                    .as_int()
                    .ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "list indices must be integers or slices, not {}",
                            index.type_name()
                        ))
                    })
                    .and_then(|i| {
                        normalize_index(i, len).ok_or_else(|| {
                            RuntimeError::exception("IndexError", "list assignment index out of range")
                        })
                    })?;
                items.borrow_mut()[i] = value;
                Ok(())
            }
            Value::Dict(dict) => {
                index.check_hashable()?;
                dict.borrow_mut().insert(index, value);
                Ok(())
            }
            Value::Instance(_) => self
                .call_dunder(object, "__setitem__", vec![index, value])?
                .map(|_| ())
                .ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "'{}' object does not support item assignment",
                        object.type_name()
                    ))
                }),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    /// Materialise an iterable.
    pub(crate) fn iterate(&mut self, value: &Value) -> RtResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Str(text) => Ok(text.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Dict(dict) => Ok(dict.borrow().keys()),
            Value::Instance(instance) if instance.class.lookup("__iter__").is_some() => {
                Err(RuntimeError::unsupported("iteration protocol on user objects"))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// `len(value)`
    pub(crate) fn len_of(&mut self, value: &Value) -> RtResult<usize> {
        match value {
            Value::Str(text) => Ok(text.chars().count()),
            Value::List(items) => Ok(items.borrow().len()),
            Value::Tuple(items) => Ok(items.len()),
            Value::Dict(dict) => Ok(dict.borrow().len()),
            Value::Instance(_) => match self.call_dunder(value, "__len__", Vec::new())? {
                Some(result) => result
                    .as_int()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| RuntimeError::value_error("__len__() should return >= 0")),
                None => Err(no_len(value)),
            },
            other => Err(no_len(other)),
        }
    }

    /// `str(value)`, honouring `__str__` / `__repr__`
    pub fn str_of(&mut self, value: &Value) -> RtResult<String> {
        if let Value::Instance(instance) = value {
            for dunder in ["__str__", "__repr__"] {
                if let Some(result) = self.call_dunder(value, dunder, Vec::new())? {
                    return Ok(result.to_str());
                }
            }
            if instance.class.exception_ancestor().is_some() {
                return Ok(instance_exception_message(instance));
            }
        }
        Ok(value.to_str())
    }

    /// `repr(value)`, honouring `__repr__`
    pub fn repr_of(&mut self, value: &Value) -> RtResult<String> {
        if let Some(result) = self.call_dunder(value, "__repr__", Vec::new())? {
            return Ok(result.to_str());
        }
        Ok(value.repr())
    }

    // ------------------------------------------------------------------
    // calls
    // ------------------------------------------------------------------

    /// Call any callable value
    pub fn call(&mut self, callee: &Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RtResult<Value> {
        match callee {
            Value::Function(function) | Value::StaticMethod(function) => {
                self.call_function(function, args, kwargs)
            }
            Value::BoundMethod(method) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(method.receiver.clone());
                full.extend(args);
                self.call_function(&method.function, full, kwargs)
            }
            Value::Class(class) => self.instantiate(class, args, kwargs),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args, kwargs),
            Value::NativeMethod(method) => {
                self.call_native_method(&method.receiver, &method.name, args, kwargs)
            }
            Value::ExceptionType(kind) => {
                if !kwargs.is_empty() {
                    return Err(RuntimeError::type_error(format!(
                        "{kind}() takes no keyword arguments"
                    )));
                }
                Ok(Value::Exception(Rc::new(ExceptionValue {
                    kind: kind.to_string(),
                    args,
                })))
            }
            Value::Module(module) => Err(RuntimeError::unsupported(format!(
                "call into module '{}'",
                module.name
            ))),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, function: &Rc<Function>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RtResult<Value> {
        if self.depth >= self.limits.max_call_depth {
            return Err(RuntimeError::exception(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        let globals = function
            .globals
            .upgrade()
            .ok_or_else(|| RuntimeError::unsupported("call into an unloaded module"))?;

        let env = Rc::new(Env::new(function.closure.clone()));
        bind_arguments(function, args, kwargs, &env)?;
        let frame = Frame::function(env, globals);

        self.depth += 1;
        let result = self.exec_block(&function.def.body, &frame);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Create an instance and run `__init__`
    pub fn instantiate(&mut self, class: &Rc<Class>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> RtResult<Value> {
        let instance = Rc::new(Instance {
            class: class.clone(),
            attrs: RefCell::default(),
        });
        let value = Value::Instance(instance.clone());

        match class.lookup("__init__") {
            Some(Value::Function(init)) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(value.clone());
                full.extend(args);
                let returned = self.call_function(&init, full, kwargs)?;
                if !matches!(returned, Value::None) {
                    return Err(RuntimeError::type_error(
                        "__init__() should return None",
                    ));
                }
            }
            Some(other) => {
                return Err(RuntimeError::unsupported(format!(
                    "__init__ of type '{}'",
                    other.type_name()
                )))
            }
            None if class.exception_ancestor().is_some() => {
                instance
                    .attrs
                    .borrow_mut()
                    .insert("args".to_string(), Value::tuple(args));
            }
            None if !args.is_empty() || !kwargs.is_empty() => {
                return Err(RuntimeError::type_error(format!(
                    "{}() takes no arguments",
                    class.name
                )));
            }
            None => {}
        }
        Ok(value)
    }

    fn to_exception(&mut self, value: Value) -> RtResult<PyException> {
        match &value {
            Value::ExceptionType(kind) => {
                let instance = Value::Exception(Rc::new(ExceptionValue {
                    kind: kind.to_string(),
                    args: Vec::new(),
                }));
                Ok(PyException {
                    value: Some(instance),
                    ..PyException::new(kind, "")
                })
            }
            Value::Exception(exception) => Ok(PyException {
                value: Some(value.clone()),
                ..PyException::new(&exception.kind, exception.message())
            }),
            Value::Class(class) if class.exception_ancestor().is_some() => {
                let instance = self.instantiate(class, Vec::new(), Vec::new())?;
                self.to_exception(instance)
            }
            Value::Instance(instance) if instance.class.exception_ancestor().is_some() => {
                let message = self.str_of(&value)?;
                Ok(PyException {
                    kind: instance.class.name.clone(),
                    message,
                    lineage: instance.class.lineage(),
                    value: Some(value.clone()),
                })
            }
            _ => Err(RuntimeError::type_error(
                "exceptions must derive from BaseException",
            )),
        }
    }
}

fn bind_arguments(function: &Function, args: Vec<Value>, kwargs: Vec<(String, Value)>, env: &Env) -> RtResult<()> {
    let def = &function.def;
    let mut slots: Vec<Option<Value>> = vec![None; def.params.len()];
    let mut extra = Vec::new();
    let given = args.len();
    for (i, arg) in args.into_iter().enumerate() {
        match slots.get_mut(i) {
            Some(slot) => *slot = Some(arg),
            None => extra.push(arg),
        }
    }
    if !extra.is_empty() && def.varargs.is_none() {
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} positional arguments but {} were given",
            def.name,
            def.params.len(),
            given
        )));
    }

    let mut extra_keywords = Dict::new();
    for (key, value) in kwargs {
        match def.params.iter().position(|p| p.name == key) {
            Some(i) if slots[i].is_some() => {
                return Err(RuntimeError::type_error(format!(
                    "{}() got multiple values for argument '{key}'",
                    def.name
                )))
            }
            Some(i) => slots[i] = Some(value),
            None if def.kwargs.is_some() => extra_keywords.insert(Value::str(&key), value),
            None => {
                return Err(RuntimeError::type_error(format!(
                    "{}() got an unexpected keyword argument '{key}'",
                    def.name
                )))
            }
        }
    }

    let mut vars = env.vars.borrow_mut();
    for ((param, slot), default) in def.params.iter().zip(slots).zip(&function.defaults) {
        let value = slot.or_else(|| default.clone()).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{}() missing required positional argument: '{}'",
                def.name, param.name
            ))
        })?;
        vars.insert(param.name.clone(), value);
    }
    if let Some(name) = &def.varargs {
        vars.insert(name.clone(), Value::tuple(extra));
    }
    if let Some(name) = &def.kwargs {
        vars.insert(name.clone(), Value::dict(extra_keywords));
    }
    Ok(())
}

fn dunder_names(op: BinOp) -> (&'static str, &'static str) {
    match op {
        BinOp::Add => ("__add__", "__radd__"),
        BinOp::Sub => ("__sub__", "__rsub__"),
        BinOp::Mul => ("__mul__", "__rmul__"),
        BinOp::Div => ("__truediv__", "__rtruediv__"),
        BinOp::FloorDiv => ("__floordiv__", "__rfloordiv__"),
        BinOp::Mod => ("__mod__", "__rmod__"),
        BinOp::Pow => ("__pow__", "__rpow__"),
        BinOp::BitAnd => ("__and__", "__rand__"),
        BinOp::BitOr => ("__or__", "__ror__"),
        BinOp::BitXor => ("__xor__", "__rxor__"),
        BinOp::LShift => ("__lshift__", "__rlshift__"),
        BinOp::RShift => ("__rshift__", "__rrshift__"),
    }
}

fn builtin_value(name: &str) -> Option<Value> {
    if let Some(builtin) = Builtin::from_name(name) {
        return Some(Value::Builtin(builtin));
    }
    is_builtin_exception(name).then(|| Value::ExceptionType(Rc::from(name)))
}

fn module_value(name: &str) -> Value {
    let kind = if name == "math" {
        ModuleKind::Math
    } else {
        ModuleKind::Opaque
    };
    Value::Module(Rc::new(ModuleValue {
        name: name.to_string(),
        kind,
    }))
}

fn exception_matches(exception: &PyException, kind: &Value) -> RtResult<bool> {
    match kind {
        Value::ExceptionType(name) => Ok(exception.matches(name)),
        Value::Class(class) => Ok(exception.matches(&class.name)),
        Value::Tuple(kinds) => {
            for kind in kinds.iter() {
                if exception_matches(exception, kind)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(RuntimeError::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn exception_value(exception: &PyException) -> Value {
    exception.value.clone().unwrap_or_else(|| {
        let args = if exception.message.is_empty() {
            Vec::new()
        } else {
            vec![Value::str(&exception.message)]
        };
        Value::Exception(Rc::new(ExceptionValue {
            kind: exception.kind.clone(),
            args,
        }))
    })
}

fn instance_exception_message(instance: &Instance) -> String {
    match instance.attrs.borrow().get("args") {
        Some(Value::Tuple(args)) => exception_message(args),
        Some(other) => other.to_str(),
        None => String::new(),
    }
}

fn get_slice(object: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> RtResult<Value> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let picked = slice_indices(chars.len(), lower, upper, step)?;
            Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        other => Err(not_subscriptable(other)),
    }
}

fn sequence_index(index: &Value, len: usize, what: &str) -> RtResult<usize> {
    let i = index.as_int().ok_or_else(|| {
        let noun = if what == "string" { "string" } else { what };
        RuntimeError::type_error(format!(
            "{noun} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })?;
    normalize_index(i, len)
        .ok_or_else(|| RuntimeError::exception("IndexError", format!("{what} index out of range")))
}

fn name_error(name: &str) -> RuntimeError {
    RuntimeError::exception("NameError", format!("name '{name}' is not defined"))
}

fn attribute_error(value: &Value, name: &str) -> RuntimeError {
    RuntimeError::exception(
        "AttributeError",
        format!("'{}' object has no attribute '{name}'", value.type_name()),
    )
}

fn not_subscriptable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "'{}' object is not subscriptable",
        value.type_name()
    ))
}

fn no_len(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "object of type '{}' has no len()",
        value.type_name()
    ))
}
