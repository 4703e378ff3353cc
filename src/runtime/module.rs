//! A Python file executed once and kept alive for repeated invocation.

use std::rc::Rc;

use tracing::debug;

use super::error::{RtResult, RuntimeError};
use super::interpreter::{ExecutionLimits, Interpreter};
use super::lower::lower_module;
use super::value::{Class, Globals, Value};
use crate::core::errors::{Result, SpecLensError};
use crate::lang::common::AnalyzableUnit;
use crate::lang::python::PythonSource;

/// Callable resolved for one unit, plus the receiver it was bound to.
pub struct ResolvedCallable {
    /// Function, bound method or class to call with generated arguments
    pub callable: Value,
    /// Instance the method was bound to
    pub receiver: Option<Value>,
}

/// Module namespace produced by executing a file's top level.
pub struct LoadedModule {
    name: String,
    globals: Globals,
    limits: ExecutionLimits,
}

impl LoadedModule {
    /// Lower and execute `source`. Any exception escaping the top level,
    /// unsupported top-level construct or budget exhaustion fails the load.
    pub fn load(source: &PythonSource, limits: ExecutionLimits) -> Result<Self> {
        let name = source.module_name();
        let body = lower_module(source);

        let globals = Globals::default();
        globals
            .borrow_mut()
            .insert("__name__".to_string(), Value::str(&name));

        let mut interpreter = Interpreter::new(limits);
        interpreter
            .exec_module(&body, &globals)
            .map_err(|err| SpecLensError::load(&name, err.to_string()))?;

        debug!(
            module = %name,
            globals = globals.borrow().len(),
            steps = interpreter.steps_used(),
            "Loaded module"
        );

        Ok(Self {
            name,
            globals,
            limits,
        })
    }

    /// Module name (file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Limits every invocation against this module runs with
    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Module-level binding
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    /// Fresh interpreter with this module's limits
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.limits)
    }

    /// Find the callable for `unit`. Methods are bound to a new instance of
    /// their class built by passing `constructor_arg` for every required
    /// `__init__` parameter. `Err` carries the reason the unit cannot be
    /// exercised, including a constructor that raised.
    pub fn resolve(
        &self,
        interpreter: &mut Interpreter,
        unit: &AnalyzableUnit,
        constructor_arg: i64,
    ) -> std::result::Result<ResolvedCallable, String> {
        let Some(class_name) = &unit.enclosing_type else {
            return match self.global(&unit.name) {
                Some(callable) if is_callable(&callable) => Ok(ResolvedCallable {
                    callable,
                    receiver: None,
                }),
                Some(other) => Err(format!(
                    "module attribute '{}' is a '{}', not a function",
                    unit.name,
                    other.type_name()
                )),
                None => Err(format!("'{}' is not defined at module level", unit.name)),
            };
        };

        let class = match self.global(class_name) {
            Some(Value::Class(class)) => class,
            Some(_) | None => {
                return Err(format!("class '{class_name}' is not defined at module level"))
            }
        };

        match class.lookup(&unit.name) {
            Some(Value::StaticMethod(function)) => {
                return Ok(ResolvedCallable {
                    callable: Value::StaticMethod(function),
                    receiver: None,
                })
            }
            Some(Value::Property(_)) => {
                return Err(format!("'{}' is a property", unit.qualified_name()))
            }
            Some(_) => {}
            None => {
                return Err(format!(
                    "method '{}' is not bound on its class",
                    unit.qualified_name()
                ))
            }
        }

        let receiver = construct(interpreter, &class, constructor_arg)
            .map_err(|err| format!("constructing '{class_name}' failed: {err}"))?;
        let callable = interpreter
            .get_attr(&receiver, &unit.name)
            .map_err(|err| format!("binding '{}' failed: {err}", unit.qualified_name()))?;

        Ok(ResolvedCallable {
            callable,
            receiver: Some(receiver),
        })
    }

    /// Instantiate `class_name` the same way receivers are built
    pub fn construct(
        &self,
        interpreter: &mut Interpreter,
        class_name: &str,
        constructor_arg: i64,
    ) -> RtResult<Value> {
        match self.global(class_name) {
            Some(Value::Class(class)) => construct(interpreter, &class, constructor_arg),
            _ => Err(RuntimeError::exception(
                "NameError",
                format!("name '{class_name}' is not defined"),
            )),
        }
    }
}

fn construct(interpreter: &mut Interpreter, class: &Rc<Class>, constructor_arg: i64) -> RtResult<Value> {
    let required = match class.lookup("__init__") {
        Some(Value::Function(init)) => init
            .def
            .params
            .iter()
            .zip(init.defaults.iter())
            .skip(1)
            .filter(|(_, default)| default.is_none())
            .count(),
        _ => 0,
    };
    let args = vec![Value::Int(constructor_arg); required];
    interpreter.instantiate(class, args, Vec::new())
}

fn is_callable(value: &Value) -> bool {
    matches!(
        value,
        Value::Function(_) | Value::Class(_) | Value::Builtin(_) | Value::BoundMethod(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::python::ContractParser;

    fn load(code: &str) -> Result<(LoadedModule, Vec<AnalyzableUnit>)> {
        let mut parser = ContractParser::new()?;
        let source = parser.parse_source(code, "sample.py")?;
        let units = parser.units(&source);
        let module = LoadedModule::load(&source, ExecutionLimits::default())?;
        Ok((module, units))
    }

    #[test]
    fn load_binds_name_and_definitions() {
        let (module, _) = load("LIMIT = 3\n\ndef f(x):\n    return x + LIMIT\n").unwrap();
        assert_eq!(module.name(), "sample");
        assert!(matches!(module.global("__name__"), Some(Value::Str(s)) if &*s == "sample"));
        assert!(matches!(module.global("LIMIT"), Some(Value::Int(3))));
        assert!(matches!(module.global("f"), Some(Value::Function(_))));
    }

    #[test]
    fn top_level_exception_fails_the_load() {
        let err = load("x = 1 // 0\n").err().unwrap();
        assert!(matches!(err, SpecLensError::Load { .. }));
        assert!(err.to_string().contains("ZeroDivisionError"));
    }

    #[test]
    fn methods_bind_to_constructed_receiver() {
        let code = "class Box:\n    def __init__(self, size, label='b'):\n        self.size = size\n\n    def grow(self, n):\n        return self.size + n\n";
        let (module, units) = load(code).unwrap();
        let grow = units.iter().find(|u| u.name == "grow").unwrap();

        let mut interpreter = module.interpreter();
        let resolved = module.resolve(&mut interpreter, grow, 5).unwrap();
        assert!(resolved.receiver.is_some());

        let result = interpreter
            .call(&resolved.callable, vec![Value::Int(2)], Vec::new())
            .unwrap();
        assert!(matches!(result, Value::Int(7)));
    }

    #[test]
    fn raising_constructor_makes_the_method_unresolvable() {
        let code = "class Bad:\n    def __init__(self, n):\n        raise ValueError('no')\n\n    def m(self):\n        return 1\n";
        let (module, units) = load(code).unwrap();
        let m = units.iter().find(|u| u.name == "m").unwrap();
        let mut interpreter = module.interpreter();
        let reason = module.resolve(&mut interpreter, m, 1).err().unwrap();
        assert!(reason.contains("ValueError"));
    }

    #[test]
    fn nested_functions_are_unresolvable() {
        let code = "def outer(x):\n    def inner(y):\n        return y\n    return inner(x)\n";
        let (module, units) = load(code).unwrap();
        let inner = units.iter().find(|u| u.name == "inner").unwrap();
        let mut interpreter = module.interpreter();
        assert!(module.resolve(&mut interpreter, inner, 1).is_err());
    }
}
