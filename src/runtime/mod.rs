//! Embedded runtime for the Python subset that contract-bearing code uses.
//!
//! Source is lowered from the tree-sitter parse into a small AST and
//! executed by a tree-walking [`Interpreter`] with a step budget and a call
//! depth limit. Values are reference counted and single-threaded; a loaded
//! module never leaves the thread that loaded it.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod expr_parser;
pub mod interpreter;
pub mod lower;
pub mod module;
pub mod value;

pub use error::{PyException, RtResult, RuntimeError};
pub use expr_parser::parse_expression;
pub use interpreter::{ExecutionLimits, Interpreter};
pub use module::{LoadedModule, ResolvedCallable};
pub use value::{Namespace, Value};
