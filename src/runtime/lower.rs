//! Lowering from tree-sitter Python syntax to the runtime [`ast`](super::ast).
//!
//! Lowering never fails. Constructs outside the supported subset become
//! `Unsupported` nodes that only error when executed, so a module that uses
//! `with` in one function can still have its other functions verified.

use std::rc::Rc;

use tree_sitter::Node;

use super::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, ExceptHandler, Expr, FStringPart, FunctionDef, Literal,
    ParamDef, Stmt, Target, UnaryOp,
};
use crate::lang::python::PythonSource;

/// Lower a parsed module body.
pub fn lower_module(source: &PythonSource) -> Vec<Stmt> {
    Lowerer { source }.block(source.root())
}

struct Lowerer<'s> {
    source: &'s PythonSource,
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, name: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(name, &mut cursor).collect()
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

fn is_async(node: Node<'_>) -> bool {
    node.child(0).is_some_and(|child| child.kind() == "async")
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        self.source.node_text(node)
    }

    fn unsupported_stmt(&self, what: impl Into<String>, node: Node<'_>) -> Stmt {
        Stmt::Unsupported {
            what: what.into(),
            line: line_of(node),
        }
    }

    fn block(&self, node: Node<'_>) -> Vec<Stmt> {
        named_children(node)
            .into_iter()
            .map(|child| self.statement(child))
            .collect()
    }

    fn optional_block(&self, node: Option<Node<'_>>) -> Vec<Stmt> {
        node.map(|n| self.block(n)).unwrap_or_default()
    }

    /// Body of an `else_clause`, `finally_clause` or similar wrapper.
    fn clause_body(&self, clause: Node<'_>) -> Vec<Stmt> {
        if let Some(body) = clause.child_by_field_name("body") {
            return self.block(body);
        }
        named_children(clause)
            .into_iter()
            .find(|child| child.kind() == "block")
            .map(|block| self.block(block))
            .unwrap_or_default()
    }

    fn statement(&self, node: Node<'_>) -> Stmt {
        match node.kind() {
            "expression_statement" => self.expression_statement(node),
            "return_statement" => Stmt::Return(named_children(node).first().map(|n| self.expr(*n))),
            "pass_statement" => Stmt::Pass,
            "break_statement" => Stmt::Break,
            "continue_statement" => Stmt::Continue,
            "if_statement" => self.if_statement(node),
            "while_statement" => match node.child_by_field_name("condition") {
                Some(condition) => Stmt::While {
                    test: self.expr(condition),
                    body: self.optional_block(node.child_by_field_name("body")),
                    orelse: node
                        .child_by_field_name("alternative")
                        .map(|alt| self.clause_body(alt))
                        .unwrap_or_default(),
                },
                None => self.unsupported_stmt("malformed while", node),
            },
            "for_statement" => self.for_statement(node),
            "try_statement" => self.try_statement(node),
            "raise_statement" => Stmt::Raise(named_children(node).first().map(|n| self.expr(*n))),
            "assert_statement" => {
                let parts = named_children(node);
                match parts.split_first() {
                    Some((test, rest)) => Stmt::Assert {
                        test: self.expr(*test),
                        msg: rest.first().map(|msg| self.expr(*msg)),
                    },
                    None => self.unsupported_stmt("malformed assert", node),
                }
            }
            "import_statement" => Stmt::Import(self.import_names(node)),
            "import_from_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|m| self.text(m).to_string())
                    .unwrap_or_default();
                let mut names = self.import_names(node);
                if named_children(node).iter().any(|c| c.kind() == "wildcard_import") {
                    names.push(("*".to_string(), "*".to_string()));
                }
                Stmt::ImportFrom { module, names }
            }
            "future_import_statement" => Stmt::Pass,
            "function_definition" => self.function_statement(node, Vec::new()),
            "class_definition" => self.class_statement(node, Vec::new()),
            "decorated_definition" => {
                let decorators = named_children(node)
                    .into_iter()
                    .filter(|child| child.kind() == "decorator")
                    .map(|decorator| match named_children(decorator).first() {
                        Some(inner) => self.expr(*inner),
                        None => Expr::Unsupported("empty decorator".into()),
                    })
                    .collect();
                match node.child_by_field_name("definition") {
                    Some(def) if def.kind() == "class_definition" => self.class_statement(def, decorators),
                    Some(def) => self.function_statement(def, decorators),
                    None => self.unsupported_stmt("decorated definition", node),
                }
            }
            "global_statement" => Stmt::Global(
                named_children(node)
                    .into_iter()
                    .map(|n| self.text(n).to_string())
                    .collect(),
            ),
            "delete_statement" => {
                let targets = match named_children(node).first() {
                    Some(list) if list.kind() == "expression_list" => named_children(*list)
                        .into_iter()
                        .map(|n| self.target(n))
                        .collect(),
                    Some(single) => vec![self.target(*single)],
                    None => Vec::new(),
                };
                Stmt::Delete(targets)
            }
            other => self.unsupported_stmt(format!("{other} statement"), node),
        }
    }

    fn expression_statement(&self, node: Node<'_>) -> Stmt {
        let parts = named_children(node);
        match parts.as_slice() {
            [single] => match single.kind() {
                "assignment" => self.assignment(*single),
                "augmented_assignment" => self.augmented_assignment(*single),
                _ => Stmt::Expr(self.expr(*single)),
            },
            many => Stmt::Expr(Expr::Tuple(many.iter().map(|n| self.expr(*n)).collect())),
        }
    }

    fn assignment(&self, node: Node<'_>) -> Stmt {
        let mut targets = Vec::new();
        let mut current = node;
        loop {
            let Some(left) = current.child_by_field_name("left") else {
                return self.unsupported_stmt("malformed assignment", node);
            };
            targets.push(self.target(left));
            match current.child_by_field_name("right") {
                // annotation without a value
                None => return Stmt::Pass,
                Some(right) if right.kind() == "assignment" => current = right,
                Some(right) => {
                    return Stmt::Assign {
                        targets,
                        value: self.expr(right),
                    }
                }
            }
        }
    }

    fn augmented_assignment(&self, node: Node<'_>) -> Stmt {
        let (Some(left), Some(op), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return self.unsupported_stmt("malformed augmented assignment", node);
        };
        match BinOp::from_token(self.text(op)) {
            Some(op) => Stmt::AugAssign {
                target: self.target(left),
                op,
                value: self.expr(right),
            },
            None => self.unsupported_stmt(format!("operator {}", self.text(op)), node),
        }
    }

    fn if_statement(&self, node: Node<'_>) -> Stmt {
        let Some(condition) = node.child_by_field_name("condition") else {
            return self.unsupported_stmt("malformed if", node);
        };
        let mut orelse = Vec::new();
        for alternative in field_children(node, "alternative").into_iter().rev() {
            orelse = match alternative.kind() {
                "elif_clause" => match alternative.child_by_field_name("condition") {
                    Some(test) => vec![Stmt::If {
                        test: self.expr(test),
                        body: self.optional_block(alternative.child_by_field_name("consequence")),
                        orelse,
                    }],
                    None => vec![self.unsupported_stmt("malformed elif", alternative)],
                },
                _ => self.clause_body(alternative),
            };
        }
        Stmt::If {
            test: self.expr(condition),
            body: self.optional_block(node.child_by_field_name("consequence")),
            orelse,
        }
    }

    fn for_statement(&self, node: Node<'_>) -> Stmt {
        if is_async(node) {
            return self.unsupported_stmt("async for", node);
        }
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return self.unsupported_stmt("malformed for", node);
        };
        Stmt::For {
            target: self.target(left),
            iter: self.expr(right),
            body: self.optional_block(node.child_by_field_name("body")),
            orelse: node
                .child_by_field_name("alternative")
                .map(|alt| self.clause_body(alt))
                .unwrap_or_default(),
        }
    }

    fn try_statement(&self, node: Node<'_>) -> Stmt {
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "except_clause" | "except_group_clause" => handlers.push(self.except_clause(child)),
                "else_clause" => orelse = self.clause_body(child),
                "finally_clause" => finalbody = self.clause_body(child),
                _ => {}
            }
        }
        Stmt::Try {
            body: self.optional_block(node.child_by_field_name("body")),
            handlers,
            orelse,
            finalbody,
        }
    }

    fn except_clause(&self, node: Node<'_>) -> ExceptHandler {
        let children = named_children(node);
        let (body, heads) = match children.split_last() {
            Some((last, heads)) if last.kind() == "block" => (self.block(*last), heads),
            _ => (Vec::new(), children.as_slice()),
        };
        let (kind, name) = match heads {
            [] => (None, None),
            [pattern] if pattern.kind() == "as_pattern" => {
                let inner = named_children(*pattern);
                let alias = pattern
                    .child_by_field_name("alias")
                    .or_else(|| inner.get(1).copied())
                    .map(|alias| self.text(alias).trim().to_string());
                (inner.first().map(|kind| self.expr(*kind)), alias)
            }
            [kind] => (Some(self.expr(*kind)), None),
            [kind, alias, ..] => (Some(self.expr(*kind)), Some(self.text(*alias).to_string())),
        };
        ExceptHandler { kind, name, body }
    }

    /// `(module, bound name)` pairs of an import statement
    fn import_names(&self, node: Node<'_>) -> Vec<(String, String)> {
        field_children(node, "name")
            .into_iter()
            .map(|name| {
                if name.kind() == "aliased_import" {
                    let module = name
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let alias = name
                        .child_by_field_name("alias")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_else(|| module.clone());
                    (module, alias)
                } else {
                    let module = self.text(name).to_string();
                    let bound = module.split('.').next().unwrap_or_default().to_string();
                    (bound.clone(), bound)
                }
            })
            .collect()
    }

    fn function_statement(&self, node: Node<'_>, decorators: Vec<Expr>) -> Stmt {
        let Some(name) = node.child_by_field_name("name") else {
            return self.unsupported_stmt("malformed def", node);
        };
        let body = if is_async(node) {
            vec![self.unsupported_stmt("async function", node)]
        } else {
            self.optional_block(node.child_by_field_name("body"))
        };
        let def = self.function_def(
            self.text(name),
            node.child_by_field_name("parameters"),
            body,
        );
        Stmt::FunctionDef {
            def: Rc::new(def),
            decorators,
        }
    }

    fn class_statement(&self, node: Node<'_>, decorators: Vec<Expr>) -> Stmt {
        let Some(name) = node.child_by_field_name("name") else {
            return self.unsupported_stmt("malformed class", node);
        };
        let bases = node
            .child_by_field_name("superclasses")
            .map(|list| {
                named_children(list)
                    .into_iter()
                    .filter(|base| base.kind() != "keyword_argument")
                    .map(|base| self.expr(base))
                    .collect()
            })
            .unwrap_or_default();
        Stmt::ClassDef {
            name: self.text(name).to_string(),
            bases,
            body: self.optional_block(node.child_by_field_name("body")),
            decorators,
        }
    }

    fn function_def(&self, name: &str, parameters: Option<Node<'_>>, body: Vec<Stmt>) -> FunctionDef {
        let mut def = FunctionDef {
            name: name.to_string(),
            params: Vec::new(),
            varargs: None,
            kwargs: None,
            body,
        };
        let Some(parameters) = parameters else {
            return def;
        };
        for param in named_children(parameters) {
            let (target, default) = match param.kind() {
                "default_parameter" | "typed_default_parameter" => (
                    param.child_by_field_name("name"),
                    param.child_by_field_name("value").map(|v| self.expr(v)),
                ),
                "typed_parameter" => (named_children(param).first().copied(), None),
                _ => (Some(param), None),
            };
            let Some(target) = target else {
                continue;
            };
            match target.kind() {
                "identifier" => def.params.push(ParamDef {
                    name: self.text(target).to_string(),
                    default,
                }),
                "list_splat_pattern" => {
                    def.varargs = named_children(target).first().map(|n| self.text(*n).to_string());
                }
                "dictionary_splat_pattern" => {
                    def.kwargs = named_children(target).first().map(|n| self.text(*n).to_string());
                }
                "positional_separator" | "keyword_separator" => {}
                other => {
                    def.body = vec![self.unsupported_stmt(format!("{other} parameter"), target)];
                }
            }
        }
        def
    }

    fn target(&self, node: Node<'_>) -> Target {
        match node.kind() {
            "identifier" => Target::Name(self.text(node).to_string()),
            "attribute" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("attribute"),
            ) {
                (Some(object), Some(attr)) => {
                    Target::Attribute(self.expr(object), self.text(attr).to_string())
                }
                _ => Target::Unsupported("malformed attribute target".into()),
            },
            "subscript" => match node.child_by_field_name("value") {
                Some(value) => Target::Subscript(self.expr(value), self.subscript_index(node)),
                None => Target::Unsupported("malformed subscript target".into()),
            },
            "pattern_list" | "tuple_pattern" | "list_pattern" | "expression_list" | "tuple" | "list" => {
                Target::Sequence(named_children(node).into_iter().map(|n| self.target(n)).collect())
            }
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.target(*inner),
                None => Target::Unsupported("empty parentheses".into()),
            },
            other => Target::Unsupported(format!("assignment to {other}")),
        }
    }

    fn subscript_index(&self, node: Node<'_>) -> Expr {
        let indices = field_children(node, "subscript");
        match indices.as_slice() {
            [single] => self.index_expr(*single),
            many => Expr::Tuple(many.iter().map(|n| self.index_expr(*n)).collect()),
        }
    }

    fn index_expr(&self, node: Node<'_>) -> Expr {
        if node.kind() != "slice" {
            return self.expr(node);
        }
        let mut parts: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut slot = 0;
        for child in all_children(node) {
            if child.kind() == ":" {
                slot += 1;
            } else if child.is_named() && child.kind() != "comment" && slot < 3 {
                parts[slot] = Some(Box::new(self.expr(child)));
            }
        }
        let [lower, upper, step] = parts;
        Expr::Slice { lower, upper, step }
    }

    fn expr(&self, node: Node<'_>) -> Expr {
        match node.kind() {
            "identifier" | "keyword_identifier" => Expr::Name(self.text(node).to_string()),
            "integer" => parse_integer(self.text(node)),
            "float" => parse_float(self.text(node)),
            "true" => Expr::Literal(Literal::Bool(true)),
            "false" => Expr::Literal(Literal::Bool(false)),
            "none" | "ellipsis" => Expr::Literal(Literal::None),
            "string" => match self.string_parts(node) {
                Ok(parts) => finish_string(parts),
                Err(what) => Expr::Unsupported(what),
            },
            "concatenated_string" => {
                let mut parts = Vec::new();
                for piece in named_children(node) {
                    match self.string_parts(piece) {
                        Ok(more) => parts.extend(more),
                        Err(what) => return Expr::Unsupported(what),
                    }
                }
                finish_string(parts)
            }
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.expr(*inner),
                None => Expr::Tuple(Vec::new()),
            },
            "tuple" | "expression_list" => self.sequence(node).map_or_else(Expr::Unsupported, Expr::Tuple),
            "list" => self.sequence(node).map_or_else(Expr::Unsupported, Expr::List),
            "dictionary" => {
                let mut pairs = Vec::new();
                for child in named_children(node) {
                    match (child.kind(), child.child_by_field_name("key"), child.child_by_field_name("value")) {
                        ("pair", Some(key), Some(value)) => pairs.push((self.expr(key), self.expr(value))),
                        _ => return Expr::Unsupported("dictionary unpacking".into()),
                    }
                }
                Expr::Dict(pairs)
            }
            "list_comprehension" | "generator_expression" => match node.child_by_field_name("body") {
                Some(body) => match self.generators(node) {
                    Ok(generators) => Expr::ListComp {
                        element: Box::new(self.expr(body)),
                        generators,
                    },
                    Err(what) => Expr::Unsupported(what),
                },
                None => Expr::Unsupported("malformed comprehension".into()),
            },
            "dictionary_comprehension" => {
                let pair = node.child_by_field_name("body");
                match (
                    pair.and_then(|p| p.child_by_field_name("key")),
                    pair.and_then(|p| p.child_by_field_name("value")),
                    self.generators(node),
                ) {
                    (Some(key), Some(value), Ok(generators)) => Expr::DictComp {
                        key: Box::new(self.expr(key)),
                        value: Box::new(self.expr(value)),
                        generators,
                    },
                    (_, _, Err(what)) => Expr::Unsupported(what),
                    _ => Expr::Unsupported("malformed dict comprehension".into()),
                }
            }
            "attribute" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("attribute"),
            ) {
                (Some(object), Some(attr)) => {
                    Expr::Attribute(Box::new(self.expr(object)), self.text(attr).to_string())
                }
                _ => Expr::Unsupported("malformed attribute".into()),
            },
            "subscript" => match node.child_by_field_name("value") {
                Some(value) => Expr::Subscript(
                    Box::new(self.expr(value)),
                    Box::new(self.subscript_index(node)),
                ),
                None => Expr::Unsupported("malformed subscript".into()),
            },
            "call" => self.call(node),
            "unary_operator" => {
                let op = match node.child_by_field_name("operator").map(|op| self.text(op)) {
                    Some("-") => UnaryOp::Neg,
                    Some("+") => UnaryOp::Pos,
                    Some("~") => UnaryOp::Invert,
                    _ => return Expr::Unsupported("unary operator".into()),
                };
                match node.child_by_field_name("argument") {
                    Some(arg) => Expr::Unary(op, Box::new(self.expr(arg))),
                    None => Expr::Unsupported("malformed unary".into()),
                }
            }
            "not_operator" => match node.child_by_field_name("argument") {
                Some(arg) => Expr::Unary(UnaryOp::Not, Box::new(self.expr(arg))),
                None => Expr::Unsupported("malformed not".into()),
            },
            "binary_operator" => {
                let (Some(left), Some(op), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("operator"),
                    node.child_by_field_name("right"),
                ) else {
                    return Expr::Unsupported("malformed binary".into());
                };
                match BinOp::from_token(self.text(op)) {
                    Some(op) => Expr::Binary(op, Box::new(self.expr(left)), Box::new(self.expr(right))),
                    None => Expr::Unsupported(format!("operator {}", self.text(op))),
                }
            }
            "boolean_operator" => {
                let (Some(left), Some(op), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("operator"),
                    node.child_by_field_name("right"),
                ) else {
                    return Expr::Unsupported("malformed boolean".into());
                };
                let op = if self.text(op) == "and" { BoolOp::And } else { BoolOp::Or };
                Expr::Bool(op, Box::new(self.expr(left)), Box::new(self.expr(right)))
            }
            "comparison_operator" => self.comparison(node),
            "conditional_expression" => match named_children(node).as_slice() {
                [body, test, orelse] => Expr::IfExp {
                    test: Box::new(self.expr(*test)),
                    body: Box::new(self.expr(*body)),
                    orelse: Box::new(self.expr(*orelse)),
                },
                _ => Expr::Unsupported("malformed conditional".into()),
            },
            "lambda" => {
                let body = match node.child_by_field_name("body") {
                    Some(body) => vec![Stmt::Return(Some(self.expr(body)))],
                    None => vec![self.unsupported_stmt("malformed lambda", node)],
                };
                Expr::Lambda(Rc::new(self.function_def(
                    "<lambda>",
                    node.child_by_field_name("parameters"),
                    body,
                )))
            }
            other => Expr::Unsupported(other.replace('_', " ")),
        }
    }

    fn sequence(&self, node: Node<'_>) -> Result<Vec<Expr>, String> {
        named_children(node)
            .into_iter()
            .map(|child| {
                if child.kind() == "list_splat" {
                    Err("iterable unpacking".to_string())
                } else {
                    Ok(self.expr(child))
                }
            })
            .collect()
    }

    fn generators(&self, node: Node<'_>) -> Result<Vec<Comprehension>, String> {
        let mut generators: Vec<Comprehension> = Vec::new();
        for clause in named_children(node).into_iter().skip(1) {
            match clause.kind() {
                "for_in_clause" => {
                    if is_async(clause) {
                        return Err("async comprehension".into());
                    }
                    let left = clause.child_by_field_name("left");
                    let right = field_children(clause, "right");
                    let (Some(left), Some(first)) = (left, right.first()) else {
                        return Err("malformed comprehension".into());
                    };
                    let iter = if right.len() == 1 {
                        self.expr(*first)
                    } else {
                        Expr::Tuple(right.iter().map(|n| self.expr(*n)).collect())
                    };
                    generators.push(Comprehension {
                        target: self.target(left),
                        iter,
                        conditions: Vec::new(),
                    });
                }
                "if_clause" => {
                    let (Some(current), Some(condition)) =
                        (generators.last_mut(), named_children(clause).first().copied())
                    else {
                        return Err("malformed comprehension".into());
                    };
                    current.conditions.push(self.expr(condition));
                }
                _ => {}
            }
        }
        if generators.is_empty() {
            return Err("malformed comprehension".into());
        }
        Ok(generators)
    }

    fn call(&self, node: Node<'_>) -> Expr {
        let Some(function) = node.child_by_field_name("function") else {
            return Expr::Unsupported("malformed call".into());
        };
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        match node.child_by_field_name("arguments") {
            Some(arguments) if arguments.kind() == "generator_expression" => {
                args.push(self.expr(arguments));
            }
            Some(arguments) => {
                for arg in named_children(arguments) {
                    match arg.kind() {
                        "keyword_argument" => match (
                            arg.child_by_field_name("name"),
                            arg.child_by_field_name("value"),
                        ) {
                            (Some(name), Some(value)) => {
                                kwargs.push((self.text(name).to_string(), self.expr(value)))
                            }
                            _ => return Expr::Unsupported("malformed keyword argument".into()),
                        },
                        "list_splat" | "dictionary_splat" => {
                            return Expr::Unsupported("argument unpacking".into())
                        }
                        _ => args.push(self.expr(arg)),
                    }
                }
            }
            None => {}
        }
        Expr::Call {
            func: Box::new(self.expr(function)),
            args,
            kwargs,
        }
    }

    fn comparison(&self, node: Node<'_>) -> Expr {
        let mut operands = Vec::new();
        let mut tokens: Vec<String> = Vec::new();
        for child in all_children(node) {
            if child.is_named() {
                if child.kind() != "comment" {
                    operands.push(self.expr(child));
                }
                continue;
            }
            // `not in` and `is not` may arrive as two tokens
            if tokens.len() == operands.len() && !tokens.is_empty() {
                let previous = tokens.pop().unwrap_or_default();
                tokens.push(format!("{previous} {}", child.kind()));
            } else {
                tokens.push(child.kind().to_string());
            }
        }
        let ops: Option<Vec<CmpOp>> = tokens.iter().map(|t| CmpOp::from_token(t)).collect();
        match ops {
            Some(ops) if operands.len() == ops.len() + 1 => {
                let mut operands = operands.into_iter();
                let first = operands.next().unwrap_or(Expr::Literal(Literal::None));
                Expr::Compare(Box::new(first), ops.into_iter().zip(operands).collect())
            }
            _ => Expr::Unsupported("comparison".into()),
        }
    }

    fn string_parts(&self, node: Node<'_>) -> Result<Vec<FStringPart>, String> {
        let mut parts = Vec::new();
        let mut raw = false;
        let mut formatted = false;
        for child in all_children(node) {
            match child.kind() {
                "string_start" => {
                    let prefix = self
                        .text(child)
                        .trim_end_matches(['"', '\''])
                        .to_ascii_lowercase();
                    if prefix.contains('b') {
                        return Err("bytes literal".into());
                    }
                    raw = prefix.contains('r');
                    formatted = prefix.contains('f');
                }
                "string_content" => {
                    let text = self.text(child);
                    let mut decoded = if raw { text.to_string() } else { decode_escapes(text) };
                    if formatted {
                        decoded = decoded.replace("{{", "{").replace("}}", "}");
                    }
                    push_text(&mut parts, &decoded);
                }
                "escape_sequence" => push_text(&mut parts, &decode_escapes(self.text(child))),
                "escape_interpolation" => {
                    push_text(&mut parts, &self.text(child)[..1]);
                }
                "interpolation" => parts.push(self.interpolation(child)?),
                _ => {}
            }
        }
        Ok(parts)
    }

    fn interpolation(&self, node: Node<'_>) -> Result<FStringPart, String> {
        let expression = node
            .child_by_field_name("expression")
            .or_else(|| named_children(node).first().copied())
            .ok_or_else(|| "empty interpolation".to_string())?;
        let mut expr = self.expr(expression);
        let mut format_spec = None;
        for child in all_children(node) {
            match child.kind() {
                "=" => return Err("self-documenting f-string".into()),
                "type_conversion" => {
                    let conversion = match self.text(child) {
                        "!r" => "repr",
                        "!s" => "str",
                        _ => return Err("f-string conversion".into()),
                    };
                    expr = Expr::Call {
                        func: Box::new(Expr::name(conversion)),
                        args: vec![expr],
                        kwargs: Vec::new(),
                    };
                }
                "format_specifier" => {
                    if !named_children(child).is_empty() {
                        return Err("nested format specifier".into());
                    }
                    format_spec = Some(self.text(child).trim_start_matches(':').to_string());
                }
                _ => {}
            }
        }
        Ok(FStringPart::Value { expr, format_spec })
    }
}

fn push_text(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Text(previous)) = parts.last_mut() {
        previous.push_str(text);
    } else {
        parts.push(FStringPart::Text(text.to_string()));
    }
}

fn finish_string(parts: Vec<FStringPart>) -> Expr {
    if parts.iter().all(|part| matches!(part, FStringPart::Text(_))) {
        let text: String = parts
            .into_iter()
            .map(|part| match part {
                FStringPart::Text(text) => text,
                FStringPart::Value { .. } => String::new(),
            })
            .collect();
        return Expr::str(&text);
    }
    Expr::FString(parts)
}

fn parse_integer(text: &str) -> Expr {
    let cleaned = text.replace('_', "").to_ascii_lowercase();
    if cleaned.ends_with('j') {
        return Expr::Unsupported("complex literal".into());
    }
    let parsed = if let Some(hex) = cleaned.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = cleaned.strip_prefix("0o") {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = cleaned.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        cleaned.parse()
    };
    match parsed {
        Ok(value) => Expr::int(value),
        Err(_) => Expr::Unsupported(format!("integer literal {text}")),
    }
}

fn parse_float(text: &str) -> Expr {
    let cleaned = text.replace('_', "");
    if cleaned.ends_with(['j', 'J']) {
        return Expr::Unsupported("complex literal".into());
    }
    match cleaned.parse::<f64>() {
        Ok(value) => Expr::Literal(Literal::Float(value)),
        Err(_) => Expr::Unsupported(format!("float literal {text}")),
    }
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, count: usize) -> Option<char> {
    let mut digits = String::with_capacity(count);
    for _ in 0..count {
        digits.push(chars.next_if(char::is_ascii_hexdigit)?);
    }
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}

/// Resolve backslash escapes in a non-raw string literal.
pub(crate) fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                match take_hex(&mut chars, width) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(kind);
                    }
                }
            }
            Some(first @ '0'..='7') => {
                let mut value = first.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.next_if(|c| c.is_digit(8)) {
                        Some(digit) => value = value * 8 + digit.to_digit(8).unwrap_or(0),
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::python::ContractParser;

    fn lower(code: &str) -> Vec<Stmt> {
        let mut parser = ContractParser::new().unwrap();
        let source = parser.parse_source(code, "snippet.py").unwrap();
        lower_module(&source)
    }

    #[test]
    fn escapes_are_decoded() {
        assert_eq!(decode_escapes(r"a\nb\t\x41é\\"), "a\nb\tA\u{e9}\\");
        assert_eq!(decode_escapes(r"\101\q"), "A\\q");
    }

    #[test]
    fn chained_assignment_keeps_every_target() {
        let body = lower("a = b = 3\n");
        match &body[0] {
            Stmt::Assign { targets, value } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(value, &Expr::int(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comparison_merges_two_word_operators() {
        let body = lower("x not in y\na is not b\n");
        let ops: Vec<CmpOp> = body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Expr(Expr::Compare(_, rest)) => Some(rest[0].0),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![CmpOp::NotIn, CmpOp::IsNot]);
    }

    #[test]
    fn unsupported_constructs_are_deferred() {
        let body = lower("with open('f') as fh:\n    pass\nx = 1\n");
        assert!(matches!(body[0], Stmt::Unsupported { line: 1, .. }));
        assert!(matches!(body[1], Stmt::Assign { .. }));
    }

    #[test]
    fn fstring_parts_keep_format_spec() {
        let body = lower("f\"{x:.2f} and {{y}}\"\n");
        match &body[0] {
            Stmt::Expr(Expr::FString(parts)) => {
                assert!(matches!(
                    &parts[0],
                    FStringPart::Value { format_spec: Some(spec), .. } if spec == ".2f"
                ));
                assert_eq!(parts[1], FStringPart::Text(" and {y}".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn annotation_without_value_is_pass() {
        assert_eq!(lower("x: int\n"), vec![Stmt::Pass]);
    }
}
