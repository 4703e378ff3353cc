//! Python contract front end built on tree-sitter.
//!
//! The grammar handles the *code*; contracts are recovered from comment
//! tokens associated with each definition:
//!
//! - the run of full-line comments directly above the definition (blank lines
//!   skipped, decorators treated as part of the definition);
//! - every comment inside the definition's body that does not belong to a
//!   nested definition.
//!
//! Leading clauses come first, body clauses second, each in source order.

use std::path::Path;

use tracing::debug;
use tree_sitter::{Language, Node, Parser, Tree};

use super::common::{AnalyzableUnit, ContractClauses, Parameter, SourceLocation};
use super::contracts::{extract_clauses, leading_comment_lines, CommentToken};
use super::symbols::{SymbolTable, TypeSymbol};
use crate::core::errors::{Result, SpecLensError};
use crate::core::file_utils::FileReader;

#[cfg(test)]
#[path = "python_tests.rs"]
mod tests;

const LANGUAGE_NAME: &str = "python";

/// A parsed Python file. Shared by the contract parser and the module loader
/// so each file is parsed exactly once.
pub struct PythonSource {
    path: String,
    text: String,
    tree: Tree,
}

impl PythonSource {
    /// Path the source was read from (or the label given to in-memory text)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full source text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Syntax tree
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Root `module` node
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Text covered by a node of this tree
    pub fn node_text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.text.as_bytes()).unwrap_or_default()
    }

    /// Module name (file stem), bound to `__name__` at load time
    pub fn module_name(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("module")
            .to_string()
    }
}

impl std::fmt::Debug for PythonSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonSource")
            .field("path", &self.path)
            .field("bytes", &self.text.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinitionKind {
    Function,
    Class,
}

/// A `def` or `class` node plus the positions the comment scan needs.
struct Definition<'t> {
    node: Node<'t>,
    kind: DefinitionKind,
    name: String,
    /// First row, decorators included
    outer_start_row: usize,
    /// Column of the first token, decorators included
    indent: usize,
    /// Position just after the header colon
    header_end: (usize, usize),
    /// Last row, extended over trailing comments indented into the body
    end_row: usize,
    enclosing_class: Option<String>,
}

impl Definition<'_> {
    fn contains(&self, other: &Definition<'_>) -> bool {
        other.node.id() != self.node.id()
            && other.node.start_byte() >= self.node.start_byte()
            && other.node.end_byte() <= self.node.end_byte()
    }

    fn body_contains(&self, comment: &CommentToken) -> bool {
        let (row, column) = self.header_end;
        let after_header = comment.row > row || (comment.row == row && comment.column >= column);
        after_header && comment.row <= self.end_row
    }
}

/// Recovers [`AnalyzableUnit`]s from Python source.
pub struct ContractParser {
    /// Tree-sitter parser for Python
    parser: Parser,
}

impl ContractParser {
    /// Create a new parser
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language).map_err(|e| {
            SpecLensError::parse(LANGUAGE_NAME, format!("Failed to set Python language: {e:?}"))
        })?;

        Ok(Self { parser })
    }

    /// Parse source text. Any syntax error fails the whole file.
    pub fn parse_source(
        &mut self,
        text: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<PythonSource> {
        let text = text.into();
        let path = path.into();
        let tree = self.parser.parse(&text, None).ok_or_else(|| {
            SpecLensError::parse_with_location(
                LANGUAGE_NAME,
                "Failed to parse Python source code",
                path.clone(),
                None,
                None,
            )
        })?;

        if tree.root_node().has_error() {
            let (message, line, column) = first_syntax_error(tree.root_node())
                .unwrap_or_else(|| ("invalid syntax".to_string(), None, None));
            return Err(SpecLensError::parse_with_location(
                LANGUAGE_NAME,
                message,
                path,
                line,
                column,
            ));
        }

        Ok(PythonSource { path, text, tree })
    }

    /// Read and parse a file
    pub fn parse_file(&mut self, path: &Path) -> Result<PythonSource> {
        let text = FileReader::read_to_string(path)?;
        self.parse_source(text, path.display().to_string())
    }

    /// Parse text and return its units in one step
    pub fn extract_units(
        &mut self,
        text: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Vec<AnalyzableUnit>> {
        let source = self.parse_source(text, path)?;
        Ok(self.units(&source))
    }

    /// Every function and method in the file, in source order.
    pub fn units(&self, source: &PythonSource) -> Vec<AnalyzableUnit> {
        let lines: Vec<&str> = source.text().lines().collect();

        let mut comments = Vec::new();
        collect_comments(source.root(), source, &mut comments);
        comments.sort_by_key(|c| (c.row, c.column));

        let mut definitions = Vec::new();
        collect_definitions(source.root(), source, &lines, &mut definitions);

        let symbols = build_symbol_table(&definitions, &comments, &lines);

        let units: Vec<AnalyzableUnit> = definitions
            .iter()
            .filter(|def| def.kind == DefinitionKind::Function)
            .map(|def| {
                let clauses = scan_clauses(def, &definitions, &comments, &lines);
                let enclosing_type = symbols.enclosing_type(def.node.id()).map(str::to_string);
                let invariants = enclosing_type
                    .as_deref()
                    .map(|class| symbols.invariants_of(class).to_vec())
                    .unwrap_or_default();

                let body_rows = def
                    .node
                    .child_by_field_name("body")
                    .map(|body| body.end_position().row - body.start_position().row + 1)
                    .unwrap_or(0);

                AnalyzableUnit {
                    name: def.name.clone(),
                    enclosing_type,
                    parameters: extract_parameters(def.node, source),
                    requires: clauses.requires,
                    ensures: clauses.ensures,
                    invariants,
                    source_line: def.node.start_position().row + 1,
                    size_in_lines: body_rows,
                    location: SourceLocation {
                        file_path: source.path().to_string(),
                        start_line: def.outer_start_row + 1,
                        end_line: def.node.end_position().row + 1,
                    },
                }
            })
            .collect();

        debug!(file = %source.path(), units = units.len(), "extracted analyzable units");
        units
    }
}

/// Locate the first ERROR or MISSING node for the diagnostic.
fn first_syntax_error(node: Node<'_>) -> Option<(String, Option<usize>, Option<usize>)> {
    if node.is_error() || node.is_missing() {
        let position = node.start_position();
        let message = if node.is_missing() {
            format!("missing '{}'", node.kind())
        } else {
            "invalid syntax".to_string()
        };
        return Some((message, Some(position.row + 1), Some(position.column + 1)));
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_syntax_error)
}

fn collect_comments(node: Node<'_>, source: &PythonSource, out: &mut Vec<CommentToken>) {
    if node.kind() == "comment" {
        let position = node.start_position();
        out.push(CommentToken {
            row: position.row,
            column: position.column,
            text: source.node_text(node).to_string(),
        });
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_comments(child, source, out);
    }
}

fn collect_definitions<'t>(
    node: Node<'t>,
    source: &PythonSource,
    lines: &[&str],
    out: &mut Vec<Definition<'t>>,
) {
    let kind = match node.kind() {
        "function_definition" => Some(DefinitionKind::Function),
        "class_definition" => Some(DefinitionKind::Class),
        _ => None,
    };

    if let Some(kind) = kind {
        if let Some(name_node) = node.child_by_field_name("name") {
            let outer = node
                .parent()
                .filter(|parent| parent.kind() == "decorated_definition")
                .unwrap_or(node);
            let indent = outer.start_position().column;
            let end_row = extend_over_trailing_comments(lines, node.end_position().row, indent);

            out.push(Definition {
                node,
                kind,
                name: source.node_text(name_node).to_string(),
                outer_start_row: outer.start_position().row,
                indent,
                header_end: header_end(node),
                end_row,
                enclosing_class: enclosing_class_name(node, source),
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_definitions(child, source, lines, out);
    }
}

/// Position right after the `:` closing a definition header.
fn header_end(node: Node<'_>) -> (usize, usize) {
    let mut cursor = node.walk();
    let colon = node.children(&mut cursor).find(|child| child.kind() == ":");
    match colon {
        Some(colon) => {
            let end = colon.end_position();
            (end.row, end.column)
        }
        None => {
            let start = node.start_position();
            (start.row, start.column)
        }
    }
}

/// Comments indented past the definition that follow its last statement
/// still belong to its body.
fn extend_over_trailing_comments(lines: &[&str], end_row: usize, indent: usize) -> usize {
    let mut last = end_row;
    let mut row = end_row + 1;
    while let Some(line) = lines.get(row) {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            row += 1;
            continue;
        }
        if trimmed.starts_with('#') && super::contracts::indentation(line) > indent {
            last = row;
            row += 1;
            continue;
        }
        break;
    }
    last
}

/// A definition is a method iff it sits directly in a class body block.
fn enclosing_class_name(node: Node<'_>, source: &PythonSource) -> Option<String> {
    let mut parent = node.parent()?;
    if parent.kind() == "decorated_definition" {
        parent = parent.parent()?;
    }
    if parent.kind() != "block" {
        return None;
    }
    let owner = parent.parent()?;
    if owner.kind() != "class_definition" {
        return None;
    }
    owner
        .child_by_field_name("name")
        .map(|name| source.node_text(name).to_string())
}

fn build_symbol_table(
    definitions: &[Definition<'_>],
    comments: &[CommentToken],
    lines: &[&str],
) -> SymbolTable {
    let mut table = SymbolTable::new();
    for def in definitions {
        match def.kind {
            DefinitionKind::Class => {
                let clauses = scan_clauses(def, definitions, comments, lines);
                table.add_type(TypeSymbol {
                    name: def.name.clone(),
                    line: def.node.start_position().row + 1,
                    invariants: clauses.invariants,
                });
            }
            DefinitionKind::Function => {
                if let Some(class) = &def.enclosing_class {
                    table.set_enclosing(def.node.id(), class.clone());
                }
            }
        }
    }
    table
}

/// Leading block, then body comments not claimed by a nested definition.
fn scan_clauses(
    def: &Definition<'_>,
    definitions: &[Definition<'_>],
    comments: &[CommentToken],
    lines: &[&str],
) -> ContractClauses {
    let leading = leading_comment_lines(lines, def.outer_start_row, def.indent);
    let mut clauses = extract_clauses(leading.iter().copied());

    let nested: Vec<(usize, usize)> = definitions
        .iter()
        .filter(|other| def.contains(other))
        .map(|other| (other.outer_start_row, other.end_row))
        .collect();

    let body = comments
        .iter()
        .filter(|comment| def.body_contains(comment))
        .filter(|comment| {
            !nested
                .iter()
                .any(|(start, end)| comment.row >= *start && comment.row <= *end)
        })
        .map(|comment| comment.text.as_str());

    clauses.extend(extract_clauses(body));
    clauses
}

/// Positional-or-keyword parameters, in order. Collection stops at `*`,
/// `*args` or `**kwargs`.
fn extract_parameters(node: Node<'_>, source: &PythonSource) -> Vec<Parameter> {
    let Some(parameters) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut result = Vec::new();
    let mut cursor = parameters.walk();
    for child in parameters.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => result.push(Parameter::named(source.node_text(child))),
            "typed_parameter" => {
                let Some(name) = child.named_child(0) else {
                    continue;
                };
                if name.kind() != "identifier" {
                    break;
                }
                result.push(Parameter {
                    name: source.node_text(name).to_string(),
                    annotation: child
                        .child_by_field_name("type")
                        .map(|t| source.node_text(t).to_string()),
                    has_default: false,
                });
            }
            "default_parameter" | "typed_default_parameter" => {
                let Some(name) = child.child_by_field_name("name") else {
                    continue;
                };
                result.push(Parameter {
                    name: source.node_text(name).to_string(),
                    annotation: child
                        .child_by_field_name("type")
                        .map(|t| source.node_text(t).to_string()),
                    has_default: true,
                });
            }
            "positional_separator" => {}
            _ => break,
        }
    }
    result
}
