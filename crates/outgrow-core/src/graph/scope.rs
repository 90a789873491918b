//! Free-name collection over a declaration's syntax tree.
//!
//! Walks a top-level statement and reports every name it reads that is not
//! bound by an enclosing function, class or comprehension scope inside that
//! same statement, and is not a Python builtin. Bindings are hoisted per
//! function scope the way Python does it, so a name assigned anywhere in a
//! function body is local throughout that body.

use std::collections::HashSet;
use std::ops::Range;

use serde::Serialize;
use tree_sitter::Node;

use crate::errors::OutgrowResult;
use crate::graph::EdgeKind;
use crate::program::imports::ImportTable;
use crate::program::parser::parse_python;
use crate::program::syntax::{dotted_path, named_children, node_text};

const PYTHON_BUILTINS: &[&str] = &[
    "__build_class__", "__debug__", "__doc__", "__file__", "__import__", "__name__",
    "__package__", "__spec__", "__loader__", "__builtins__", "abs", "aiter", "all", "anext",
    "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable", "chr",
    "classmethod", "compile", "complex", "copyright", "credits", "delattr", "dict", "dir",
    "divmod", "enumerate", "eval", "exec", "exit", "filter", "float", "format", "frozenset",
    "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input", "int",
    "isinstance", "issubclass", "iter", "len", "license", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "None", "True",
    "False", "Ellipsis", "NotImplemented", "ArithmeticError", "AssertionError",
    "AttributeError", "BaseException", "BaseExceptionGroup", "BlockingIOError",
    "BrokenPipeError", "BufferError", "BytesWarning", "ChildProcessError",
    "ConnectionAbortedError", "ConnectionError", "ConnectionRefusedError",
    "ConnectionResetError", "DeprecationWarning", "EOFError", "EncodingWarning",
    "EnvironmentError", "Exception", "ExceptionGroup", "FileExistsError",
    "FileNotFoundError", "FloatingPointError", "FutureWarning", "GeneratorExit", "IOError",
    "ImportError", "ImportWarning", "IndentationError", "IndexError", "InterruptedError",
    "IsADirectoryError", "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError",
    "ModuleNotFoundError", "NameError", "NotADirectoryError", "NotImplementedError",
    "OSError", "OverflowError", "PendingDeprecationWarning", "PermissionError",
    "ProcessLookupError", "RecursionError", "ReferenceError", "ResourceWarning",
    "RuntimeError", "RuntimeWarning", "StopAsyncIteration", "StopIteration", "SyntaxError",
    "SyntaxWarning", "SystemError", "SystemExit", "TabError", "TimeoutError", "TypeError",
    "UnboundLocalError", "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeError",
    "UnicodeTranslateError", "UnicodeWarning", "UserWarning", "ValueError", "Warning",
    "ZeroDivisionError",
];

pub fn is_builtin(name: &str) -> bool {
    PYTHON_BUILTINS.contains(&name)
}

/// One read of a free name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameUse {
    pub name: String,
    pub kind: EdgeKind,
    /// Full dotted chain the name was read through, e.g. `app.render`.
    pub path: String,
    /// Byte range of `path` relative to the start of the walked text.
    pub range: Range<usize>,
    /// 1-based line within the walked text.
    pub line: usize,
}

/// Collect free-name uses of a top-level statement node.
///
/// `base` is subtracted from byte offsets so ranges are relative to the
/// declaration's own text.
pub fn collect_uses(node: Node<'_>, source: &str, base: usize) -> Vec<NameUse> {
    let mut walker = Walker {
        source,
        base,
        base_row: source[..base].matches('\n').count(),
        scopes: Vec::new(),
        uses: Vec::new(),
    };
    walker.visit_top_level(node);
    walker.uses
}

/// Parse a snippet of generated code and collect its free-name uses.
pub fn snippet_uses(text: &str) -> OutgrowResult<Vec<NameUse>> {
    let tree = parse_python(text)?;
    let mut uses = Vec::new();
    for statement in named_children(tree.root_node()) {
        if statement.kind() == "comment" {
            continue;
        }
        uses.extend(collect_uses(statement, text, 0));
    }
    Ok(uses)
}

/// Distinct names in first-use order.
pub fn distinct_names(uses: &[NameUse]) -> Vec<&str> {
    let mut seen = HashSet::new();
    uses.iter()
        .map(|u| u.name.as_str())
        .filter(|name| seen.insert(*name))
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Function,
    Class,
    Comprehension,
}

struct Scope {
    kind: ScopeKind,
    bound: HashSet<String>,
    declared_global: HashSet<String>,
}

struct Walker<'s> {
    source: &'s str,
    base: usize,
    base_row: usize,
    scopes: Vec<Scope>,
    uses: Vec<NameUse>,
}

impl<'s> Walker<'s> {
    fn visit_top_level(&mut self, node: Node<'_>) {
        match node.kind() {
            "decorated_definition" => {
                for child in named_children(node) {
                    if child.kind() == "decorator" {
                        self.visit(child, EdgeKind::Decorates);
                    }
                }
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.visit(definition, EdgeKind::Reads);
                }
            }
            "expression_statement" => self.visit(node, EdgeKind::Reads),
            _ => self.visit(node, EdgeKind::Reads),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        let innermost = self.scopes.len().saturating_sub(1);
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if scope.declared_global.contains(name) {
                return false;
            }
            // Class bodies are not visible from nested function scopes
            if scope.kind == ScopeKind::Class && index != innermost {
                continue;
            }
            if scope.bound.contains(name) {
                return true;
            }
        }
        false
    }

    fn record(&mut self, name: &str, node: Node<'_>, path: String, kind: EdgeKind) {
        if is_builtin(name) || self.is_local(name) {
            return;
        }
        let line = node.start_position().row + 1 - self.base_row;
        self.uses.push(NameUse {
            name: name.to_string(),
            kind,
            path,
            range: node.start_byte() - self.base..node.end_byte() - self.base,
            line,
        });
    }

    fn visit_children(&mut self, node: Node<'_>, ctx: EdgeKind) {
        for child in named_children(node) {
            self.visit(child, ctx);
        }
    }

    fn visit(&mut self, node: Node<'_>, ctx: EdgeKind) {
        match node.kind() {
            "identifier" => {
                let name = node_text(node, self.source).to_string();
                self.record(&name, node, name.clone(), ctx);
            }
            "attribute" => match dotted_path(node, self.source) {
                Some(path) => {
                    let root = path.split('.').next().unwrap_or(&path).to_string();
                    self.record(&root, node, path.clone(), ctx);
                }
                None => {
                    if let Some(object) = node.child_by_field_name("object") {
                        self.visit(object, ctx);
                    }
                }
            },
            "call" => {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee_ctx = match ctx {
                        EdgeKind::Decorates | EdgeKind::Inherits => ctx,
                        _ => EdgeKind::Calls,
                    };
                    self.visit(function, callee_ctx);
                }
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    self.visit(arguments, ctx);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, ctx);
                }
            }
            "function_definition" => self.visit_function(node, ctx),
            "class_definition" => self.visit_class(node, ctx),
            "decorated_definition" => {
                for child in named_children(node) {
                    if child.kind() == "decorator" {
                        self.visit(child, ctx);
                    }
                }
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.visit(definition, ctx);
                }
            }
            "lambda" => self.visit_lambda(node, ctx),
            "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
            | "generator_expression" => self.visit_comprehension(node, ctx),
            "assignment" | "augmented_assignment" => {
                let assigns = if self.scopes.is_empty() && ctx == EdgeKind::Reads {
                    EdgeKind::Assigns
                } else {
                    ctx
                };
                if let Some(right) = node.child_by_field_name("right") {
                    self.visit(right, assigns);
                }
                if let Some(annotation) = node.child_by_field_name("type") {
                    self.visit(annotation, ctx);
                }
                if let Some(left) = node.child_by_field_name("left") {
                    if node.kind() == "augmented_assignment" {
                        self.visit(left, ctx);
                    } else {
                        self.visit_store_target(left, ctx);
                    }
                }
            }
            "named_expression" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, ctx);
                }
            }
            "for_statement" | "for_in_clause" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.visit_store_target(left, ctx);
                }
                for field in ["right", "body", "alternative"] {
                    let mut cursor = node.walk();
                    let children: Vec<Node<'_>> =
                        node.children_by_field_name(field, &mut cursor).collect();
                    for child in children {
                        self.visit(child, ctx);
                    }
                }
            }
            "as_pattern" => {
                if let Some(value) = node.named_child(0) {
                    self.visit(value, ctx);
                }
            }
            "except_clause" => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
                let mut after_as = false;
                for child in children {
                    if child.kind() == "as" {
                        after_as = true;
                        continue;
                    }
                    if after_as && child.kind() == "identifier" {
                        after_as = false;
                        continue;
                    }
                    if child.is_named() {
                        self.visit(child, ctx);
                    }
                }
            }
            "case_clause" => {
                for field in ["guard", "consequence"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.visit(child, ctx);
                    }
                }
            }
            "import_statement" | "import_from_statement" | "future_import_statement"
            | "global_statement" | "nonlocal_statement" | "dotted_name" | "comment"
            | "string_content" | "escape_sequence" | "case_pattern" => {}
            _ => self.visit_children(node, ctx),
        }
    }

    /// Assignment targets: plain names are stores, but attribute and
    /// subscript targets read their object.
    fn visit_store_target(&mut self, node: Node<'_>, ctx: EdgeKind) {
        match node.kind() {
            "identifier" => {}
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object, ctx);
                }
            }
            "subscript" => self.visit_children(node, ctx),
            _ => {
                for child in named_children(node) {
                    self.visit_store_target(child, ctx);
                }
            }
        }
    }

    fn visit_parameters(&mut self, parameters: Node<'_>, ctx: EdgeKind) -> HashSet<String> {
        let mut bound = HashSet::new();
        for param in named_children(parameters) {
            match param.kind() {
                "identifier" => {
                    bound.insert(node_text(param, self.source).to_string());
                }
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = param.child_by_field_name("name") {
                        bound.insert(node_text(name, self.source).to_string());
                    }
                    for field in ["type", "value"] {
                        if let Some(child) = param.child_by_field_name(field) {
                            self.visit(child, ctx);
                        }
                    }
                }
                "typed_parameter" => {
                    for child in named_children(param) {
                        if child.kind() == "type" {
                            self.visit(child, ctx);
                        } else {
                            collect_pattern_names(child, self.source, &mut bound);
                        }
                    }
                }
                "list_splat_pattern" | "dictionary_splat_pattern" | "tuple_pattern" => {
                    collect_pattern_names(param, self.source, &mut bound);
                }
                _ => {}
            }
        }
        bound
    }

    fn visit_function(&mut self, node: Node<'_>, ctx: EdgeKind) {
        let outer_ctx = match ctx {
            EdgeKind::Decorates => EdgeKind::Reads,
            other => other,
        };
        let params = match node.child_by_field_name("parameters") {
            Some(parameters) => self.visit_parameters(parameters, outer_ctx),
            None => HashSet::new(),
        };
        if let Some(return_type) = node.child_by_field_name("return_type") {
            self.visit(return_type, outer_ctx);
        }
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut bound = params;
        let mut declared_global = HashSet::new();
        hoist_bindings(body, self.source, &mut bound, &mut declared_global);
        for name in &declared_global {
            bound.remove(name);
        }
        self.scopes.push(Scope {
            kind: ScopeKind::Function,
            bound,
            declared_global,
        });
        self.visit(body, EdgeKind::Reads);
        self.scopes.pop();
    }

    fn visit_class(&mut self, node: Node<'_>, ctx: EdgeKind) {
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let base_ctx = if self.scopes.is_empty() {
                EdgeKind::Inherits
            } else {
                ctx
            };
            self.visit(superclasses, base_ctx);
        }
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut bound = HashSet::new();
        let mut declared_global = HashSet::new();
        hoist_bindings(body, self.source, &mut bound, &mut declared_global);
        self.scopes.push(Scope {
            kind: ScopeKind::Class,
            bound,
            declared_global,
        });
        self.visit(body, EdgeKind::Reads);
        self.scopes.pop();
    }

    fn visit_lambda(&mut self, node: Node<'_>, ctx: EdgeKind) {
        let bound = match node.child_by_field_name("parameters") {
            Some(parameters) => self.visit_parameters(parameters, ctx),
            None => HashSet::new(),
        };
        self.scopes.push(Scope {
            kind: ScopeKind::Function,
            bound,
            declared_global: HashSet::new(),
        });
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, ctx);
        }
        self.scopes.pop();
    }

    fn visit_comprehension(&mut self, node: Node<'_>, ctx: EdgeKind) {
        let children = named_children(node);
        let clauses: Vec<Node<'_>> = children
            .iter()
            .copied()
            .filter(|c| c.kind() == "for_in_clause" || c.kind() == "if_clause")
            .collect();

        // The first iterable is evaluated in the enclosing scope
        let first_for = clauses.iter().find(|c| c.kind() == "for_in_clause").copied();
        if let Some(right) = first_for.and_then(|c| c.child_by_field_name("right")) {
            self.visit(right, ctx);
        }

        let mut bound = HashSet::new();
        for clause in clauses.iter().filter(|c| c.kind() == "for_in_clause") {
            if let Some(left) = clause.child_by_field_name("left") {
                collect_pattern_names(left, self.source, &mut bound);
            }
        }
        self.scopes.push(Scope {
            kind: ScopeKind::Comprehension,
            bound,
            declared_global: HashSet::new(),
        });
        for clause in &clauses {
            if Some(*clause) == first_for {
                continue;
            }
            if clause.kind() == "for_in_clause" {
                if let Some(right) = clause.child_by_field_name("right") {
                    self.visit(right, ctx);
                }
            } else {
                self.visit_children(*clause, ctx);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body, ctx);
        }
        self.scopes.pop();
    }
}

/// Names bound by a target pattern (`a`, `(a, b)`, `*rest`).
fn collect_pattern_names(node: Node<'_>, source: &str, names: &mut HashSet<String>) {
    match node.kind() {
        "identifier" => {
            names.insert(node_text(node, source).to_string());
        }
        "attribute" | "subscript" => {}
        _ => {
            for child in named_children(node) {
                collect_pattern_names(child, source, names);
            }
        }
    }
}

/// Collect names bound anywhere in a function or class body, without
/// descending into nested scopes.
fn hoist_bindings(
    node: Node<'_>,
    source: &str,
    bound: &mut HashSet<String>,
    declared_global: &mut HashSet<String>,
) {
    match node.kind() {
        "function_definition" | "class_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                bound.insert(node_text(name, source).to_string());
            }
            return;
        }
        "lambda" | "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
        | "generator_expression" => return,
        "assignment" | "augmented_assignment" | "for_statement" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_pattern_names(left, source, bound);
            }
        }
        "named_expression" => {
            if let Some(name) = node.child_by_field_name("name") {
                bound.insert(node_text(name, source).to_string());
            }
        }
        "as_pattern_target" => {
            collect_pattern_names(node, source, bound);
            return;
        }
        "except_clause" => {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            for pair in children.windows(2) {
                if pair[0].kind() == "as" && pair[1].kind() == "identifier" {
                    bound.insert(node_text(pair[1], source).to_string());
                }
            }
        }
        "import_statement" | "import_from_statement" => {
            let mut table = ImportTable::default();
            table.record(node, source, 0);
            for entry in table.entries {
                bound.insert(entry.binding.local_name().to_string());
            }
            return;
        }
        "global_statement" | "nonlocal_statement" => {
            for child in named_children(node) {
                if child.kind() == "identifier" {
                    declared_global.insert(node_text(child, source).to_string());
                }
            }
            return;
        }
        _ => {}
    }
    for child in named_children(node) {
        hoist_bindings(child, source, bound, declared_global);
    }
}
