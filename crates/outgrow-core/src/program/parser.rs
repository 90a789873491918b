//! Python parsing via native tree-sitter, and extraction of top-level
//! declarations from the resulting tree.

use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use crate::errors::{OutgrowError, OutgrowResult};
use crate::program::imports::ImportTable;
use crate::program::syntax::{callee_path, dotted_path, named_children, node_text};
use crate::program::{CallInfo, DeclKind, Declaration, Decorator, ProgramModel, Span};

/// Parse Python source text into a tree-sitter tree.
///
/// Any ERROR or MISSING node makes the whole input invalid.
pub fn parse_python(source: &str) -> OutgrowResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| OutgrowError::Config(format!("Failed to set language: {e}")))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| OutgrowError::Parse {
            line: 1,
            column: 1,
            message: "parser produced no tree".to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let position = bad.start_position();
        let message = if bad.is_missing() {
            format!("missing {}", bad.kind())
        } else {
            let snippet: String = node_text(bad, source).chars().take(40).collect();
            format!("invalid syntax near {snippet:?}")
        };
        return Err(OutgrowError::Parse {
            line: position.row + 1,
            column: position.column + 1,
            message,
        });
    }
    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

/// Build the program model for a whole module.
pub(crate) fn build_program(source: &str) -> OutgrowResult<ProgramModel> {
    let tree = parse_python(source)?;
    let root = tree.root_node();

    let mut declarations: Vec<Declaration> = Vec::new();
    let mut imports = ImportTable::default();
    let mut docstring = None;
    // (start_byte, start_row) of a comment block directly above the next statement
    let mut pending_comment: Option<(usize, usize)> = None;
    let mut last_comment_row: Option<usize> = None;
    let mut ordinal = 0usize;
    let mut seen_statement = false;

    for (node_index, node) in named_children(root).into_iter().enumerate() {
        let start_row = node.start_position().row;

        if node.kind() == "comment" {
            let contiguous = last_comment_row.is_some_and(|row| row + 1 == start_row);
            if !contiguous {
                pending_comment = Some((node.start_byte(), start_row));
            }
            last_comment_row = Some(node.end_position().row);
            continue;
        }

        let attached = match (pending_comment, last_comment_row) {
            (Some((start, _)), Some(row)) if row + 1 == start_row => Some(start),
            _ => None,
        };
        pending_comment = None;
        last_comment_row = None;

        if !seen_statement && is_docstring(node) {
            docstring = Some(node_text(node, source).to_string());
            seen_statement = true;
            continue;
        }
        seen_statement = true;

        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                imports.record(node, source, ordinal);
            }
            _ => {
                let start_byte = attached.unwrap_or(node.start_byte());
                let decl = extract_declaration(
                    node,
                    source,
                    declarations.len(),
                    ordinal,
                    node_index,
                    start_byte,
                );
                declarations.push(decl);
            }
        }
        ordinal += 1;
    }

    debug!(
        declarations = declarations.len(),
        imports = imports.entries.len(),
        "parsed program"
    );

    Ok(ProgramModel::from_parts(
        source.to_string(),
        tree,
        declarations,
        imports,
        docstring,
    ))
}

fn is_docstring(node: Node<'_>) -> bool {
    node.kind() == "expression_statement"
        && node.named_child_count() == 1
        && node.named_child(0).is_some_and(|c| c.kind() == "string")
}

fn extract_declaration(
    node: Node<'_>,
    source: &str,
    id: usize,
    ordinal: usize,
    node_index: usize,
    start_byte: usize,
) -> Declaration {
    let end_byte = node.end_byte();
    let text = source[start_byte..end_byte].to_string();
    let start_line = source[..start_byte].matches('\n').count() + 1;
    let mut decl = Declaration {
        id,
        kind: DeclKind::Statement,
        names: Vec::new(),
        span: Span {
            start_byte,
            end_byte,
            start_line,
            end_line: node.end_position().row + 1,
        },
        ordinal,
        text,
        non_relocatable: None,
        decorators: Vec::new(),
        bases: Vec::new(),
        call: None,
        is_async: false,
        return_annotation: None,
        node_index,
        node_offset: node.start_byte() - start_byte,
    };

    match node.kind() {
        "decorated_definition" => {
            for child in named_children(node) {
                if child.kind() == "decorator" {
                    decl.decorators.push(decorator_info(child, source, start_byte));
                }
            }
            if let Some(definition) = node.child_by_field_name("definition") {
                fill_definition(&mut decl, definition, source);
            }
        }
        "function_definition" | "class_definition" => fill_definition(&mut decl, node, source),
        "expression_statement" => fill_expression_statement(&mut decl, node, source),
        "type_alias_statement" => {
            decl.kind = DeclKind::Assignment;
            if let Some(name) = node
                .child_by_field_name("left")
                .and_then(|left| dotted_path(left, source))
            {
                decl.names.push(name);
            }
        }
        "if_statement" | "for_statement" | "while_statement" | "try_statement"
        | "with_statement" | "match_statement" => {
            decl.names = block_bindings(node, source);
            decl.non_relocatable = Some(format!("top-level `{}` block", keyword(node)));
        }
        other => {
            decl.non_relocatable = Some(format!("unsupported top-level {other}"));
        }
    }
    decl
}

fn keyword(node: Node<'_>) -> &'static str {
    match node.kind() {
        "if_statement" => "if",
        "for_statement" => "for",
        "while_statement" => "while",
        "try_statement" => "try",
        "with_statement" => "with",
        _ => "match",
    }
}

fn fill_definition(decl: &mut Declaration, node: Node<'_>, source: &str) {
    if let Some(name) = node.child_by_field_name("name") {
        decl.names.push(node_text(name, source).to_string());
    }
    match node.kind() {
        "function_definition" => {
            decl.kind = DeclKind::Function;
            let mut cursor = node.walk();
            decl.is_async = node.children(&mut cursor).any(|c| c.kind() == "async");
            decl.return_annotation = node
                .child_by_field_name("return_type")
                .map(|t| node_text(t, source).to_string());
        }
        "class_definition" => {
            decl.kind = DeclKind::Class;
            if let Some(superclasses) = node.child_by_field_name("superclasses") {
                for base in named_children(superclasses) {
                    if base.kind() == "keyword_argument" || base.kind() == "comment" {
                        continue;
                    }
                    let path = dotted_path(base, source)
                        .unwrap_or_else(|| node_text(base, source).to_string());
                    decl.bases.push(path);
                }
            }
        }
        _ => {}
    }
}

fn fill_expression_statement(decl: &mut Declaration, node: Node<'_>, source: &str) {
    let Some(inner) = node.named_child(0) else {
        return;
    };
    match inner.kind() {
        "assignment" | "augmented_assignment" => {
            decl.kind = DeclKind::Assignment;
            let mut current = Some(inner);
            let mut value = None;
            while let Some(assignment) = current {
                if let Some(left) = assignment.child_by_field_name("left") {
                    if let Err(reason) = collect_targets(left, source, &mut decl.names) {
                        decl.non_relocatable = Some(reason);
                    }
                }
                value = assignment.child_by_field_name("right");
                current = value.filter(|v| v.kind() == "assignment");
            }
            if let Some(value) = value.filter(|v| v.kind() == "call") {
                decl.call = Some(call_info(value, source));
            }
            if decl.names.is_empty() && decl.non_relocatable.is_none() {
                decl.non_relocatable = Some("assignment without a plain name target".into());
            }
            if inner.kind() == "augmented_assignment" && decl.non_relocatable.is_none() {
                decl.non_relocatable = Some("augmented assignment".into());
            }
        }
        "call" => decl.call = Some(call_info(inner, source)),
        _ => {}
    }
}

/// Collect plain-name assignment targets. Attribute or subscript targets
/// make the binding undeterminable.
fn collect_targets(node: Node<'_>, source: &str, names: &mut Vec<String>) -> Result<(), String> {
    match node.kind() {
        "identifier" => {
            let name = node_text(node, source).to_string();
            if !names.contains(&name) {
                names.push(name);
            }
            Ok(())
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
        | "expression_list" | "parenthesized_expression" | "list_splat_pattern"
        | "list_splat" => {
            let mut result = Ok(());
            for child in named_children(node) {
                if let Err(reason) = collect_targets(child, source, names) {
                    result = Err(reason);
                }
            }
            result
        }
        "attribute" | "subscript" => Err(format!(
            "assignment to computed target `{}`",
            node_text(node, source)
        )),
        other => Err(format!("assignment to unsupported target {other}")),
    }
}

/// Names bound anywhere inside a compound statement, without entering
/// function or class bodies.
fn block_bindings(node: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    collect_block_bindings(node, source, &mut names);
    names
}

fn collect_block_bindings(node: Node<'_>, source: &str, names: &mut Vec<String>) {
    let push = |names: &mut Vec<String>, name: String| {
        if !names.contains(&name) {
            names.push(name);
        }
    };
    match node.kind() {
        "function_definition" | "class_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                push(names, node_text(name, source).to_string());
            }
            return;
        }
        "assignment" | "augmented_assignment" => {
            if let Some(left) = node.child_by_field_name("left") {
                let _ = collect_targets(left, source, names);
            }
        }
        "for_statement" => {
            if let Some(left) = node.child_by_field_name("left") {
                let _ = collect_targets(left, source, names);
            }
        }
        "import_statement" | "import_from_statement" => {
            let mut table = ImportTable::default();
            table.record(node, source, 0);
            for entry in table.entries {
                push(names, entry.binding.local_name().to_string());
            }
            return;
        }
        "as_pattern_target" => {
            if let Some(name) = node.named_child(0).filter(|n| n.kind() == "identifier") {
                push(names, node_text(name, source).to_string());
            }
            return;
        }
        "lambda" | "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
        | "generator_expression" => return,
        _ => {}
    }
    for child in named_children(node) {
        collect_block_bindings(child, source, names);
    }
}

fn decorator_info(node: Node<'_>, source: &str, base: usize) -> Decorator {
    let expr = node.named_child(0);
    let line_end = node
        .next_sibling()
        .map(|next| next.start_byte())
        .unwrap_or(node.end_byte());
    let (expr_start, expr_end) = expr
        .map(|e| (e.start_byte(), e.end_byte()))
        .unwrap_or((node.start_byte() + 1, node.end_byte()));
    Decorator {
        text: source[expr_start..expr_end].to_string(),
        path: expr.and_then(|e| callee_path(e, source)),
        call: expr
            .filter(|e| e.kind() == "call")
            .map(|e| call_info(e, source)),
        line_range: node.start_byte() - base..line_end - base,
        expr_range: expr_start - base..expr_end - base,
    }
}

/// Extract callee and argument texts from a `call` node.
pub(crate) fn call_info(node: Node<'_>, source: &str) -> CallInfo {
    let mut info = CallInfo {
        callee: node
            .child_by_field_name("function")
            .and_then(|f| dotted_path(f, source)),
        ..Default::default()
    };
    let Some(arguments) = node.child_by_field_name("arguments") else {
        return info;
    };
    if arguments.kind() != "argument_list" {
        info.args.push(node_text(arguments, source).to_string());
        return info;
    }
    for arg in named_children(arguments) {
        match arg.kind() {
            "keyword_argument" => {
                let name = arg.child_by_field_name("name").map(|n| node_text(n, source));
                let value = arg.child_by_field_name("value").map(|v| node_text(v, source));
                if let (Some(name), Some(value)) = (name, value) {
                    info.keywords.push((name.to_string(), value.to_string()));
                }
            }
            "comment" => {}
            _ => info.args.push(node_text(arg, source).to_string()),
        }
    }
    info
}
