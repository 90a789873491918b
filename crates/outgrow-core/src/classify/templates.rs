//! Inline templates: `<app>.templates = {"name.html": "..."}` becomes one
//! file per entry under the app's `templates/` directory.

use std::path::{Component, Path};

use tree_sitter::Node;

use crate::program::syntax::{dotted_path, named_children, node_text, string_value};
use crate::program::{Declaration, ProgramModel};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineTemplate {
    /// Path below `templates/`, e.g. `counter/index.html`.
    pub name: String,
    pub contents: String,
}

/// What a template table assignment holds.
#[derive(Debug, Default)]
pub struct TemplateTable {
    /// Entries with literal names and bodies, in source order.
    pub templates: Vec<InlineTemplate>,
    /// Entries that cannot be read statically, as `line N: <text>`.
    pub rejected: Vec<String>,
}

impl TemplateTable {
    pub fn is_literal(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// The template table assigned by `decl`, when it assigns a dict display
/// to `<app>.templates`.
pub fn template_table(program: &ProgramModel, decl: &Declaration, app: &str) -> Option<TemplateTable> {
    let source = program.source();
    let statement = program.node(decl.id)?;
    let assignment = statement
        .named_child(0)
        .filter(|n| statement.kind() == "expression_statement" && n.kind() == "assignment")?;
    let target = assignment.child_by_field_name("left")?;
    if dotted_path(target, source)? != format!("{app}.templates") {
        return None;
    }
    let value = assignment
        .child_by_field_name("right")
        .filter(|v| v.kind() == "dictionary")?;

    let mut table = TemplateTable::default();
    for entry in named_children(value) {
        match entry.kind() {
            "comment" => {}
            "pair" => match literal_pair(entry, source) {
                Some(template) => {
                    table.templates.retain(|t| t.name != template.name);
                    table.templates.push(template);
                }
                None => table.rejected.push(describe(entry, source)),
            },
            _ => table.rejected.push(describe(entry, source)),
        }
    }
    Some(table)
}

fn literal_pair(pair: Node<'_>, source: &str) -> Option<InlineTemplate> {
    let name = string_value(pair.child_by_field_name("key")?, source)?;
    let contents = string_value(pair.child_by_field_name("value")?, source)?;
    is_safe_name(&name).then_some(InlineTemplate { name, contents })
}

/// A relative path that stays inside the templates directory.
fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn describe(entry: Node<'_>, source: &str) -> String {
    let text: String = node_text(entry, source).chars().take(60).collect();
    format!("line {}: {text}", entry.start_position().row + 1)
}
