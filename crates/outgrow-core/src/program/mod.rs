//! Program model: the parsed single-file program as an ordered list of
//! top-level declarations plus its import table.

pub mod imports;
pub mod parser;
pub mod syntax;

use std::ops::Range;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Tree};

use crate::errors::OutgrowResult;
use crate::program::imports::ImportTable;

/// Index of a declaration in [`ProgramModel::declarations`].
pub type DeclId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Class,
    Function,
    Assignment,
    /// Any other top-level statement, e.g. `app.route("api/", include=api.urls)`.
    Statement,
}

/// Byte and line span of a declaration in the original source.
/// Lines are 1-based and inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
}

/// Arguments of a call expression, kept as source text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallInfo {
    /// Dotted callee path; `None` when the callee is not a name chain.
    pub callee: Option<String>,
    pub args: Vec<String>,
    pub keywords: Vec<(String, String)>,
}

impl CallInfo {
    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One `@decorator` line of a class or function.
#[derive(Clone, Debug)]
pub struct Decorator {
    /// Expression after the `@`.
    pub text: String,
    /// Dotted path of the decorator, or of its callee when it is a call.
    pub path: Option<String>,
    pub call: Option<CallInfo>,
    /// Range of the whole decorator line(s) within [`Declaration::text`],
    /// including the trailing newline.
    pub line_range: Range<usize>,
    /// Range of the expression (after `@`) within [`Declaration::text`].
    pub expr_range: Range<usize>,
}

/// One top-level unit of the program.
#[derive(Clone, Debug)]
pub struct Declaration {
    pub id: DeclId,
    pub kind: DeclKind,
    /// Bound names. Multi-target assignments bind several names as one unit.
    pub names: Vec<String>,
    pub span: Span,
    /// Position among all top-level statements, imports included.
    pub ordinal: usize,
    /// Original source text, including directly attached leading comments.
    pub text: String,
    /// `Some(reason)` when the declaration cannot be relocated by any stage.
    pub non_relocatable: Option<String>,
    pub decorators: Vec<Decorator>,
    /// Base class expressions (dotted paths where possible) for classes.
    pub bases: Vec<String>,
    /// The call on the right-hand side of an assignment, or the call making
    /// up an expression statement.
    pub call: Option<CallInfo>,
    pub is_async: bool,
    pub return_annotation: Option<String>,
    /// Index of the statement among the module node's named children.
    pub(crate) node_index: usize,
    /// Offset of the statement node itself within `text` (past comments).
    pub(crate) node_offset: usize,
}

impl Declaration {
    pub fn is_relocatable(&self) -> bool {
        self.non_relocatable.is_none()
    }

    /// Human-readable identifier used in diagnostics.
    pub fn label(&self) -> String {
        if self.names.is_empty() {
            format!("<statement at line {}>", self.span.start_line)
        } else {
            self.names.join(", ")
        }
    }

    pub fn binds(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Decorators whose dotted path satisfies `pred`.
    pub fn decorators_matching(&self, pred: impl Fn(&str) -> bool) -> Vec<&Decorator> {
        self.decorators
            .iter()
            .filter(|d| d.path.as_deref().is_some_and(&pred))
            .collect()
    }
}

/// Where a name used by a declaration is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Decl(DeclId),
    /// Index into [`ImportTable::entries`].
    Import(usize),
}

/// The parsed program.
pub struct ProgramModel {
    source: String,
    tree: Tree,
    pub declarations: Vec<Declaration>,
    pub imports: ImportTable,
    pub docstring: Option<String>,
    names: IndexMap<String, Vec<DeclId>>,
}

impl ProgramModel {
    /// Parse Python source into a program model.
    pub fn parse(source: &str) -> OutgrowResult<Self> {
        parser::build_program(source)
    }

    pub(crate) fn from_parts(
        source: String,
        tree: Tree,
        declarations: Vec<Declaration>,
        imports: ImportTable,
        docstring: Option<String>,
    ) -> Self {
        let mut names: IndexMap<String, Vec<DeclId>> = IndexMap::new();
        for decl in &declarations {
            for name in &decl.names {
                names.entry(name.clone()).or_default().push(decl.id);
            }
        }
        ProgramModel {
            source,
            tree,
            declarations,
            imports,
            docstring,
            names,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn declaration(&self, id: DeclId) -> &Declaration {
        &self.declarations[id]
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Syntax node of a declaration's statement.
    pub fn node(&self, id: DeclId) -> Option<Node<'_>> {
        self.tree
            .root_node()
            .named_child(self.declarations[id].node_index)
    }

    /// Declarations binding `name`, in program order.
    pub fn definitions(&self, name: &str) -> &[DeclId] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First declaration binding `name`, in program order.
    pub fn find(&self, name: &str) -> Option<&Declaration> {
        self.definitions(name)
            .first()
            .map(|&id| &self.declarations[id])
    }

    /// Resolve `name` as seen from the statement at `ordinal`.
    ///
    /// Picks the most recent definition before `ordinal` (declarations and
    /// imports alike). When there is none and `from` itself binds the name
    /// the use is a self reference and `None` is returned; otherwise the
    /// earliest later definition wins, since function bodies run after the
    /// whole module has executed.
    pub fn lookup(&self, name: &str, ordinal: usize, from: Option<DeclId>) -> Option<Binding> {
        let mut before: Option<(usize, Binding)> = None;
        let mut after: Option<(usize, Binding)> = None;

        let decl_candidates = self
            .definitions(name)
            .iter()
            .map(|&id| (self.declarations[id].ordinal, Binding::Decl(id)));
        let import_candidates = self
            .imports
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.binding.local_name() == name)
            .map(|(idx, e)| (e.ordinal, Binding::Import(idx)));

        for (candidate_ordinal, binding) in decl_candidates.chain(import_candidates) {
            if let (Some(from), Binding::Decl(id)) = (from, binding) {
                if id == from {
                    continue;
                }
            }
            if candidate_ordinal < ordinal {
                if before.map_or(true, |(o, _)| candidate_ordinal > o) {
                    before = Some((candidate_ordinal, binding));
                }
            } else if after.map_or(true, |(o, _)| candidate_ordinal < o) {
                after = Some((candidate_ordinal, binding));
            }
        }

        if let Some((_, binding)) = before {
            return Some(binding);
        }
        if let Some(from) = from {
            if self.declarations[from].binds(name) {
                return None;
            }
        }
        after.map(|(_, binding)| binding)
    }
}
