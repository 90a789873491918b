//! Import bindings collected from the program's top-level import statements.
//!
//! Each bound local name maps to an [`ImportBinding`] that can be rendered
//! back into a standalone import statement, so a generated module only
//! carries the imports its own code needs.

use std::fmt;

use serde::Serialize;
use tree_sitter::Node;

use crate::program::syntax::{named_children, node_text};

/// One name brought into scope by an import statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImportBinding {
    /// `Some("django.db")` for `from django.db import models`; `None` for
    /// plain `import x.y`.
    pub module: Option<String>,
    /// Imported name (`models`), or the dotted module for plain imports.
    pub name: String,
    pub alias: Option<String>,
}

impl ImportBinding {
    pub fn from_module(module: &str, name: &str) -> Self {
        ImportBinding {
            module: Some(module.to_string()),
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn plain(name: &str) -> Self {
        ImportBinding {
            module: None,
            name: name.to_string(),
            alias: None,
        }
    }

    /// Name this import binds in the importing module.
    ///
    /// `import urllib.parse` binds `urllib`.
    pub fn local_name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        match self.module {
            Some(_) => &self.name,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }

    /// Fully qualified path of what the local name refers to.
    pub fn qualified(&self) -> String {
        match (&self.module, &self.alias) {
            (Some(module), _) => {
                if module.ends_with('.') {
                    format!("{module}{}", self.name)
                } else {
                    format!("{module}.{}", self.name)
                }
            }
            (None, Some(_)) => self.name.clone(),
            (None, None) => self.local_name().to_string(),
        }
    }

    /// Whether this import is relative (`from .x import y`).
    pub fn is_relative(&self) -> bool {
        self.module.as_deref().is_some_and(|m| m.starts_with('.'))
    }

    /// The name as it appears after `import`, including any alias.
    pub fn imported_clause(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {alias}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ImportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "from {module} import {}", self.imported_clause()),
            None => write!(f, "import {}", self.imported_clause()),
        }
    }
}

/// An import binding plus where it appears in the program.
#[derive(Clone, Debug)]
pub struct ImportEntry {
    pub binding: ImportBinding,
    pub ordinal: usize,
    pub line: usize,
}

/// All top-level imports of a program.
#[derive(Clone, Debug, Default)]
pub struct ImportTable {
    pub entries: Vec<ImportEntry>,
    /// `from __future__ import ...` names.
    pub future: Vec<String>,
    /// Modules imported with `from m import *`.
    pub star_modules: Vec<String>,
}

impl ImportTable {
    /// Most recent binding of `name` at or before `ordinal`, falling back to
    /// the earliest later one.
    pub fn lookup(&self, name: &str, ordinal: usize) -> Option<&ImportEntry> {
        let mut candidates = self
            .entries
            .iter()
            .filter(|e| e.binding.local_name() == name);
        let mut before: Option<&ImportEntry> = None;
        let mut after: Option<&ImportEntry> = None;
        for entry in candidates.by_ref() {
            if entry.ordinal <= ordinal {
                before = Some(entry);
            } else if after.is_none() {
                after = Some(entry);
            }
        }
        before.or(after)
    }

    /// Any binding for `name`, preferring the last one in the program.
    pub fn get(&self, name: &str) -> Option<&ImportBinding> {
        self.lookup(name, usize::MAX).map(|e| &e.binding)
    }

    /// Resolve a dotted path through the import table, e.g. `models.Model`
    /// with `from django.db import models` gives `django.db.models.Model`.
    pub fn qualify(&self, path: &str) -> Option<String> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let binding = self.get(head)?;
        let base = binding.qualified();
        Some(match rest {
            Some(rest) => format!("{base}.{rest}"),
            None => base,
        })
    }

    /// Record the bindings of one `import_statement` / `import_from_statement`.
    pub(crate) fn record(&mut self, node: Node<'_>, source: &str, ordinal: usize) {
        let line = node.start_position().row + 1;
        match node.kind() {
            "import_statement" => {
                for child in named_children(node) {
                    if let Some(binding) = binding_from_name(child, source, None) {
                        self.entries.push(ImportEntry {
                            binding,
                            ordinal,
                            line,
                        });
                    }
                }
            }
            "future_import_statement" => {
                for child in named_children(node) {
                    let name = match child.kind() {
                        "aliased_import" => child
                            .child_by_field_name("name")
                            .map(|n| node_text(n, source)),
                        _ => Some(node_text(child, source)),
                    };
                    if let Some(name) = name {
                        if !self.future.iter().any(|f| f == name) {
                            self.future.push(name.to_string());
                        }
                    }
                }
            }
            "import_from_statement" => {
                let Some(module_node) = node.child_by_field_name("module_name") else {
                    return;
                };
                let module = node_text(module_node, source).to_string();
                let mut cursor = node.walk();
                let has_wildcard = node
                    .children(&mut cursor)
                    .any(|c| c.kind() == "wildcard_import");
                if has_wildcard {
                    if !self.star_modules.contains(&module) {
                        self.star_modules.push(module);
                    }
                    return;
                }
                let mut cursor = node.walk();
                for child in node.children_by_field_name("name", &mut cursor) {
                    if let Some(binding) = binding_from_name(child, source, Some(&module)) {
                        self.entries.push(ImportEntry {
                            binding,
                            ordinal,
                            line,
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

fn binding_from_name(node: Node<'_>, source: &str, module: Option<&str>) -> Option<ImportBinding> {
    let (name, alias) = match node.kind() {
        "dotted_name" => (node_text(node, source).to_string(), None),
        "aliased_import" => {
            let name = node_text(node.child_by_field_name("name")?, source).to_string();
            let alias = node
                .child_by_field_name("alias")
                .map(|a| node_text(a, source).to_string());
            (name, alias)
        }
        _ => return None,
    };
    Some(ImportBinding {
        module: module.map(str::to_string),
        name,
        alias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name_for_plain_submodule_import() {
        let binding = ImportBinding::plain("urllib.parse");
        assert_eq!(binding.local_name(), "urllib");
        assert_eq!(binding.to_string(), "import urllib.parse");
    }

    #[test]
    fn test_local_name_for_aliases() {
        let binding = ImportBinding {
            module: Some("ninja".into()),
            name: "NinjaAPI".into(),
            alias: Some("Api".into()),
        };
        assert_eq!(binding.local_name(), "Api");
        assert_eq!(binding.qualified(), "ninja.NinjaAPI");
        assert_eq!(binding.to_string(), "from ninja import NinjaAPI as Api");

        let numpy = ImportBinding {
            module: None,
            name: "numpy".into(),
            alias: Some("np".into()),
        };
        assert_eq!(numpy.local_name(), "np");
        assert_eq!(numpy.qualified(), "numpy");
    }

    #[test]
    fn test_qualify_through_from_import() {
        let table = ImportTable {
            entries: vec![ImportEntry {
                binding: ImportBinding::from_module("django.db", "models"),
                ordinal: 0,
                line: 1,
            }],
            ..Default::default()
        };
        assert_eq!(
            table.qualify("models.Model").as_deref(),
            Some("django.db.models.Model")
        );
        assert_eq!(table.qualify("Other.Model"), None);
    }

    #[test]
    fn test_lookup_prefers_most_recent_prior() {
        let entry = |module: &str, ordinal| ImportEntry {
            binding: ImportBinding::from_module(module, "thing"),
            ordinal,
            line: ordinal + 1,
        };
        let table = ImportTable {
            entries: vec![entry("a", 1), entry("b", 5), entry("c", 9)],
            ..Default::default()
        };
        let found = table.lookup("thing", 6).unwrap();
        assert_eq!(found.binding.module.as_deref(), Some("b"));
        let earliest_later = table.lookup("thing", 0).unwrap();
        assert_eq!(earliest_later.binding.module.as_deref(), Some("a"));
    }
}
