//! Serialization of resolved modules into Python source, plus the project
//! scaffold around them and the code that puts it all on disk.

pub mod assets;
pub mod scaffold;
pub mod writer;

use std::collections::{BTreeMap, BTreeSet};

use crate::classify::claims::Fragment;
use crate::classify::target::{ProjectLayout, TargetFile};
use crate::program::imports::ImportBinding;
use crate::resolve::{ResolvedFile, ResolvedUnit};

pub const GENERATED_HEADER: &str = "# Generated by outgrow";

pub const UNUSED_BANNER: &str = "\
# Definitions that were not used by the converted app
# These will need to be merged into the rest of the app manually";

pub const UNRESOLVED_MARKER: &str = "# outgrow: unresolved reference:";

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ImportGroup {
    Future,
    External,
    Project,
    Relative,
}

fn import_group(binding: &ImportBinding, layout: &ProjectLayout) -> ImportGroup {
    let module = binding.module.as_deref().unwrap_or(&binding.name);
    if module == "__future__" {
        ImportGroup::Future
    } else if module.starts_with('.') {
        ImportGroup::Relative
    } else if module == layout.project || module.starts_with(&format!("{}.", layout.project)) {
        ImportGroup::Project
    } else {
        ImportGroup::External
    }
}

/// Import header: groups separated by a blank line, `import x` lines
/// before `from` lines, and `from` imports merged per module.
pub fn render_imports(imports: &[ImportBinding], layout: &ProjectLayout) -> String {
    #[derive(Default)]
    struct Group {
        plain: BTreeSet<String>,
        from: BTreeMap<String, BTreeSet<String>>,
    }

    let mut groups: BTreeMap<ImportGroup, Group> = BTreeMap::new();
    for binding in imports {
        let group = groups.entry(import_group(binding, layout)).or_default();
        match &binding.module {
            Some(module) => {
                group
                    .from
                    .entry(module.clone())
                    .or_default()
                    .insert(binding.imported_clause());
            }
            None => {
                group.plain.insert(binding.to_string());
            }
        }
    }

    let mut blocks = Vec::new();
    for group in groups.values() {
        let mut lines: Vec<String> = group.plain.iter().cloned().collect();
        for (module, names) in &group.from {
            if names.contains("*") {
                lines.push(format!("from {module} import *"));
            }
            let named: Vec<&str> = names
                .iter()
                .map(String::as_str)
                .filter(|n| *n != "*")
                .collect();
            if !named.is_empty() {
                lines.push(format!("from {module} import {}", named.join(", ")));
            }
        }
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

fn unresolved_comment(unit: &ResolvedUnit) -> Option<String> {
    (!unit.unresolved.is_empty())
        .then(|| format!("{UNRESOLVED_MARKER} {}", unit.unresolved.join(", ")))
}

/// Full text of one generated module.
pub fn render_module(file: &ResolvedFile, layout: &ProjectLayout) -> String {
    let mut header = vec![GENERATED_HEADER.to_string()];
    if file.target == TargetFile::Unused {
        header.push(UNUSED_BANNER.to_string());
    }

    let mut sections = vec![header.join("\n")];
    let imports = render_imports(&file.imports, layout);
    if !imports.is_empty() {
        sections.push(imports);
    }

    let mut bodies = Vec::new();
    let mut patterns = Vec::new();
    for unit in &file.units {
        match unit.fragment {
            Fragment::Source => {
                let mut text = String::new();
                if let Some(comment) = unresolved_comment(unit) {
                    text.push_str(&comment);
                    text.push('\n');
                }
                text.push_str(unit.text.trim_end());
                if !text.trim().is_empty() {
                    bodies.push(text);
                }
            }
            Fragment::UrlPattern => {
                if let Some(comment) = unresolved_comment(unit) {
                    patterns.push(format!("    {comment}"));
                }
                patterns.push(format!("    {},", unit.text.trim()));
            }
        }
    }
    if !patterns.is_empty() || file.target == TargetFile::Urls {
        bodies.push(format!("urlpatterns = [\n{}\n]", patterns.join("\n")));
    }

    let mut out = sections.join("\n\n");
    if !bodies.is_empty() {
        out.push_str("\n\n\n");
        out.push_str(&bodies.join("\n\n\n"));
    }
    out.push('\n');
    out
}
