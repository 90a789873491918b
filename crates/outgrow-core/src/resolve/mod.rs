//! Per-module resolution: which source a generated module inlines, and the
//! imports it needs for everything else it reads.
//!
//! Every name a module's units read is satisfied, in order, by synthesized
//! source in the same module, by an import the rewritten text asked for,
//! by the declaration or import the program binds it to, or by synthesized
//! source in another module. Declarations owned by the module itself are
//! inlined; declarations owned elsewhere become imports from their owner
//! and the walk stops there. Whatever is left is an unresolved reference.

pub mod cycles;

use tracing::{debug, warn};

use crate::classify::claims::{ClaimTable, Fragment, Rendering};
use crate::classify::target::{ProjectLayout, TargetFile};
use crate::config::ConvertConfig;
use crate::diagnostics::{DiagnosticsReport, UnresolvedReference};
use crate::graph::scope::{snippet_uses, NameUse};
use crate::graph::ReferenceGraph;
use crate::program::imports::ImportBinding;
use crate::program::{Binding, DeclId, ProgramModel};

pub use cycles::detect_cycles;

/// One piece of emitted source.
#[derive(Clone, Debug)]
pub struct ResolvedUnit {
    pub text: String,
    pub fragment: Fragment,
    /// Declaration the text came from; `None` for synthesized source.
    pub decl: Option<DeclId>,
    /// Names nothing could supply, in first-use order.
    pub unresolved: Vec<String>,
}

/// A name imported from another generated module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossRef {
    pub name: String,
    pub owner: TargetFile,
}

#[derive(Clone, Debug)]
pub struct ResolvedFile {
    pub target: TargetFile,
    /// Units in emission order.
    pub units: Vec<ResolvedUnit>,
    /// Deduplicated imports, in discovery order.
    pub imports: Vec<ImportBinding>,
    pub cross_refs: Vec<CrossRef>,
}

impl ResolvedFile {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Declarations inlined into this module, in emission order.
    pub fn inlined(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.units.iter().filter_map(|u| u.decl)
    }

    pub fn imports_from(&self, owner: TargetFile) -> impl Iterator<Item = &str> + '_ {
        self.cross_refs
            .iter()
            .filter(move |r| r.owner == owner)
            .map(|r| r.name.as_str())
    }

    fn add_import(&mut self, binding: ImportBinding) {
        if !self.imports.contains(&binding) {
            self.imports.push(binding);
        }
    }

    fn add_cross_ref(&mut self, module: String, name: &str, owner: TargetFile) {
        self.add_import(ImportBinding::from_module(&module, name));
        let cross = CrossRef {
            name: name.to_string(),
            owner,
        };
        if !self.cross_refs.contains(&cross) {
            self.cross_refs.push(cross);
        }
    }
}

/// What a unit is, for lookups.
struct UnitSource<'u> {
    decl: Option<DeclId>,
    /// Ordinal names are looked up from.
    ordinal: usize,
    rendering: Option<&'u Rendering>,
    label: String,
    /// Line of the unit in the original program, when it has one.
    line: usize,
}

enum Supply {
    Satisfied,
    Import(ImportBinding),
    Cross(String, TargetFile),
    Missing,
}

pub struct Resolver<'a> {
    program: &'a ProgramModel,
    graph: &'a ReferenceGraph,
    claims: &'a ClaimTable,
    config: &'a ConvertConfig,
    layout: ProjectLayout,
}

impl<'a> Resolver<'a> {
    pub fn new(
        program: &'a ProgramModel,
        graph: &'a ReferenceGraph,
        claims: &'a ClaimTable,
        config: &'a ConvertConfig,
    ) -> Self {
        Resolver {
            program,
            graph,
            claims,
            config,
            layout: config.layout(),
        }
    }

    /// Resolve every module, in pipeline order.
    pub fn resolve_all(&self, report: &mut DiagnosticsReport) -> Vec<ResolvedFile> {
        TargetFile::ALL
            .iter()
            .map(|&target| self.resolve(target, report))
            .collect()
    }

    pub fn resolve(&self, target: TargetFile, report: &mut DiagnosticsReport) -> ResolvedFile {
        let mut file = ResolvedFile {
            target,
            units: Vec::new(),
            imports: Vec::new(),
            cross_refs: Vec::new(),
        };

        // (sort key, unit)
        let mut keyed: Vec<((usize, u8, usize), ResolvedUnit)> = Vec::new();

        for record in self.claims.owned_by(target) {
            let decl = self.program.declaration(record.decl);
            let rendering = record.rendering.as_ref();
            let source = UnitSource {
                decl: Some(decl.id),
                ordinal: decl.ordinal,
                rendering,
                label: decl.label(),
                line: decl.span.start_line,
            };
            let uses = match rendering {
                Some(r) => snippet_uses(&r.text).unwrap_or_else(|_| self.graph.uses(decl.id).to_vec()),
                None => self.graph.uses(decl.id).to_vec(),
            };
            let binds = record.binds(decl);
            let unresolved = self.resolve_names(&mut file, &source, &uses, binds, report);
            let (text, fragment) = match rendering {
                Some(r) => (r.text.clone(), r.fragment),
                None => (decl.text.clone(), Fragment::Source),
            };
            keyed.push((
                (decl.ordinal + 1, 0, decl.id),
                ResolvedUnit {
                    text,
                    fragment,
                    decl: Some(decl.id),
                    unresolved,
                },
            ));
        }

        for (seq, unit) in self
            .claims
            .synthetic()
            .iter()
            .enumerate()
            .filter(|(_, u)| u.target == target)
        {
            let source = UnitSource {
                decl: None,
                ordinal: unit.anchor.map_or(usize::MAX, |a| a + 1),
                rendering: Some(&unit.rendering),
                label: format!("<generated by {}>", unit.origin),
                line: 0,
            };
            let uses = snippet_uses(&unit.rendering.text).unwrap_or_default();
            let unresolved =
                self.resolve_names(&mut file, &source, &uses, &unit.rendering.binds, report);
            keyed.push((
                (unit.anchor.map_or(0, |a| a + 1), 1, seq),
                ResolvedUnit {
                    text: unit.rendering.text.clone(),
                    fragment: unit.rendering.fragment,
                    decl: None,
                    unresolved,
                },
            ));
        }

        for requirement in self.claims.requirements() {
            if requirement.target != target {
                continue;
            }
            let Some(record) = self.claims.get(requirement.decl) else {
                continue;
            };
            if record.target == target {
                continue;
            }
            let decl = self.program.declaration(requirement.decl);
            let module = self.layout.import_module(target, record.target);
            for name in record.binds(decl) {
                file.add_cross_ref(module.clone(), name, record.target);
            }
        }

        keyed.sort_by_key(|(key, _)| *key);
        file.units = keyed.into_iter().map(|(_, unit)| unit).collect();

        if !file.is_empty() {
            let imports = &self.program.imports;
            for name in &imports.future {
                file.add_import(ImportBinding::from_module("__future__", name));
            }
            for module in &imports.star_modules {
                file.add_import(ImportBinding::from_module(module, "*"));
            }
        }

        debug!(
            %target,
            units = file.units.len(),
            imports = file.imports.len(),
            "resolved module"
        );
        file
    }

    /// Resolve the free names of one unit, adding imports to `file`.
    /// Returns the names left unresolved.
    fn resolve_names(
        &self,
        file: &mut ResolvedFile,
        unit: &UnitSource<'_>,
        uses: &[NameUse],
        binds: &[String],
        report: &mut DiagnosticsReport,
    ) -> Vec<String> {
        let mut unresolved: Vec<String> = Vec::new();
        let mut done: Vec<&str> = Vec::new();

        for name_use in uses {
            let name = name_use.name.as_str();
            if done.contains(&name) || binds.iter().any(|b| b == name) {
                continue;
            }
            done.push(name);

            match self.supply(file.target, unit, name) {
                Supply::Satisfied => {}
                Supply::Import(binding) => file.add_import(binding),
                Supply::Cross(module, owner) => file.add_cross_ref(module, name, owner),
                Supply::Missing => {
                    let line = if unit.line == 0 {
                        0
                    } else {
                        unit.line + name_use.line.saturating_sub(1)
                    };
                    warn!(declaration = %unit.label, name, line, "unresolved reference");
                    report.unresolved.push(UnresolvedReference {
                        declaration: unit.label.clone(),
                        name: name.to_string(),
                        line,
                        file: self.layout.rel_path(file.target).display().to_string(),
                    });
                    unresolved.push(name.to_string());
                }
            }
        }

        // A star import may well provide them
        if self.program.imports.star_modules.is_empty() {
            unresolved
        } else {
            Vec::new()
        }
    }

    fn supply(&self, target: TargetFile, unit: &UnitSource<'_>, name: &str) -> Supply {
        if self.claims.synthetic_binding(target, name).is_some() {
            return Supply::Satisfied;
        }
        if let Some(rendering) = unit.rendering {
            if let Some(binding) = rendering.imports.iter().find(|i| i.local_name() == name) {
                return Supply::Import(binding.clone());
            }
        }

        match self.binding_for(unit, name) {
            Some(Binding::Decl(id)) => {
                if let Some(record) = self.claims.get(id) {
                    let decl = self.program.declaration(id);
                    if record.binds(decl).iter().any(|b| b == name) {
                        if record.target == target {
                            return Supply::Satisfied;
                        }
                        let module = self.layout.import_module(target, record.target);
                        return Supply::Cross(module, record.target);
                    }
                }
            }
            Some(Binding::Import(index)) => {
                let binding = &self.program.imports.entries[index].binding;
                if !self.is_framework_import(binding) {
                    return Supply::Import(binding.clone());
                }
            }
            None => {}
        }

        if let Some(unit) = self.claims.any_synthetic_binding(name) {
            let module = self.layout.import_module(target, unit.target);
            return Supply::Cross(module, unit.target);
        }
        Supply::Missing
    }

    fn binding_for(&self, unit: &UnitSource<'_>, name: &str) -> Option<Binding> {
        if let (Some(id), None) = (unit.decl, unit.rendering) {
            if let Some(edge) = self.graph.edge_for_name(id, name) {
                return Some(Binding::Decl(edge.to));
            }
            return self
                .graph
                .externals(id)
                .iter()
                .find(|e| e.name == name)
                .map(|e| Binding::Import(e.import));
        }
        self.program.lookup(name, unit.ordinal, unit.decl)
    }

    /// Imports of the single-file framework itself never survive.
    fn is_framework_import(&self, binding: &ImportBinding) -> bool {
        let framework = self.config.framework_module.as_str();
        let root = binding.module.as_deref().unwrap_or(&binding.name);
        root == framework || root.strip_prefix(framework).is_some_and(|r| r.starts_with('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifierPipeline;
    use crate::plugin::PluginRegistry;

    struct Resolved {
        program: ProgramModel,
        files: Vec<ResolvedFile>,
        report: DiagnosticsReport,
    }

    impl Resolved {
        fn file(&self, target: TargetFile) -> &ResolvedFile {
            self.files.iter().find(|f| f.target == target).unwrap()
        }

        fn import_lines(&self, target: TargetFile) -> Vec<String> {
            self.file(target).imports.iter().map(|i| i.to_string()).collect()
        }
    }

    fn resolve(src: &str) -> Resolved {
        let program = ProgramModel::parse(src).unwrap();
        let graph = ReferenceGraph::build(&program);
        let config = ConvertConfig::default();
        let registry = PluginRegistry::empty();
        let classification = ClassifierPipeline::new(&program, &graph, &config, &registry)
            .run()
            .unwrap();
        let mut report = classification.report;
        let files = Resolver::new(&program, &graph, &classification.claims, &config)
            .resolve_all(&mut report);
        Resolved {
            program,
            files,
            report,
        }
    }

    const SCENARIO: &str = "\
from nanodjango import Django
from django.db import models

app = Django()

A = 1

class M(models.Model):
    pass

@app.route(\"/\")
def v(request):
    return str(M.objects.count())

def h():
    return 2
";

    #[test]
    fn test_view_imports_model_from_models_module() {
        let r = resolve(SCENARIO);
        let views = r.import_lines(TargetFile::Views);
        assert!(views.contains(&"from .models import M".to_string()));
        assert!(views.contains(&"from django.http import HttpResponse".to_string()));
        assert!(!views.iter().any(|l| l.contains("nanodjango")));
        let models = r.import_lines(TargetFile::Models);
        assert_eq!(models, vec!["from django.db import models"]);
    }

    #[test]
    fn test_inlined_order_follows_program_order() {
        let r = resolve(SCENARIO);
        for file in &r.files {
            let ordinals: Vec<usize> = file
                .inlined()
                .map(|id| r.program.declaration(id).ordinal)
                .collect();
            let mut sorted = ordinals.clone();
            sorted.sort_unstable();
            assert_eq!(ordinals, sorted, "{} out of order", file.target);
        }
    }

    #[test]
    fn test_helper_emitted_before_views() {
        let r = resolve(SCENARIO);
        let views = r.file(TargetFile::Views);
        assert!(views.units[0].text.starts_with("def ensure_http_response"));
        assert!(views.units[1].text.starts_with("@ensure_http_response\ndef v"));
    }

    #[test]
    fn test_unresolved_names_are_reported() {
        let r = resolve("def f():\n    return missing_helper()\n");
        let unused = r.file(TargetFile::Unused);
        assert_eq!(unused.units[0].unresolved, vec!["missing_helper"]);
        assert_eq!(r.report.unresolved.len(), 1);
        assert_eq!(r.report.unresolved[0].name, "missing_helper");
        assert_eq!(r.report.unresolved[0].line, 2);
    }

    #[test]
    fn test_star_imports_suppress_unresolved_comments() {
        let r = resolve("from helpers import *\n\ndef f():\n    return thing()\n");
        let unused = r.file(TargetFile::Unused);
        assert!(unused.units[0].unresolved.is_empty());
        assert!(unused
            .imports
            .contains(&ImportBinding::from_module("helpers", "*")));
    }

    #[test]
    fn test_urls_import_views_and_api() {
        let src = "\
from nanodjango import Django
app = Django()

@app.route(\"/\")
def index(request):
    return \"hi\"

@app.api.get(\"/ping\")
def ping(request):
    return {\"ok\": True}
";
        let r = resolve(src);
        let urls = r.import_lines(TargetFile::Urls);
        assert!(urls.contains(&"from . import views".to_string()));
        assert!(urls.contains(&"from django.urls import path".to_string()));
        assert!(urls.contains(&"from .api import api".to_string()));
        let api = r.import_lines(TargetFile::Api);
        assert_eq!(api, vec!["from ninja import NinjaAPI"]);
    }

    #[test]
    fn test_empty_targets_have_no_units() {
        let r = resolve("A = 1\n");
        assert!(r.file(TargetFile::Models).is_empty());
        assert!(r.file(TargetFile::Models).imports.is_empty());
        assert!(!r.file(TargetFile::Settings).is_empty());
    }
}
