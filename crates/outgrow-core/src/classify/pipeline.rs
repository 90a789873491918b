//! The classification state machine.
//!
//! Stages run in [`Stage::ORDER`]. Each built-in stage offers every
//! unclaimed, relocatable declaration to its rules in program order, then
//! synthesizes the extra source its claims imply (admin registrations, url
//! entries, helper functions). Plugin hooks bound to the stage's checkpoint
//! run right after it. The sweep adopts unclaimed dependencies of claimed
//! code and sends everything else to the catch-all module.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::classify::claims::{ClaimTable, Claimant, Rendering, SyntheticUnit};
use crate::classify::rewrite::{
    quote, render_base_settings, render_model_admin, render_url_pattern, BASE_SETTINGS,
    ENSURE_HTTP_RESPONSE, ENSURE_HTTP_RESPONSE_SOURCE,
};
use crate::classify::rules::{literal_or, stage_rules, Fact, FrameworkSettings, RuleContext, Verdict};
use crate::classify::target::{Role, TargetFile};
use crate::classify::templates::{template_table, InlineTemplate};
use crate::classify::Stage;
use crate::config::{ConvertConfig, DEFAULT_API_URL};
use crate::diagnostics::{DiagnosticsReport, PluginActivity, SweptEntry};
use crate::graph::scope::snippet_uses;
use crate::graph::ReferenceGraph;
use crate::plugin::{Checkpoint, PluginRegistry};
use crate::program::imports::ImportBinding;
use crate::program::{Binding, DeclId, DeclKind, ProgramModel};

const UNCLAIMED_REASON: &str = "not claimed by any stage or plugin and not used by any generated module";

/// Result of classification: who owns what, plus what the stages learned.
pub struct Classification {
    pub claims: ClaimTable,
    /// Name bound to the framework application instance.
    pub app_instance: Option<String>,
    pub framework: FrameworkSettings,
    /// Inline templates to write under the app's `templates/` directory.
    pub templates: Vec<InlineTemplate>,
    pub report: DiagnosticsReport,
}

impl Classification {
    /// `API_URL` as a plain string, defaulting to `api/`.
    pub fn api_url(&self) -> String {
        literal_or(self.framework.api_url.as_deref(), DEFAULT_API_URL)
    }
}

#[derive(Default)]
struct StageFacts {
    framework: FrameworkSettings,
    admin: Vec<(String, usize, Vec<(String, String)>)>,
    routes: Vec<Fact>,
    wraps_response: bool,
    api: bool,
    template_tags: bool,
}

pub struct ClassifierPipeline<'a> {
    program: &'a ProgramModel,
    graph: &'a ReferenceGraph,
    config: &'a ConvertConfig,
    registry: &'a PluginRegistry,
}

impl<'a> ClassifierPipeline<'a> {
    pub fn new(
        program: &'a ProgramModel,
        graph: &'a ReferenceGraph,
        config: &'a ConvertConfig,
        registry: &'a PluginRegistry,
    ) -> Self {
        ClassifierPipeline {
            program,
            graph,
            config,
            registry,
        }
    }

    pub fn run(&self) -> crate::errors::OutgrowResult<Classification> {
        let mut claims = ClaimTable::new(self.program.len());
        let mut report = DiagnosticsReport::default();
        let mut facts = StageFacts::default();

        let app = self.detect_app_instance(&claims);
        match &app {
            Some(name) => info!(instance = %name, "application instance detected"),
            None => {
                warn!("no application instance found");
                report.warn("no application instance found; framework decorators are left as-is");
            }
        }
        for module in &self.program.imports.star_modules {
            report.warn(format!(
                "star import from {module} is copied into every generated module"
            ));
        }

        let app = app.as_deref();
        self.checkpoint(Checkpoint::Start, app, &mut claims)?;
        let templates = self.extract_templates(app, &mut claims, &mut report);
        for stage in Stage::ORDER {
            if stage == Stage::Sweep {
                self.adopt_dependencies(&mut claims);
                self.sweep(&mut claims, &mut report);
            } else {
                self.run_stage(stage, app, &mut claims, &mut facts, &mut report);
                self.synthesize(stage, &mut claims, &facts);
            }
            self.checkpoint(Checkpoint::after(stage), app, &mut claims)?;
        }

        report.conflicts = claims.conflicts().to_vec();
        for plugin in self.registry.iter() {
            let (claimed, appended) = claims.activity(&Claimant::Plugin(plugin.name().to_string()));
            report.plugins.push(PluginActivity {
                plugin: plugin.name().to_string(),
                checkpoint: plugin.checkpoint().to_string(),
                claims: claimed,
                appended,
            });
        }

        Ok(Classification {
            claims,
            app_instance: app.map(str::to_string),
            framework: facts.framework,
            templates,
            report,
        })
    }

    fn rule_context<'c>(&'c self, claims: &'c ClaimTable, app: Option<&'c str>) -> RuleContext<'c> {
        RuleContext {
            program: self.program,
            graph: self.graph,
            claims,
            config: self.config,
            app,
        }
    }

    /// Configured instance name, else the first `x = Django(...)`.
    fn detect_app_instance(&self, claims: &ClaimTable) -> Option<String> {
        if let Some(name) = &self.config.instance_name {
            return Some(name.clone());
        }
        let ctx = self.rule_context(claims, None);
        self.program
            .declarations
            .iter()
            .filter(|d| d.kind == DeclKind::Assignment && d.names.len() == 1)
            .find(|d| d.call.as_ref().is_some_and(|c| ctx.is_app_constructor(c)))
            .map(|d| d.names[0].clone())
    }

    /// Read `<app>.templates` tables. A later table replaces an earlier
    /// one. Fully literal tables are consumed; any other table stays for the
    /// sweep so nothing it holds is lost.
    fn extract_templates(
        &self,
        app: Option<&str>,
        claims: &mut ClaimTable,
        report: &mut DiagnosticsReport,
    ) -> Vec<InlineTemplate> {
        let Some(app) = app else {
            return Vec::new();
        };
        let mut templates = Vec::new();
        for decl in &self.program.declarations {
            let Some(table) = template_table(self.program, decl, app) else {
                continue;
            };
            if table.is_literal() {
                claims.consume(decl, Claimant::Stage(Stage::Settings));
            } else {
                for entry in &table.rejected {
                    warn!(line = decl.span.start_line, %entry, "template entry is not a string literal");
                    report.warn(format!(
                        "{app}.templates entry is not a plain string literal and was not written ({entry})"
                    ));
                }
            }
            debug!(line = decl.span.start_line, templates = table.templates.len(), "template table");
            templates = table.templates;
        }
        templates
    }

    fn checkpoint(&self, checkpoint: Checkpoint, app: Option<&str>, claims: &mut ClaimTable) -> crate::errors::OutgrowResult<()> {
        self.registry
            .run_checkpoint(checkpoint, self.program, self.graph, self.config, app, claims)
    }

    fn run_stage(
        &self,
        stage: Stage,
        app: Option<&str>,
        claims: &mut ClaimTable,
        facts: &mut StageFacts,
        report: &mut DiagnosticsReport,
    ) {
        let rules = stage_rules(stage);
        let mut claimed = 0;
        for decl in &self.program.declarations {
            if !decl.is_relocatable() || claims.is_claimed(decl.id) {
                continue;
            }
            let found = {
                let ctx = self.rule_context(claims, app);
                rules.iter().find_map(|rule| match rule(&ctx, decl) {
                    Verdict::Claim(found) => Some(found),
                    Verdict::Decline => None,
                })
            };
            let Some(found) = found else {
                continue;
            };
            let outcome = claims.claim(
                decl,
                found.role,
                found.target,
                Claimant::Stage(stage),
                found.rendering,
            );
            if !outcome.is_claimed() {
                continue;
            }
            claimed += 1;
            for fact in found.facts {
                match fact {
                    Fact::FrameworkSettings(framework) => facts.framework = framework,
                    Fact::AdminRegistration {
                        model,
                        anchor,
                        options,
                    } => facts.admin.push((model, anchor, options)),
                    route @ Fact::Route { .. } => facts.routes.push(route),
                    Fact::WrapsResponse => facts.wraps_response = true,
                    Fact::ApiEndpoint => facts.api = true,
                    Fact::TemplateTag => facts.template_tags = true,
                    Fact::Warning(message) => {
                        warn!(declaration = %decl.label(), "{message}");
                        report.warn(message);
                    }
                }
            }
        }
        debug!(%stage, claimed, "stage complete");
    }

    fn synthesize(&self, stage: Stage, claims: &mut ClaimTable, facts: &StageFacts) {
        let scaffold = |target, rendering, anchor| SyntheticUnit {
            target,
            rendering,
            anchor,
            origin: Claimant::Scaffold,
        };
        match stage {
            Stage::Settings => {
                let layout = self.config.layout();
                let digest = Sha256::digest(self.program.source().as_bytes());
                let secret = format!("{digest:x}");
                let text = render_base_settings(
                    &layout,
                    &secret[..50],
                    facts.framework.extra_apps.as_deref(),
                );
                let binds = BASE_SETTINGS.iter().map(|s| s.to_string()).collect();
                let rendering = Rendering::source(text, binds)
                    .with_import(ImportBinding::from_module("pathlib", "Path"));
                claims.add_synthetic(scaffold(TargetFile::Settings, rendering, None));
            }
            Stage::Admin => {
                for (model, anchor, options) in &facts.admin {
                    let (text, binds) = render_model_admin(model, options);
                    let rendering = Rendering::source(text, binds)
                        .with_import(ImportBinding::from_module("django.contrib", "admin"));
                    claims.add_synthetic(scaffold(TargetFile::Admin, rendering, Some(*anchor)));
                }
            }
            Stage::Views => {
                if facts.wraps_response {
                    let rendering = Rendering::source(
                        ENSURE_HTTP_RESPONSE_SOURCE,
                        vec![ENSURE_HTTP_RESPONSE.to_string()],
                    )
                    .with_import(ImportBinding::plain("inspect"))
                    .with_import(ImportBinding::from_module("functools", "wraps"))
                    .with_import(ImportBinding::from_module("django.http", "HttpResponse"));
                    claims.add_synthetic(scaffold(TargetFile::Views, rendering, None));
                }
                if facts.api {
                    let (module, class) = self.config.api_toolkit_parts();
                    let rendering = Rendering::source(format!("api = {class}()"), vec!["api".to_string()])
                        .with_import(ImportBinding::from_module(module, class));
                    claims.add_synthetic(scaffold(TargetFile::Api, rendering, None));
                }
            }
            Stage::Urls => {
                if facts.api {
                    let pattern = quote(&literal_or(
                        facts.framework.api_url.as_deref(),
                        DEFAULT_API_URL,
                    ));
                    let rendering = Rendering::url_pattern(
                        render_url_pattern(&pattern, "api.urls", false, None),
                        vec![ImportBinding::from_module("django.urls", "path")],
                    );
                    claims.add_synthetic(scaffold(TargetFile::Urls, rendering, None));
                }
                for route in &facts.routes {
                    let Fact::Route {
                        view,
                        pattern,
                        re,
                        name,
                        class_based,
                        anchor,
                    } = route
                    else {
                        continue;
                    };
                    let target = if *class_based {
                        format!("views.{view}.as_view()")
                    } else {
                        format!("views.{view}")
                    };
                    let function = if *re { "re_path" } else { "path" };
                    let rendering = Rendering::url_pattern(
                        render_url_pattern(pattern, &target, *re, Some(name)),
                        vec![
                            ImportBinding::from_module(".", "views"),
                            ImportBinding::from_module("django.urls", function),
                        ],
                    );
                    claims.add_synthetic(scaffold(TargetFile::Urls, rendering, Some(*anchor)));
                }
            }
            Stage::TemplateTags => {
                if facts.template_tags {
                    let rendering = Rendering::source(
                        "register = template.Library()",
                        vec!["register".to_string()],
                    )
                    .with_import(ImportBinding::from_module("django", "template"));
                    claims.add_synthetic(scaffold(TargetFile::TemplateTags, rendering, None));
                }
            }
            Stage::Models | Stage::Sweep => {}
        }
    }

    /// Declarations the emitted text of `id` refers to. Names bound by
    /// synthesized source in `target` don't count.
    fn decl_dependencies(&self, claims: &ClaimTable, id: DeclId, target: TargetFile) -> Vec<DeclId> {
        let decl = self.program.declaration(id);
        let rendering = claims.get(id).and_then(|r| r.rendering.as_ref());
        match rendering {
            None => self.graph.dependencies(id),
            Some(rendering) => {
                self.snippet_dependencies(claims, rendering, decl.ordinal, Some(id), target)
            }
        }
    }

    fn snippet_dependencies(
        &self,
        claims: &ClaimTable,
        rendering: &Rendering,
        ordinal: usize,
        from: Option<DeclId>,
        target: TargetFile,
    ) -> Vec<DeclId> {
        let Ok(uses) = snippet_uses(&rendering.text) else {
            return from.map(|id| self.graph.dependencies(id)).unwrap_or_default();
        };
        let mut deps = Vec::new();
        for name_use in uses {
            let name = name_use.name.as_str();
            if rendering.binds.iter().any(|b| b == name)
                || rendering.imports.iter().any(|i| i.local_name() == name)
                || claims.synthetic_binding(target, name).is_some()
            {
                continue;
            }
            if let Some(Binding::Decl(dep)) = self.program.lookup(name, ordinal, from) {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }

    /// Give every unclaimed, relocatable declaration reachable from a
    /// module's roots to the first module (pipeline order) reaching it.
    fn adopt_dependencies(&self, claims: &mut ClaimTable) {
        for target in TargetFile::ALL {
            if target == TargetFile::Unused {
                continue;
            }
            let mut queue: VecDeque<DeclId> = claims.owned_by(target).map(|r| r.decl).collect();
            for requirement in claims.requirements() {
                if requirement.target == target {
                    queue.push_back(requirement.decl);
                }
            }
            for unit in claims.synthetic().iter().filter(|u| u.target == target) {
                let ordinal = unit.anchor.map_or(usize::MAX, |a| a + 1);
                queue.extend(self.snippet_dependencies(claims, &unit.rendering, ordinal, None, target));
            }

            let mut seen = vec![false; self.program.len()];
            while let Some(id) = queue.pop_front() {
                if std::mem::replace(&mut seen[id], true) {
                    continue;
                }
                match claims.owner(id) {
                    Some(owner) if owner != target => continue,
                    Some(_) => {}
                    None => {
                        let decl = self.program.declaration(id);
                        if !decl.is_relocatable() {
                            continue;
                        }
                        claims.claim(
                            decl,
                            Role::Unclassified,
                            target,
                            Claimant::Adoption(target),
                            None,
                        );
                    }
                }
                queue.extend(self.decl_dependencies(claims, id, target));
            }
        }
    }

    fn sweep(&self, claims: &mut ClaimTable, report: &mut DiagnosticsReport) {
        for decl in &self.program.declarations {
            if claims.is_claimed(decl.id) {
                continue;
            }
            let reason = decl
                .non_relocatable
                .clone()
                .unwrap_or_else(|| UNCLAIMED_REASON.to_string());
            warn!(declaration = %decl.label(), line = decl.span.start_line, %reason, "swept to unused");
            claims.claim(decl, Role::Unclassified, TargetFile::Unused, Claimant::Sweep, None);
            report.swept.push(SweptEntry {
                declaration: decl.label(),
                line: decl.span.start_line,
                reason,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OutgrowError;
    use crate::plugin::{ConvertPlugin, HookContext, HookResult};

    fn classify_with(src: &str, registry: &PluginRegistry) -> crate::errors::OutgrowResult<(ProgramModel, Classification)> {
        let program = ProgramModel::parse(src).unwrap();
        let graph = ReferenceGraph::build(&program);
        let config = ConvertConfig::default();
        let classification = ClassifierPipeline::new(&program, &graph, &config, registry).run()?;
        Ok((program, classification))
    }

    fn classify(src: &str) -> (ProgramModel, Classification) {
        classify_with(src, &PluginRegistry::empty()).unwrap()
    }

    fn owner(program: &ProgramModel, c: &Classification, name: &str) -> Option<TargetFile> {
        c.claims.owner(program.find(name).unwrap().id)
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
    fn test_scenario_ownership() {
        let (program, c) = classify(SCENARIO);
        assert_eq!(c.app_instance.as_deref(), Some("app"));
        assert_eq!(owner(&program, &c, "app"), Some(TargetFile::Settings));
        assert_eq!(owner(&program, &c, "A"), Some(TargetFile::Settings));
        assert_eq!(owner(&program, &c, "M"), Some(TargetFile::Models));
        assert_eq!(owner(&program, &c, "v"), Some(TargetFile::Views));
        assert_eq!(owner(&program, &c, "h"), Some(TargetFile::Unused));
        assert_eq!(c.report.swept.len(), 1);
        assert_eq!(c.report.swept[0].declaration, "h");
    }

    #[test]
    fn test_augmented_assignment_is_swept() {
        let (program, c) = classify("COUNT = 0\nCOUNT += 1\n");
        assert_eq!(c.claims.owner(program.declarations[0].id), Some(TargetFile::Settings));
        assert_eq!(c.claims.owner(program.declarations[1].id), Some(TargetFile::Unused));
        assert_eq!(c.report.swept.len(), 1);
        assert_eq!(c.report.swept[0].line, 2);
        assert_eq!(c.report.swept[0].reason, "augmented assignment");
    }

    #[test]
    fn test_literal_template_table_is_consumed() {
        let src = "\
from nanodjango import Django
app = Django()
app.templates = {\"index.html\": \"<p>old</p>\"}
app.templates = {\"index.html\": \"<p>hi</p>\", \"about.html\": \"<p>us</p>\"}
";
        let (program, c) = classify(src);
        for decl in &program.declarations[1..] {
            assert_eq!(c.claims.owner(decl.id), Some(TargetFile::Settings));
        }
        let names: Vec<&str> = c.templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["index.html", "about.html"]);
        assert_eq!(c.templates[0].contents, "<p>hi</p>");
        assert!(c.report.swept.is_empty());
    }

    #[test]
    fn test_dynamic_template_table_is_swept_with_warning() {
        let src = "\
from nanodjango import Django
app = Django()
BODY = \"<p>hi</p>\"
app.templates = {\"index.html\": BODY, \"about.html\": \"<p>us</p>\"}
";
        let (program, c) = classify(src);
        assert_eq!(c.claims.owner(program.declarations[2].id), Some(TargetFile::Unused));
        assert_eq!(c.templates.len(), 1);
        assert_eq!(c.templates[0].name, "about.html");
        assert!(c.report.warnings.iter().any(|w| w.contains("\"index.html\": BODY")));
        assert_eq!(c.report.swept.len(), 1);
    }

    #[test]
    fn test_every_declaration_has_one_owner() {
        let (program, c) = classify(SCENARIO);
        for decl in &program.declarations {
            assert!(c.claims.owner(decl.id).is_some(), "{} unowned", decl.label());
        }
    }

    #[test]
    fn test_scenario_synthesizes_views_and_urls() {
        let (_, c) = classify(SCENARIO);
        let targets: Vec<TargetFile> = c.claims.synthetic().iter().map(|u| u.target).collect();
        assert!(targets.contains(&TargetFile::Settings));
        assert!(targets.contains(&TargetFile::Views));
        let url = c
            .claims
            .synthetic()
            .iter()
            .find(|u| u.target == TargetFile::Urls)
            .unwrap();
        assert_eq!(url.rendering.text, "path(\"\", views.v, name=\"v\")");
    }

    #[test]
    fn test_helpers_are_adopted_by_first_user() {
        let src = "\
from nanodjango import Django
app = Django()

def slugify(x):
    return x.lower()

@app.route(\"/\")
def index(request):
    return slugify(\"A\")
";
        let (program, c) = classify(src);
        assert_eq!(owner(&program, &c, "slugify"), Some(TargetFile::Views));
        let record = c.claims.get(program.find("slugify").unwrap().id).unwrap();
        assert_eq!(record.role, Role::Unclassified);
        assert_eq!(record.claimant, Claimant::Adoption(TargetFile::Views));
        assert!(c.report.swept.is_empty());
    }

    #[test]
    fn test_earlier_stage_wins() {
        let src = "\
from nanodjango import Django
from django.db import models
app = Django()

@app.route(\"/page/\")
class Page(models.Model):
    pass
";
        let (program, c) = classify(src);
        let page = program.find("Page").unwrap().id;
        assert_eq!(c.claims.role(page), Role::Model);
        assert_eq!(c.claims.owner(page), Some(TargetFile::Models));
    }

    #[test]
    fn test_sweep_keeps_program_order_and_reasons() {
        let src = "def b():\n    pass\n\nif True:\n    X = 1\n\ndef a():\n    pass\n";
        let (_, c) = classify(src);
        let names: Vec<&str> = c.report.swept.iter().map(|s| s.declaration.as_str()).collect();
        assert_eq!(names, vec!["b", "X", "a"]);
        assert_ne!(c.report.swept[1].reason, UNCLAIMED_REASON);
    }

    #[test]
    fn test_admin_and_api_synthesis() {
        let src = "\
from nanodjango import Django
from django.db import models
app = Django(API_URL=\"v1/\")

@app.admin
class Book(models.Model):
    pass

@app.api.get(\"/books\")
def books(request):
    return []
";
        let (_, c) = classify(src);
        let texts: Vec<(TargetFile, &str)> = c
            .claims
            .synthetic()
            .iter()
            .map(|u| (u.target, u.rendering.text.as_str()))
            .collect();
        assert!(texts.contains(&(TargetFile::Admin, "admin.site.register(Book)")));
        assert!(texts.contains(&(TargetFile::Api, "api = NinjaAPI()")));
        assert!(texts.contains(&(TargetFile::Urls, "path(\"v1/\", api.urls)")));
        assert_eq!(c.api_url(), "v1/");
    }

    struct ClaimsHelper;

    impl ConvertPlugin for ClaimsHelper {
        fn name(&self) -> &str {
            "claims_helper"
        }

        fn checkpoint(&self) -> Checkpoint {
            Checkpoint::Start
        }

        fn run(&self, ctx: &mut HookContext<'_>) -> HookResult {
            let id = ctx.program().find("A").map(|d| d.id).ok_or("missing A")?;
            ctx.claim(id, Role::View, TargetFile::Views);
            Ok(())
        }
    }

    #[test]
    fn test_plugin_at_start_beats_builtin_stage() {
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(ClaimsHelper)
            .build();
        let (program, c) = classify_with(SCENARIO, &registry).unwrap();
        assert_eq!(owner(&program, &c, "A"), Some(TargetFile::Views));
        assert_eq!(c.report.plugins[0].claims, 1);
    }

    struct Explodes;

    impl ConvertPlugin for Explodes {
        fn name(&self) -> &str {
            "explodes"
        }

        fn checkpoint(&self) -> Checkpoint {
            Checkpoint::Urls
        }

        fn run(&self, _ctx: &mut HookContext<'_>) -> HookResult {
            Err("cannot continue".into())
        }
    }

    #[test]
    fn test_plugin_error_aborts() {
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(Explodes)
            .build();
        let result = classify_with(SCENARIO, &registry);
        assert!(matches!(result, Err(OutgrowError::Plugin { .. })));
    }
}
