//! Built-in structural rules, one ordered list per stage.
//!
//! A rule is a plain function over an immutable view of the program and
//! the current claims. It either declines or returns a [`Match`] describing
//! the claim to make; it never mutates anything itself. A rule that only
//! partially recognises a pattern declines.

use crate::classify::claims::{ClaimTable, Rendering};
use crate::classify::rewrite::{
    apply_edits, insert_innermost_decorator, render_instance_settings, render_model_admin,
    render_url_pattern, replace_decorator_prefix, strip_decorator, Edit, ENSURE_HTTP_RESPONSE,
};
use crate::classify::target::{Role, TargetFile};
use crate::classify::Stage;
use crate::config::ConvertConfig;
use crate::graph::ReferenceGraph;
use crate::program::imports::ImportBinding;
use crate::program::syntax::{is_settings_name, string_literal_value};
use crate::program::{Binding, CallInfo, DeclKind, Declaration, Decorator, ProgramModel};

/// Read-only view handed to every rule.
pub struct RuleContext<'a> {
    pub program: &'a ProgramModel,
    pub graph: &'a ReferenceGraph,
    pub claims: &'a ClaimTable,
    pub config: &'a ConvertConfig,
    /// Name bound to the framework application instance.
    pub app: Option<&'a str>,
}

impl RuleContext<'_> {
    /// Whether `path` is `<app>.<attr>` or a chain below it.
    pub fn is_app_attr(&self, path: &str, attr: &str) -> bool {
        let Some(app) = self.app else {
            return false;
        };
        let Some(rest) = path.strip_prefix(app).and_then(|r| r.strip_prefix('.')) else {
            return false;
        };
        rest == attr || rest.strip_prefix(attr).is_some_and(|r| r.starts_with('.'))
    }

    fn app_decorators<'d>(&self, decl: &'d Declaration, attr: &str) -> Vec<&'d Decorator> {
        decl.decorators
            .iter()
            .filter(|d| d.path.as_deref().is_some_and(|p| self.is_app_attr(p, attr)))
            .collect()
    }

    /// Fully qualified form of a dotted path, through the import table.
    pub fn qualify(&self, path: &str) -> String {
        self.program
            .imports
            .qualify(path)
            .unwrap_or_else(|| path.to_string())
    }

    fn is_model_base(&self, decl: &Declaration, base: &str) -> bool {
        if self.config.model_bases.iter().any(|b| *b == self.qualify(base)) {
            return true;
        }
        // Subclass of a class already claimed as a model
        match self.program.lookup(base, decl.ordinal, Some(decl.id)) {
            Some(Binding::Decl(id)) => self.claims.role(id) == Role::Model,
            _ => false,
        }
    }

    fn framework_callee(&self) -> String {
        format!("{}.{}", self.config.framework_module, self.config.framework_class)
    }

    /// Whether `call` constructs the framework application.
    pub fn is_app_constructor(&self, call: &CallInfo) -> bool {
        call.callee
            .as_deref()
            .is_some_and(|callee| self.qualify(callee) == self.framework_callee())
    }
}

/// Framework-only keyword arguments of the app constructor, as source
/// text. None of them reach the generated settings module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameworkSettings {
    pub admin_url: Option<String>,
    pub extra_apps: Option<String>,
    pub api_url: Option<String>,
    pub sqlite_database: Option<String>,
    pub migrations_dir: Option<String>,
}

impl FrameworkSettings {
    pub fn from_call(call: &CallInfo) -> Self {
        let keyword = |name: &str| call.keyword(name).map(str::to_string);
        FrameworkSettings {
            admin_url: keyword("ADMIN_URL"),
            extra_apps: keyword("EXTRA_APPS"),
            api_url: keyword("API_URL"),
            sqlite_database: keyword("SQLITE_DATABASE"),
            migrations_dir: keyword("MIGRATIONS_DIR"),
        }
    }
}

/// Facts a claim records for later stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fact {
    /// Framework-only keyword arguments of the app constructor.
    FrameworkSettings(FrameworkSettings),
    /// A model carried `@app.admin(...)`.
    AdminRegistration {
        model: String,
        anchor: usize,
        options: Vec<(String, String)>,
    },
    /// A view registered under a URL pattern.
    Route {
        view: String,
        pattern: String,
        re: bool,
        name: String,
        class_based: bool,
        anchor: usize,
    },
    /// A view was wrapped with the response helper.
    WrapsResponse,
    /// An endpoint of the app's built-in API.
    ApiEndpoint,
    /// A template tag or filter.
    TemplateTag,
    Warning(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub role: Role,
    pub target: TargetFile,
    pub rendering: Option<Rendering>,
    pub facts: Vec<Fact>,
}

impl Match {
    pub fn new(role: Role) -> Self {
        Match {
            role,
            target: role.default_target(),
            rendering: None,
            facts: Vec::new(),
        }
    }

    fn rendered(mut self, rendering: Rendering) -> Self {
        self.rendering = Some(rendering);
        self
    }

    fn fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Claim(Match),
    Decline,
}

pub type Rule = fn(&RuleContext<'_>, &Declaration) -> Verdict;

/// Rules of one stage, in the order they are tried.
pub fn stage_rules(stage: Stage) -> &'static [Rule] {
    match stage {
        Stage::Settings => &[app_instance, settings_assignment],
        Stage::Models => &[model_class],
        Stage::Admin => &[model_admin_class, admin_statement],
        Stage::Views => &[route_view, api_endpoint],
        Stage::Urls => &[route_include],
        Stage::TemplateTags => &[template_tag],
        Stage::Sweep => &[],
    }
}

// ---------------------------------------------------------------------------
// settings
// ---------------------------------------------------------------------------

/// `app = Django(DEBUG=True, ...)`: the instance becomes settings lines.
pub fn app_instance(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    let Some(app) = ctx.app else {
        return Verdict::Decline;
    };
    if decl.kind != DeclKind::Assignment || !decl.binds(app) {
        return Verdict::Decline;
    }
    let Some(call) = decl.call.as_ref().filter(|c| ctx.is_app_constructor(c)) else {
        return Verdict::Decline;
    };
    let (text, binds) = render_instance_settings(call, &ctx.config.framework_settings);
    let framework = Fact::FrameworkSettings(FrameworkSettings::from_call(call));
    Verdict::Claim(
        Match::new(Role::Setting)
            .rendered(Rendering::source(text, binds))
            .fact(framework),
    )
}

/// Assignments binding only settings-style names.
pub fn settings_assignment(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Assignment || decl.names.is_empty() {
        return Verdict::Decline;
    }
    let all_settings = decl
        .names
        .iter()
        .all(|n| is_settings_name(n) || ctx.config.extra_settings.contains(n));
    if !all_settings {
        return Verdict::Decline;
    }
    Verdict::Claim(Match::new(Role::Setting))
}

// ---------------------------------------------------------------------------
// models
// ---------------------------------------------------------------------------

/// Classes deriving from a known model base or from another model.
pub fn model_class(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Class || !decl.bases.iter().any(|b| ctx.is_model_base(decl, b)) {
        return Verdict::Decline;
    }
    let mut found = Match::new(Role::Model);
    let admin = ctx.app_decorators(decl, "admin");
    if admin.is_empty() {
        return Verdict::Claim(found);
    }

    let edits: Vec<Edit> = admin.iter().copied().map(strip_decorator).collect();
    let text = apply_edits(&decl.text, edits);
    found = found.rendered(Rendering::source(text, decl.names.clone()));

    let model = decl.names.first().cloned().unwrap_or_default();
    if admin.len() > 1 {
        found = found.fact(Fact::Warning(format!(
            "model {model} has more than one admin decorator; using the first"
        )));
    }
    let options = admin[0]
        .call
        .as_ref()
        .map(|c| c.keywords.clone())
        .unwrap_or_default();
    Verdict::Claim(found.fact(Fact::AdminRegistration {
        model,
        anchor: decl.ordinal,
        options,
    }))
}

// ---------------------------------------------------------------------------
// admin
// ---------------------------------------------------------------------------

/// `class BookAdmin(admin.ModelAdmin)` and `@admin.register(...)` classes.
pub fn model_admin_class(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Class {
        return Verdict::Decline;
    }
    let admin_base = decl
        .bases
        .iter()
        .any(|b| ctx.config.admin_bases.contains(&ctx.qualify(b)));
    let registered = decl
        .decorators
        .iter()
        .filter_map(|d| d.path.as_deref())
        .any(|p| ctx.qualify(p) == "django.contrib.admin.register");
    if admin_base || registered {
        Verdict::Claim(Match::new(Role::AdminRegistration))
    } else {
        Verdict::Decline
    }
}

/// `admin.site.register(M)` and the statement form `app.admin(M, ...)`.
pub fn admin_statement(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Statement || !decl.names.is_empty() {
        return Verdict::Decline;
    }
    let Some(call) = &decl.call else {
        return Verdict::Decline;
    };
    let Some(callee) = call.callee.as_deref() else {
        return Verdict::Decline;
    };
    if ctx.qualify(callee) == "django.contrib.admin.site.register" {
        return Verdict::Claim(Match::new(Role::AdminRegistration));
    }
    if ctx.is_app_attr(callee, "admin") && callee.ends_with(".admin") {
        let Some(model) = call.args.first() else {
            return Verdict::Decline;
        };
        let (text, binds) = render_model_admin(model, &call.keywords);
        let rendering = Rendering::source(text, binds)
            .with_import(ImportBinding::from_module("django.contrib", "admin"));
        return Verdict::Claim(Match::new(Role::AdminRegistration).rendered(rendering));
    }
    Verdict::Decline
}

// ---------------------------------------------------------------------------
// views / api
// ---------------------------------------------------------------------------

struct RouteArgs {
    pattern: String,
    re: bool,
    name: Option<String>,
    include: Option<String>,
}

fn route_args(ctx: &RuleContext<'_>, path: &str, call: &CallInfo) -> Option<RouteArgs> {
    let re = if ctx.is_app_attr(path, "re_path") && path.ends_with(".re_path") {
        true
    } else if (ctx.is_app_attr(path, "route") && path.ends_with(".route"))
        || (ctx.is_app_attr(path, "path") && path.ends_with(".path"))
    {
        call.keyword("re") == Some("True")
    } else {
        return None;
    };
    let mut positional = call.args.iter();
    let pattern = positional
        .next()
        .cloned()
        .or_else(|| call.keyword("pattern").map(str::to_string))?;
    let include = positional
        .next()
        .cloned()
        .or_else(|| call.keyword("include").map(str::to_string));
    Some(RouteArgs {
        pattern,
        re,
        name: call.keyword("name").map(str::to_string),
        include,
    })
}

fn returns_response(decl: &Declaration) -> bool {
    decl.return_annotation
        .as_deref()
        .is_some_and(|a| a.contains("Response"))
}

/// Functions and classes registered with `@app.route(...)`.
pub fn route_view(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if !matches!(decl.kind, DeclKind::Function | DeclKind::Class) {
        return Verdict::Decline;
    }
    let Some(view) = decl.names.first() else {
        return Verdict::Decline;
    };
    let app = ctx.app.unwrap_or_default();

    let mut routes = Vec::new();
    let mut edits = Vec::new();
    for decorator in &decl.decorators {
        let Some(path) = decorator.path.as_deref() else {
            continue;
        };
        let Some(call) = &decorator.call else {
            continue;
        };
        let Some(args) = route_args(ctx, path, call) else {
            continue;
        };
        if args.include.is_some() {
            // An include route cannot decorate a view
            return Verdict::Decline;
        }
        routes.push(Fact::Route {
            view: view.clone(),
            pattern: args.pattern,
            re: args.re,
            name: args
                .name
                .unwrap_or_else(|| format!("\"{}\"", view.to_lowercase())),
            class_based: decl.kind == DeclKind::Class,
            anchor: decl.ordinal,
        });
        edits.push(strip_decorator(decorator));
    }
    if routes.is_empty() {
        return Verdict::Decline;
    }

    let mut found = Match::new(Role::View);
    let mut rendering_imports = Vec::new();

    let render_path = format!("{app}.render");
    let mut renders = false;
    for name_use in ctx.graph.uses(decl.id) {
        if name_use.path == render_path {
            edits.push(Edit::new(name_use.range.clone(), "render"));
            renders = true;
        }
    }
    if renders {
        rendering_imports.push(ImportBinding::from_module("django.shortcuts", "render"));
    }

    if decl.kind == DeclKind::Function && !returns_response(decl) {
        edits.push(insert_innermost_decorator(decl, ENSURE_HTTP_RESPONSE));
        found = found.fact(Fact::WrapsResponse);
    }

    let mut rendering = Rendering::source(apply_edits(&decl.text, edits), decl.names.clone());
    for binding in rendering_imports {
        rendering = rendering.with_import(binding);
    }
    found = found.rendered(rendering);
    for route in routes {
        found = found.fact(route);
    }
    Verdict::Claim(found)
}

/// Functions decorated with `@app.api.<method>(...)`.
pub fn api_endpoint(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Function {
        return Verdict::Decline;
    }
    let Some(app) = ctx.app else {
        return Verdict::Decline;
    };
    let prefix = format!("{app}.api");
    let edits: Vec<Edit> = ctx
        .app_decorators(decl, "api")
        .into_iter()
        .filter(|d| d.path.as_deref() != Some(prefix.as_str()))
        .filter_map(|d| replace_decorator_prefix(decl, d, &prefix, "api"))
        .collect();
    if edits.is_empty() {
        return Verdict::Decline;
    }
    let rendering = Rendering::source(apply_edits(&decl.text, edits), decl.names.clone());
    Verdict::Claim(
        Match::new(Role::ApiEndpoint)
            .rendered(rendering)
            .fact(Fact::ApiEndpoint),
    )
}

// ---------------------------------------------------------------------------
// urls
// ---------------------------------------------------------------------------

/// `app.route("/api/", include=api.urls)` statements.
pub fn route_include(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Statement || !decl.names.is_empty() {
        return Verdict::Decline;
    }
    let Some(call) = &decl.call else {
        return Verdict::Decline;
    };
    let Some(path) = call.callee.as_deref() else {
        return Verdict::Decline;
    };
    let Some(args) = route_args(ctx, path, call) else {
        return Verdict::Decline;
    };
    let Some(include) = args.include else {
        return Verdict::Decline;
    };
    let text = render_url_pattern(&args.pattern, &include, args.re, args.name.as_deref());
    let function = if args.re { "re_path" } else { "path" };
    let rendering = Rendering::url_pattern(
        text,
        vec![ImportBinding::from_module("django.urls", function)],
    );
    Verdict::Claim(Match::new(Role::UrlRoute).rendered(rendering))
}

/// Literal value of an `API_URL`-style setting, defaulting when absent or
/// not a plain string.
pub fn literal_or(value: Option<&str>, default: &str) -> String {
    value
        .and_then(string_literal_value)
        .unwrap_or_else(|| default.to_string())
}

// ---------------------------------------------------------------------------
// template tags
// ---------------------------------------------------------------------------

/// `@app.templatetag.simple_tag` and friends.
pub fn template_tag(ctx: &RuleContext<'_>, decl: &Declaration) -> Verdict {
    if decl.kind != DeclKind::Function {
        return Verdict::Decline;
    }
    let Some(app) = ctx.app else {
        return Verdict::Decline;
    };
    let prefix = format!("{app}.templatetag");
    let edits: Vec<Edit> = ctx
        .app_decorators(decl, "templatetag")
        .into_iter()
        .filter_map(|d| replace_decorator_prefix(decl, d, &prefix, "register"))
        .collect();
    if edits.is_empty() {
        return Verdict::Decline;
    }
    let rendering = Rendering::source(apply_edits(&decl.text, edits), decl.names.clone());
    Verdict::Claim(
        Match::new(Role::TemplateTag)
            .rendered(rendering)
            .fact(Fact::TemplateTag),
    )
}
