//! Text edits applied to a declaration's source when a stage relocates it:
//! stripping framework decorators, renaming framework attribute chains,
//! and rendering the snippets the stages synthesize.

use std::ops::Range;

use crate::classify::target::ProjectLayout;
use crate::program::syntax::{string_literal_value, strip_leading_slash};
use crate::program::{CallInfo, Declaration, Decorator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Edit {
            range,
            replacement: replacement.into(),
        }
    }
}

/// Apply non-overlapping edits to `text`. Edits overlapping an earlier one
/// (by start offset) are dropped.
pub fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.range.start, e.range.end));
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor || edit.range.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Remove a decorator line (or lines) entirely.
pub fn strip_decorator(decorator: &Decorator) -> Edit {
    Edit::new(decorator.line_range.clone(), "")
}

/// Replace a leading dotted prefix of a decorator expression, e.g.
/// `app.api` in `app.api.get("/x")` with `api`.
pub fn replace_decorator_prefix(
    decl: &Declaration,
    decorator: &Decorator,
    prefix: &str,
    replacement: &str,
) -> Option<Edit> {
    let expr = decl.text.get(decorator.expr_range.clone())?;
    if !expr.starts_with(prefix) {
        return None;
    }
    let start = decorator.expr_range.start;
    Some(Edit::new(start..start + prefix.len(), replacement))
}

/// Insert a decorator directly above the `def`/`class` line, below any
/// decorators that remain.
pub fn insert_innermost_decorator(decl: &Declaration, expr: &str) -> Edit {
    let at = decl
        .decorators
        .iter()
        .map(|d| d.line_range.end)
        .max()
        .unwrap_or(decl.node_offset);
    Edit::new(at..at, format!("@{expr}\n"))
}

// ---------------------------------------------------------------------------
// Synthesized snippets
// ---------------------------------------------------------------------------

/// `KEY = value` lines for the upper-case keyword arguments of the app
/// constructor, skipping framework-only keys.
pub fn render_instance_settings(call: &CallInfo, excluded: &[String]) -> (String, Vec<String>) {
    let mut lines = Vec::new();
    let mut names = Vec::new();
    for (key, value) in &call.keywords {
        if !crate::program::syntax::is_settings_name(key) || excluded.iter().any(|e| e == key) {
            continue;
        }
        lines.push(format!("{key} = {value}"));
        names.push(key.clone());
    }
    (lines.join("\n"), names)
}

/// Registration of a model with the admin site.
pub fn render_model_admin(model: &str, options: &[(String, String)]) -> (String, Vec<String>) {
    if options.is_empty() {
        return (format!("admin.site.register({model})"), Vec::new());
    }
    let admin_class = format!("{model}Admin");
    let mut lines = vec![
        format!("@admin.register({model})"),
        format!("class {admin_class}(admin.ModelAdmin):"),
    ];
    lines.extend(options.iter().map(|(key, value)| format!("    {key} = {value}")));
    (lines.join("\n"), vec![admin_class])
}

/// A `path(...)`/`re_path(...)` entry. `pattern` is source text; a string
/// literal loses its leading slash and gains a raw prefix for `re_path`.
pub fn render_url_pattern(pattern: &str, target: &str, re: bool, name: Option<&str>) -> String {
    let mut pattern = strip_leading_slash(pattern.trim());
    if re && string_literal_value(&pattern).is_some() && pattern.starts_with(['"', '\'']) {
        pattern = format!("r{pattern}");
    }
    let function = if re { "re_path" } else { "path" };
    match name {
        Some(name) => format!("{function}({pattern}, {target}, name={name})"),
        None => format!("{function}({pattern}, {target})"),
    }
}

/// Python string literal for a plain value.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Names bound by [`render_base_settings`].
pub const BASE_SETTINGS: &[&str] = &[
    "BASE_DIR",
    "SECRET_KEY",
    "DEBUG",
    "ALLOWED_HOSTS",
    "INSTALLED_APPS",
    "MIDDLEWARE",
    "ROOT_URLCONF",
    "TEMPLATES",
    "WSGI_APPLICATION",
    "DATABASES",
    "AUTH_PASSWORD_VALIDATORS",
    "LANGUAGE_CODE",
    "TIME_ZONE",
    "USE_I18N",
    "USE_TZ",
    "STATIC_URL",
    "STATIC_ROOT",
    "DEFAULT_AUTO_FIELD",
];

/// Standard project settings the app's own settings are layered on.
/// `extra_apps` is the source text of the app's `EXTRA_APPS` argument.
pub fn render_base_settings(layout: &ProjectLayout, secret_key: &str, extra_apps: Option<&str>) -> String {
    let project = &layout.project;
    let mut text = format!(
        r#"BASE_DIR = Path(__file__).resolve().parent.parent

SECRET_KEY = "django-insecure-{secret_key}"
DEBUG = True
ALLOWED_HOSTS = ["*"]

INSTALLED_APPS = [
    "django.contrib.admin",
    "django.contrib.auth",
    "django.contrib.contenttypes",
    "django.contrib.sessions",
    "django.contrib.messages",
    "django.contrib.staticfiles",
    "{app_package}",
]
"#,
        app_package = layout.app_package(),
    );
    if let Some(extra) = extra_apps {
        text.push_str(&format!("INSTALLED_APPS += {extra}\n"));
    }
    text.push_str(&format!(
        r#"
MIDDLEWARE = [
    "django.middleware.security.SecurityMiddleware",
    "django.contrib.sessions.middleware.SessionMiddleware",
    "django.middleware.common.CommonMiddleware",
    "django.middleware.csrf.CsrfViewMiddleware",
    "django.contrib.auth.middleware.AuthenticationMiddleware",
    "django.contrib.messages.middleware.MessageMiddleware",
    "django.middleware.clickjacking.XFrameOptionsMiddleware",
]

ROOT_URLCONF = "{project}.urls"

TEMPLATES = [
    {{
        "BACKEND": "django.template.backends.django.DjangoTemplates",
        "DIRS": [],
        "APP_DIRS": True,
        "OPTIONS": {{
            "context_processors": [
                "django.template.context_processors.debug",
                "django.template.context_processors.request",
                "django.contrib.auth.context_processors.auth",
                "django.contrib.messages.context_processors.messages",
            ],
        }},
    }},
]

WSGI_APPLICATION = "{project}.wsgi.application"

DATABASES = {{
    "default": {{
        "ENGINE": "django.db.backends.sqlite3",
        "NAME": BASE_DIR / "db.sqlite3",
    }}
}}

AUTH_PASSWORD_VALIDATORS = [
    {{"NAME": "django.contrib.auth.password_validation.UserAttributeSimilarityValidator"}},
    {{"NAME": "django.contrib.auth.password_validation.MinimumLengthValidator"}},
    {{"NAME": "django.contrib.auth.password_validation.CommonPasswordValidator"}},
    {{"NAME": "django.contrib.auth.password_validation.NumericPasswordValidator"}},
]

LANGUAGE_CODE = "en-us"
TIME_ZONE = "UTC"
USE_I18N = True
USE_TZ = True

STATIC_URL = "static/"
STATIC_ROOT = BASE_DIR / "static-collected"

DEFAULT_AUTO_FIELD = "django.db.models.BigAutoField""#
    ));
    text
}

pub const ENSURE_HTTP_RESPONSE: &str = "ensure_http_response";

/// Helper wrapping views that may return plain strings.
pub const ENSURE_HTTP_RESPONSE_SOURCE: &str = r#"def ensure_http_response(view_fn):
    """
    If a view returns a plain string value, convert it into an HttpResponse
    """
    if inspect.iscoroutinefunction(view_fn):

        @wraps(view_fn)
        async def wrapped(*args, **kwargs):
            response = await view_fn(*args, **kwargs)
            if isinstance(response, HttpResponse):
                return response
            return HttpResponse(response)

    else:

        @wraps(view_fn)
        def wrapped(*args, **kwargs):
            response = view_fn(*args, **kwargs)
            if isinstance(response, HttpResponse):
                return response
            return HttpResponse(response)

    return wrapped"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramModel;

    #[test]
    fn test_apply_edits_skips_overlaps() {
        let text = "abcdef";
        let edits = vec![Edit::new(1..3, "X"), Edit::new(2..4, "Y"), Edit::new(5..5, "!")];
        assert_eq!(apply_edits(text, edits), "aXde!f");
    }

    #[test]
    fn test_strip_and_rewrite_decorators() {
        let program = ProgramModel::parse(
            "@login_required\n@app.route(\"/\")\n@app.api.get(\"/x\")\ndef v(request):\n    return 1\n",
        )
        .unwrap();
        let decl = &program.declarations[0];
        let strip = strip_decorator(&decl.decorators[1]);
        let rename =
            replace_decorator_prefix(decl, &decl.decorators[2], "app.api", "api").unwrap();
        let rewritten = apply_edits(&decl.text, vec![strip, rename]);
        assert_eq!(
            rewritten,
            "@login_required\n@api.get(\"/x\")\ndef v(request):\n    return 1"
        );
        assert!(replace_decorator_prefix(decl, &decl.decorators[0], "app.api", "api").is_none());
    }

    #[test]
    fn test_insert_innermost_decorator() {
        let program = ProgramModel::parse("# a view\n@cache\ndef v(request):\n    return 1\n").unwrap();
        let decl = &program.declarations[0];
        let edit = insert_innermost_decorator(decl, ENSURE_HTTP_RESPONSE);
        assert_eq!(
            apply_edits(&decl.text, vec![edit]),
            "# a view\n@cache\n@ensure_http_response\ndef v(request):\n    return 1"
        );
    }

    #[test]
    fn test_render_instance_settings() {
        let call = CallInfo {
            callee: Some("Django".into()),
            args: vec![],
            keywords: vec![
                ("DEBUG".into(), "True".into()),
                ("ADMIN_URL".into(), "\"secret-admin/\"".into()),
                ("lower".into(), "1".into()),
                ("ALLOWED_HOSTS".into(), "[\"*\"]".into()),
            ],
        };
        let (text, names) = render_instance_settings(&call, &["ADMIN_URL".to_string()]);
        assert_eq!(text, "DEBUG = True\nALLOWED_HOSTS = [\"*\"]");
        assert_eq!(names, vec!["DEBUG", "ALLOWED_HOSTS"]);
    }

    #[test]
    fn test_render_model_admin() {
        assert_eq!(render_model_admin("Book", &[]).0, "admin.site.register(Book)");
        let (text, binds) =
            render_model_admin("Book", &[("list_display".into(), "[\"title\"]".into())]);
        assert_eq!(
            text,
            "@admin.register(Book)\nclass BookAdmin(admin.ModelAdmin):\n    list_display = [\"title\"]"
        );
        assert_eq!(binds, vec!["BookAdmin"]);
    }

    #[test]
    fn test_render_url_pattern() {
        assert_eq!(
            render_url_pattern("\"/\"", "views.index", false, Some("\"index\"")),
            "path(\"\", views.index, name=\"index\")"
        );
        assert_eq!(
            render_url_pattern("\"/(?P<slug>[a-z])/\"", "views.slug", true, None),
            "re_path(r\"(?P<slug>[a-z])/\", views.slug)"
        );
        assert_eq!(
            render_url_pattern("\"api/\"", "api.urls", false, None),
            "path(\"api/\", api.urls)"
        );
    }

    #[test]
    fn test_render_base_settings() {
        let layout = ProjectLayout::new("site", "blog");
        let text = render_base_settings(&layout, "abc", Some("[\"django_htmx\"]"));
        assert!(text.contains("    \"site.blog\",\n]\nINSTALLED_APPS += [\"django_htmx\"]\n"));
        assert!(text.contains("ROOT_URLCONF = \"site.urls\""));
        assert!(text.contains("SECRET_KEY = \"django-insecure-abc\""));
        assert!(!render_base_settings(&layout, "abc", None).contains("+="));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
