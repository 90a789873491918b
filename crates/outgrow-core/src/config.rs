//! Conversion settings: names of the generated project, the framework
//! conventions the built-in stages recognise, and plugin sources.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::target::ProjectLayout;
use crate::errors::{OutgrowError, OutgrowResult};

static MODULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static DOTTED_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$").unwrap()
});

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Settings keys consumed by the framework itself; they never reach the
/// generated settings module.
pub const FRAMEWORK_SETTINGS: &[&str] = &[
    "ADMIN_URL",
    "EXTRA_APPS",
    "SQLITE_DATABASE",
    "MIGRATIONS_DIR",
    "API_URL",
];

pub const DEFAULT_API_URL: &str = "api/";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub project_name: String,
    pub app_name: String,
    pub target_root: Option<PathBuf>,
    /// Replace a non-empty target directory instead of refusing.
    pub overwrite: bool,
    /// Module the single-file framework is imported from.
    pub framework_module: String,
    /// Class whose instance is the application object.
    pub framework_class: String,
    /// Name of the application instance, when detection should be skipped.
    pub instance_name: Option<String>,
    /// Fully qualified base classes that mark a model.
    pub model_bases: Vec<String>,
    /// Fully qualified base classes that mark a model admin.
    pub admin_bases: Vec<String>,
    /// Names treated as settings in addition to upper-case names.
    pub extra_settings: Vec<String>,
    pub framework_settings: Vec<String>,
    /// Fully qualified API toolkit class, e.g. `ninja.NinjaAPI`.
    pub api_toolkit: String,
    /// JSON rule files loaded as plugins, in order.
    pub plugin_rules: Vec<PathBuf>,
    /// Bundled plugins to leave out.
    pub disabled_plugins: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        ConvertConfig {
            project_name: "project".to_string(),
            app_name: "app".to_string(),
            target_root: None,
            overwrite: false,
            framework_module: "nanodjango".to_string(),
            framework_class: "Django".to_string(),
            instance_name: None,
            model_bases: vec![
                "django.db.models.Model".to_string(),
                "django.contrib.auth.models.AbstractUser".to_string(),
                "django.contrib.auth.models.AbstractBaseUser".to_string(),
            ],
            admin_bases: vec!["django.contrib.admin.ModelAdmin".to_string()],
            extra_settings: Vec::new(),
            framework_settings: FRAMEWORK_SETTINGS.iter().map(|s| s.to_string()).collect(),
            api_toolkit: "ninja.NinjaAPI".to_string(),
            plugin_rules: Vec::new(),
            disabled_plugins: Vec::new(),
        }
    }
}

impl ConvertConfig {
    pub fn new(project_name: &str, app_name: &str) -> Self {
        ConvertConfig {
            project_name: project_name.to_string(),
            app_name: app_name.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> OutgrowResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> OutgrowResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project_name, &self.app_name)
    }

    /// `(module, name)` of the API toolkit class.
    pub fn api_toolkit_parts(&self) -> (&str, &str) {
        self.api_toolkit
            .rsplit_once('.')
            .unwrap_or(("ninja", self.api_toolkit.as_str()))
    }

    pub fn validate(&self) -> OutgrowResult<()> {
        for (label, name) in [("project", &self.project_name), ("app", &self.app_name)] {
            if !MODULE_NAME_RE.is_match(name) || PYTHON_KEYWORDS.contains(&name.as_str()) {
                return Err(OutgrowError::Config(format!(
                    "{label} name `{name}` is not a valid Python module name"
                )));
            }
        }
        if self.project_name == self.app_name {
            return Err(OutgrowError::Config(format!(
                "project and app cannot share the name `{}`",
                self.app_name
            )));
        }
        if !MODULE_NAME_RE.is_match(&self.framework_class) {
            return Err(OutgrowError::Config(format!(
                "framework class `{}` is not an identifier",
                self.framework_class
            )));
        }
        if let Some(instance) = &self.instance_name {
            if !MODULE_NAME_RE.is_match(instance) {
                return Err(OutgrowError::Config(format!(
                    "instance name `{instance}` is not an identifier"
                )));
            }
        }
        for path in self
            .model_bases
            .iter()
            .chain(&self.admin_bases)
            .chain(std::iter::once(&self.api_toolkit))
        {
            if !DOTTED_PATH_RE.is_match(path) {
                return Err(OutgrowError::Config(format!(
                    "`{path}` is not a fully qualified class path"
                )));
            }
        }
        Ok(())
    }
}
