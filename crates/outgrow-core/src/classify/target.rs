//! Roles, output modules, and where each module lives in the project.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Setting,
    Model,
    AdminRegistration,
    View,
    ApiEndpoint,
    UrlRoute,
    TemplateTag,
    Unclassified,
}

impl Role {
    /// Module a declaration with this role is bound to when claimed.
    pub fn default_target(self) -> TargetFile {
        match self {
            Role::Setting => TargetFile::Settings,
            Role::Model => TargetFile::Models,
            Role::AdminRegistration => TargetFile::Admin,
            Role::View => TargetFile::Views,
            Role::ApiEndpoint => TargetFile::Api,
            Role::UrlRoute => TargetFile::Urls,
            Role::TemplateTag => TargetFile::TemplateTags,
            Role::Unclassified => TargetFile::Unused,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Setting => "setting",
            Role::Model => "model",
            Role::AdminRegistration => "admin_registration",
            Role::View => "view",
            Role::ApiEndpoint => "api_endpoint",
            Role::UrlRoute => "url_route",
            Role::TemplateTag => "template_tag",
            Role::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated module a declaration can be owned by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFile {
    Settings,
    Models,
    Admin,
    Views,
    Api,
    Urls,
    TemplateTags,
    Unused,
}

impl TargetFile {
    /// Pipeline order. Dependency adoption walks targets in this order.
    pub const ALL: [TargetFile; 8] = [
        TargetFile::Settings,
        TargetFile::Models,
        TargetFile::Admin,
        TargetFile::Views,
        TargetFile::Api,
        TargetFile::Urls,
        TargetFile::TemplateTags,
        TargetFile::Unused,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetFile::Settings => "settings",
            TargetFile::Models => "models",
            TargetFile::Admin => "admin",
            TargetFile::Views => "views",
            TargetFile::Api => "api",
            TargetFile::Urls => "urls",
            TargetFile::TemplateTags => "template_tags",
            TargetFile::Unused => "unused",
        }
    }

    /// Whether the module sits inside the app package (everything except
    /// the project settings).
    pub fn in_app(self) -> bool {
        self != TargetFile::Settings
    }

    /// Package depth below the app package: template tags live one level down.
    fn app_depth(self) -> usize {
        match self {
            TargetFile::TemplateTags => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for TargetFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the generated project and app, and the module paths derived
/// from them.
///
/// ```text
/// <root>/manage.py
/// <root>/<project>/settings.py
/// <root>/<project>/<app>/models.py
/// <root>/<project>/<app>/templatetags/<app>.py
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectLayout {
    pub project: String,
    pub app: String,
}

impl ProjectLayout {
    pub fn new(project: impl Into<String>, app: impl Into<String>) -> Self {
        ProjectLayout {
            project: project.into(),
            app: app.into(),
        }
    }

    /// Dotted path of the app package, e.g. `mysite.counter`.
    pub fn app_package(&self) -> String {
        format!("{}.{}", self.project, self.app)
    }

    fn stem(&self, target: TargetFile) -> &str {
        match target {
            TargetFile::TemplateTags => &self.app,
            other => other.as_str(),
        }
    }

    /// Absolute dotted module path of a target.
    pub fn module_path(&self, target: TargetFile) -> String {
        match target {
            TargetFile::Settings => format!("{}.settings", self.project),
            TargetFile::TemplateTags => {
                format!("{}.templatetags.{}", self.app_package(), self.app)
            }
            other => format!("{}.{}", self.app_package(), self.stem(other)),
        }
    }

    /// Directory of the app package, relative to the output root.
    pub fn app_dir(&self) -> PathBuf {
        PathBuf::from(&self.project).join(&self.app)
    }

    /// File path of a target, relative to the output root.
    pub fn rel_path(&self, target: TargetFile) -> PathBuf {
        let mut path = PathBuf::from(&self.project);
        if target.in_app() {
            path.push(&self.app);
        }
        if target == TargetFile::TemplateTags {
            path.push("templatetags");
        }
        path.push(format!("{}.py", self.stem(target)));
        path
    }

    /// Module to import from when `importer` needs a name owned by `owner`.
    ///
    /// Modules inside the app package import each other relatively; the
    /// project settings module is imported (and imports) absolutely.
    pub fn import_module(&self, importer: TargetFile, owner: TargetFile) -> String {
        if !importer.in_app() || !owner.in_app() {
            return self.module_path(owner);
        }
        let dots = ".".repeat(importer.app_depth() + 1);
        match owner {
            TargetFile::TemplateTags => format!("{dots}templatetags.{}", self.app),
            other => format!("{dots}{}", self.stem(other)),
        }
    }
}
