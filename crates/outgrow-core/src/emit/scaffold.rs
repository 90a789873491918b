//! Fixed project files around the generated modules: `manage.py`, the
//! project package (urls, asgi, wsgi) and the app package boilerplate.

use std::path::PathBuf;

use crate::classify::rules::literal_or;
use crate::classify::target::ProjectLayout;
use crate::program::syntax::strip_leading_slash;

const DEFAULT_ADMIN_URL: &str = "admin/";

/// What the scaffold needs to know about the generated modules.
#[derive(Clone, Debug, Default)]
pub struct ScaffoldOptions {
    /// Source text of the app's `ADMIN_URL` argument, if given.
    pub admin_url: Option<String>,
    pub app_has_urls: bool,
    pub has_template_tags: bool,
}

/// `my_app` -> `MyApp`
fn camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn manage_py(layout: &ProjectLayout) -> String {
    format!(
        r#"#!/usr/bin/env python
"""Django's command-line utility for administrative tasks."""
import os
import sys


def main():
    """Run administrative tasks."""
    os.environ.setdefault("DJANGO_SETTINGS_MODULE", "{project}.settings")
    try:
        from django.core.management import execute_from_command_line
    except ImportError as exc:
        raise ImportError(
            "Couldn't import Django. Are you sure it's installed and "
            "available on your PYTHONPATH environment variable? Did you "
            "forget to activate a virtual environment?"
        ) from exc
    execute_from_command_line(sys.argv)


if __name__ == "__main__":
    main()
"#,
        project = layout.project
    )
}

fn project_urls(layout: &ProjectLayout, options: &ScaffoldOptions) -> String {
    let admin_url = strip_leading_slash(&format!(
        "\"{}\"",
        literal_or(options.admin_url.as_deref(), DEFAULT_ADMIN_URL)
    ));
    let (urls_import, include) = if options.app_has_urls {
        (
            "from django.urls import include, path",
            format!("\n    path(\"\", include(\"{}.urls\")),", layout.app_package()),
        )
    } else {
        ("from django.urls import path", String::new())
    };
    format!(
        r#""""
URL configuration for {project}
"""

from django.contrib import admin
{urls_import}

urlpatterns = [
    path({admin_url}, admin.site.urls),{include}
]
"#,
        project = layout.project,
    )
}

fn server_entry(layout: &ProjectLayout, kind: &str) -> String {
    let (module, function, upper) = match kind {
        "asgi" => ("django.core.asgi", "get_asgi_application", "ASGI"),
        _ => ("django.core.wsgi", "get_wsgi_application", "WSGI"),
    };
    format!(
        r#""""
{upper} config for {project}
"""

import os

from {module} import {function}

os.environ.setdefault("DJANGO_SETTINGS_MODULE", "{project}.settings")

application = {function}()
"#,
        project = layout.project,
    )
}

fn apps_py(layout: &ProjectLayout) -> String {
    format!(
        r#"from django.apps import AppConfig


class {class}Config(AppConfig):
    default_auto_field = "django.db.models.BigAutoField"
    name = "{package}"
"#,
        class = camel_case(&layout.app),
        package = layout.app_package(),
    )
}

/// Scaffold files as `(path relative to the output root, contents)`.
pub fn scaffold_files(layout: &ProjectLayout, options: &ScaffoldOptions) -> Vec<(PathBuf, String)> {
    let project = PathBuf::from(&layout.project);
    let app = project.join(&layout.app);

    let mut files = vec![
        (PathBuf::from("manage.py"), manage_py(layout)),
        (project.join("__init__.py"), String::new()),
        (project.join("urls.py"), project_urls(layout, options)),
        (project.join("asgi.py"), server_entry(layout, "asgi")),
        (project.join("wsgi.py"), server_entry(layout, "wsgi")),
        (app.join("__init__.py"), String::new()),
        (app.join("apps.py"), apps_py(layout)),
    ];
    if options.has_template_tags {
        files.push((app.join("templatetags").join("__init__.py"), String::new()));
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("counter"), "Counter");
        assert_eq!(camel_case("my_blog_app"), "MyBlogApp");
        assert_eq!(camel_case("_private"), "Private");
    }

    #[test]
    fn test_project_urls_with_app_and_admin_url() {
        let layout = ProjectLayout::new("site", "blog");
        let text = project_urls(
            &layout,
            &ScaffoldOptions {
                admin_url: Some("\"/dashboard/\"".into()),
                app_has_urls: true,
                has_template_tags: false,
            },
        );
        assert!(text.contains("from django.urls import include, path\n"));
        assert!(text.contains("    path(\"dashboard/\", admin.site.urls),\n    path(\"\", include(\"site.blog.urls\")),\n]"));
    }

    #[test]
    fn test_project_urls_without_app_urls() {
        let layout = ProjectLayout::new("site", "blog");
        let text = project_urls(&layout, &ScaffoldOptions::default());
        assert!(text.contains("from django.urls import path\n"));
        assert!(text.contains("    path(\"admin/\", admin.site.urls),\n]"));
        assert!(!text.contains("include"));
    }

    #[test]
    fn test_scaffold_paths() {
        let layout = ProjectLayout::new("site", "blog");
        let files = scaffold_files(
            &layout,
            &ScaffoldOptions {
                has_template_tags: true,
                ..Default::default()
            },
        );
        let paths: Vec<String> = files.iter().map(|(p, _)| p.display().to_string()).collect();
        assert!(paths.contains(&"manage.py".to_string()));
        assert!(paths.contains(&"site/wsgi.py".to_string()));
        assert!(paths.contains(&"site/blog/apps.py".to_string()));
        assert!(paths.contains(&"site/blog/templatetags/__init__.py".to_string()));
        let apps = &files.iter().find(|(p, _)| p.ends_with("apps.py")).unwrap().1;
        assert!(apps.contains("class BlogConfig(AppConfig):"));
        assert!(apps.contains("name = \"site.blog\""));
    }
}
