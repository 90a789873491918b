//! Conversions written to disk: scaffold, assets, overwrite and failure
//! behaviour.

use std::fs;
use std::path::Path;

use outgrow_core::{
    Checkpoint, ConvertConfig, ConvertPlugin, Converter, HookContext, HookResult, OutgrowError,
    PluginRegistry,
};

const SOURCE: &str = "\
from nanodjango import Django
from django.db import models

app = Django(SQLITE_DATABASE=\"counter.db\")

class Click(models.Model):
    pass

@app.route(\"/\")
def index(request):
    return f\"{Click.objects.count()} clicks\"
";

fn write_script(dir: &Path) -> std::path::PathBuf {
    let script = dir.join("counter.py");
    fs::write(&script, SOURCE).unwrap();
    script
}

fn converter(overwrite: bool) -> Converter {
    let mut config = ConvertConfig::new("site", "counter");
    config.overwrite = overwrite;
    Converter::new(config).unwrap()
}

#[test]
fn test_writes_project_with_assets() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path());
    fs::write(dir.path().join("counter.db"), b"sqlite").unwrap();
    fs::create_dir_all(dir.path().join("templates")).unwrap();
    fs::write(dir.path().join("templates/index.html"), "<h1>hi</h1>").unwrap();

    let root = dir.path().join("out");
    let output = converter(false).convert_file(&script, &root).unwrap();

    for rel in [
        "manage.py",
        "site/__init__.py",
        "site/settings.py",
        "site/urls.py",
        "site/asgi.py",
        "site/wsgi.py",
        "site/counter/__init__.py",
        "site/counter/apps.py",
        "site/counter/models.py",
        "site/counter/views.py",
        "site/counter/urls.py",
    ] {
        assert!(root.join(rel).is_file(), "missing {rel}");
    }
    assert!(!root.join("site/counter/unused.py").exists());
    assert_eq!(fs::read(root.join("db.sqlite3")).unwrap(), b"sqlite");
    assert_eq!(
        fs::read_to_string(root.join("site/counter/templates/index.html")).unwrap(),
        "<h1>hi</h1>"
    );

    let on_disk = fs::read_to_string(root.join("site/counter/views.py")).unwrap();
    let generated = output.file("site/counter/views.py").unwrap();
    assert_eq!(on_disk, generated.contents);
    assert!(!dir.path().join("out.outgrow.lock").exists());
}

#[test]
fn test_inline_template_replaces_copied_template() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("counter.py");
    fs::write(
        &script,
        format!("{SOURCE}\napp.templates = {{\"index.html\": \"<h1>inline</h1>\"}}\n"),
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("templates")).unwrap();
    fs::write(dir.path().join("templates/index.html"), "<h1>copied</h1>").unwrap();
    fs::write(dir.path().join("templates/base.html"), "<html></html>").unwrap();

    let root = dir.path().join("out");
    converter(false).convert_file(&script, &root).unwrap();

    let templates = root.join("site/counter/templates");
    assert_eq!(
        fs::read_to_string(templates.join("index.html")).unwrap(),
        "<h1>inline</h1>"
    );
    assert_eq!(fs::read_to_string(templates.join("base.html")).unwrap(), "<html></html>");
    assert!(!root.join("site/counter/unused.py").exists());
}

#[test]
fn test_populated_target_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path());
    let root = dir.path().join("out");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("notes.txt"), "keep me").unwrap();

    let err = converter(false).convert_file(&script, &root).unwrap_err();
    assert!(matches!(err, OutgrowError::TargetExists(_)));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(fs::read_to_string(root.join("notes.txt")).unwrap(), "keep me");
    assert!(!root.join("manage.py").exists());
}

#[test]
fn test_overwrite_replaces_target() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path());
    let root = dir.path().join("out");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("notes.txt"), "old").unwrap();

    converter(true).convert_file(&script, &root).unwrap();
    assert!(!root.join("notes.txt").exists());
    assert!(root.join("manage.py").is_file());
}

struct Refuses;

impl ConvertPlugin for Refuses {
    fn name(&self) -> &str {
        "refuses"
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint::Sweep
    }

    fn run(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        panic!("cannot handle this program");
    }
}

#[test]
fn test_plugin_failure_leaves_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path());
    let root = dir.path().join("out");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("notes.txt"), "keep me").unwrap();

    let mut config = ConvertConfig::new("site", "counter");
    config.overwrite = true;
    let registry = PluginRegistry::builder().plugin(Refuses).build();
    let converter = Converter::with_registry(config, registry).unwrap();

    let err = converter.convert_file(&script, &root).unwrap_err();
    match &err {
        OutgrowError::Plugin {
            plugin, checkpoint, ..
        } => {
            assert_eq!(plugin, "refuses");
            assert_eq!(checkpoint, "sweep");
        }
        other => panic!("expected plugin error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 3);

    let entries: Vec<String> = fs::read_dir(&root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["notes.txt".to_string()]);
}

#[test]
fn test_json_rule_file_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let rules = dir.path().join("rules.json");
    fs::write(
        &rules,
        r#"[{"name": "tasks", "checkpoint": "start", "role": "view",
             "kinds": ["function"], "decorator": "celery\\.shared_task"}]"#,
    )
    .unwrap();
    let src = "\
from celery import shared_task

@shared_task
def work():
    return 1
";
    let mut config = ConvertConfig::new("site", "jobs");
    config.plugin_rules.push(rules);
    let output = Converter::new(config).unwrap().convert_source(src).unwrap();

    let views = &output.file("site/jobs/views.py").unwrap().contents;
    assert!(views.contains("from celery import shared_task"));
    assert!(views.contains("@shared_task\ndef work():"));
    assert!(output.report.swept.is_empty());
    assert!(output.report.plugins.iter().any(|p| p.plugin == "tasks" && p.claims == 1));
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = converter(false)
        .convert_file(&dir.path().join("nope.py"), &dir.path().join("out"))
        .unwrap_err();
    assert!(matches!(err, OutgrowError::Io(_)));
    assert!(!dir.path().join("out").exists());
}
