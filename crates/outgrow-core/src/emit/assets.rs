//! Files next to the input script that belong in the generated project:
//! the SQLite database, `static/`, `templates/` and the migrations folder.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::classify::rules::{literal_or, FrameworkSettings};
use crate::classify::target::ProjectLayout;
use crate::errors::OutgrowResult;

const DEFAULT_DATABASE: &str = "db.sqlite3";
const DEFAULT_MIGRATIONS: &str = "migrations";

/// One file to copy into the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub source: PathBuf,
    /// Destination relative to the output root.
    pub dest: PathBuf,
}

fn collect_dir(source: &Path, dest: &Path, assets: &mut Vec<Asset>) -> OutgrowResult<()> {
    if !source.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        assets.push(Asset {
            source: entry.path().to_path_buf(),
            dest: dest.join(rel),
        });
    }
    Ok(())
}

/// Assets found next to `script`. Missing ones are skipped.
pub fn collect_assets(
    script: &Path,
    layout: &ProjectLayout,
    framework: &FrameworkSettings,
) -> OutgrowResult<Vec<Asset>> {
    let base = script.parent().unwrap_or_else(|| Path::new("."));
    let app_dir = layout.app_dir();
    let mut assets = Vec::new();

    let database = base.join(literal_or(
        framework.sqlite_database.as_deref(),
        DEFAULT_DATABASE,
    ));
    if database.is_file() {
        assets.push(Asset {
            source: database,
            dest: PathBuf::from(DEFAULT_DATABASE),
        });
    }

    let migrations = literal_or(framework.migrations_dir.as_deref(), DEFAULT_MIGRATIONS);
    for (dir, dest) in [
        ("static", "static"),
        ("templates", "templates"),
        (migrations.as_str(), "migrations"),
    ] {
        collect_dir(&base.join(dir), &app_dir.join(dest), &mut assets)?;
    }

    debug!(count = assets.len(), "assets collected");
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_database_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("counter.py");
        std::fs::write(&script, "").unwrap();
        std::fs::write(dir.path().join("db.sqlite3"), b"db").unwrap();
        std::fs::create_dir_all(dir.path().join("templates/counter")).unwrap();
        std::fs::write(dir.path().join("templates/counter/index.html"), "<p>").unwrap();
        std::fs::create_dir_all(dir.path().join("migrations")).unwrap();
        std::fs::write(dir.path().join("migrations/0001_initial.py"), "").unwrap();

        let layout = ProjectLayout::new("site", "counter");
        let assets = collect_assets(&script, &layout, &FrameworkSettings::default()).unwrap();
        let dests: Vec<PathBuf> = assets.iter().map(|a| a.dest.clone()).collect();
        assert_eq!(
            dests,
            vec![
                PathBuf::from("db.sqlite3"),
                PathBuf::from("site/counter/templates/counter/index.html"),
                PathBuf::from("site/counter/migrations/0001_initial.py"),
            ]
        );
    }

    #[test]
    fn test_custom_database_and_migrations_names() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        std::fs::write(dir.path().join("data.db"), b"db").unwrap();
        std::fs::create_dir_all(dir.path().join("schema")).unwrap();
        std::fs::write(dir.path().join("schema/0001.py"), "").unwrap();

        let framework = FrameworkSettings {
            sqlite_database: Some("\"data.db\"".into()),
            migrations_dir: Some("'schema'".into()),
            ..Default::default()
        };
        let assets = collect_assets(&script, &ProjectLayout::new("p", "a"), &framework).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].source, dir.path().join("data.db"));
        assert_eq!(assets[0].dest, PathBuf::from("db.sqlite3"));
        assert_eq!(assets[1].dest, PathBuf::from("p/a/migrations/0001.py"));
    }

    #[test]
    fn test_nothing_to_collect() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        let assets =
            collect_assets(&script, &ProjectLayout::new("p", "a"), &FrameworkSettings::default())
                .unwrap();
        assert!(assets.is_empty());
    }
}
