//! Putting a generated project on disk.
//!
//! A conversion owns its target for the whole write: an in-process registry
//! keeps two threads apart and a `<root>.outgrow.lock` sibling keeps two
//! processes apart. Files are staged in a sibling directory and renamed
//! into place, so a failure leaves the previous target as it was. The only
//! exception is a failed restore after the swap, which is reported as
//! [`OutgrowError::IncompleteOutput`].

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{OutgrowError, OutgrowResult};

static ACTIVE_TARGETS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    /// Copy an existing file byte for byte.
    Copy(PathBuf),
}

/// One file of the output, relative to the target root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedFile {
    pub rel_path: PathBuf,
    pub payload: Payload,
}

impl PlannedFile {
    pub fn text(rel_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        PlannedFile {
            rel_path: rel_path.into(),
            payload: Payload::Text(contents.into()),
        }
    }

    pub fn copy(rel_path: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        PlannedFile {
            rel_path: rel_path.into(),
            payload: Payload::Copy(source.into()),
        }
    }
}

fn absolute(path: &Path) -> OutgrowResult<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// `<parent>/<name><suffix>` for a target root.
fn sibling(root: &Path, suffix: &str) -> OutgrowResult<PathBuf> {
    let name = root.file_name().ok_or_else(|| {
        OutgrowError::Config(format!("target {} has no final component", root.display()))
    })?;
    Ok(root.with_file_name(format!("{}{suffix}", name.to_string_lossy())))
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Whether `root` exists with something in it.
pub fn is_populated(root: &Path) -> OutgrowResult<bool> {
    if !root.exists() {
        return Ok(false);
    }
    if !root.is_dir() {
        return Ok(true);
    }
    Ok(fs::read_dir(root)?.next().is_some())
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

/// Exclusive claim on a target root, released on drop.
#[derive(Debug)]
pub struct TargetLock {
    root: PathBuf,
    lock_file: PathBuf,
}

impl TargetLock {
    pub fn acquire(root: &Path) -> OutgrowResult<Self> {
        let root = absolute(root)?;
        let lock_file = sibling(&root, ".outgrow.lock")?;

        if !ACTIVE_TARGETS.lock().insert(root.clone()) {
            return Err(OutgrowError::TargetLocked(root));
        }

        let created = lock_file
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| {
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&lock_file)
            });
        match created {
            Ok(mut file) => {
                // The pid is informational only.
                let _ = writeln!(file, "{}", std::process::id());
                debug!(target = %root.display(), "target locked");
                Ok(TargetLock { root, lock_file })
            }
            Err(err) => {
                ACTIVE_TARGETS.lock().remove(&root);
                if err.kind() == ErrorKind::AlreadyExists {
                    Err(OutgrowError::TargetLocked(root))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.lock_file) {
            warn!(lock = %self.lock_file.display(), error = %err, "could not remove lock file");
        }
        ACTIVE_TARGETS.lock().remove(&self.root);
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn stage(staging: &Path, files: &[PlannedFile]) -> OutgrowResult<()> {
    fs::create_dir_all(staging)?;
    for file in files {
        let dest = staging.join(&file.rel_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        match &file.payload {
            Payload::Text(text) => fs::write(&dest, text)?,
            Payload::Copy(source) => {
                fs::copy(source, &dest).map_err(|err| {
                    std::io::Error::new(
                        err.kind(),
                        format!("copying {}: {err}", source.display()),
                    )
                })?;
            }
        }
    }
    Ok(())
}

/// Move the staged tree into place, keeping the previous target until the
/// new one is in.
fn swap(root: &Path, staging: &Path) -> OutgrowResult<()> {
    if !root.exists() {
        if let Some(parent) = root.parent() {
            fs::create_dir_all(parent)?;
        }
        return Ok(fs::rename(staging, root)?);
    }

    let backup = sibling(root, &format!(".outgrow-backup-{}", std::process::id()))?;
    if backup.exists() {
        remove_path(&backup)?;
    }
    fs::rename(root, &backup)?;
    if let Err(err) = fs::rename(staging, root) {
        return match fs::rename(&backup, root) {
            Ok(()) => Err(err.into()),
            Err(restore) => Err(OutgrowError::IncompleteOutput {
                path: root.to_path_buf(),
                message: format!(
                    "{err}; previous contents left at {}: {restore}",
                    backup.display()
                ),
            }),
        };
    }
    if let Err(err) = remove_path(&backup) {
        warn!(backup = %backup.display(), error = %err, "could not remove previous target");
    }
    Ok(())
}

/// Write `files` under `root`.
///
/// Refuses a populated `root` unless `overwrite` is set, in which case the
/// previous contents are replaced as a whole.
pub fn write_project(root: &Path, files: &[PlannedFile], overwrite: bool) -> OutgrowResult<()> {
    let root = absolute(root)?;
    if !overwrite && is_populated(&root)? {
        return Err(OutgrowError::TargetExists(root));
    }

    let lock = TargetLock::acquire(&root)?;
    // Re-check now that nobody else can be writing.
    if !overwrite && is_populated(&root)? {
        return Err(OutgrowError::TargetExists(root));
    }

    let staging = sibling(&root, &format!(".outgrow-staging-{}", std::process::id()))?;
    if staging.exists() {
        remove_path(&staging)?;
    }
    let result = stage(&staging, files).and_then(|()| swap(&root, &staging));
    if staging.exists() {
        if let Err(err) = remove_path(&staging) {
            warn!(staging = %staging.display(), error = %err, "could not remove staging directory");
        }
    }
    result?;

    info!(target = %lock.root().display(), files = files.len(), "project written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<PlannedFile> {
        vec![
            PlannedFile::text("manage.py", "print('hi')\n"),
            PlannedFile::text("site/blog/models.py", "# models\n"),
        ]
    }

    #[test]
    fn test_writes_new_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        write_project(&root, &files(), false).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("site/blog/models.py")).unwrap(),
            "# models\n"
        );
        assert!(!dir.path().join("out.outgrow.lock").exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_empty_existing_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        fs::create_dir(&root).unwrap();
        write_project(&root, &files(), false).unwrap();
        assert!(root.join("manage.py").is_file());
    }

    #[test]
    fn test_populated_target_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("keep.txt"), "mine").unwrap();

        let err = write_project(&root, &files(), false).unwrap_err();
        assert!(matches!(err, OutgrowError::TargetExists(_)));
        assert_eq!(fs::read_to_string(root.join("keep.txt")).unwrap(), "mine");

        write_project(&root, &files(), true).unwrap();
        assert!(!root.join("keep.txt").exists());
        assert!(root.join("manage.py").is_file());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let lock = TargetLock::acquire(&root).unwrap();
        assert!(dir.path().join("out.outgrow.lock").exists());

        let err = write_project(&root, &files(), false).unwrap_err();
        assert!(matches!(err, OutgrowError::TargetLocked(_)));

        drop(lock);
        assert!(!dir.path().join("out.outgrow.lock").exists());
        write_project(&root, &files(), false).unwrap();
    }

    #[test]
    fn test_foreign_lock_file_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        fs::write(dir.path().join("out.outgrow.lock"), "4242\n").unwrap();
        let err = write_project(&root, &files(), false).unwrap_err();
        assert!(matches!(err, OutgrowError::TargetLocked(_)));
        assert!(dir.path().join("out.outgrow.lock").exists());
        assert!(!root.exists());
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("keep.txt"), "mine").unwrap();

        let mut planned = files();
        planned.push(PlannedFile::copy("db.sqlite3", dir.path().join("missing.db")));
        let err = write_project(&root, &planned, true).unwrap_err();
        assert!(matches!(err, OutgrowError::Io(_)));

        assert_eq!(fs::read_to_string(root.join("keep.txt")).unwrap(), "mine");
        assert!(!root.join("manage.py").exists());
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["out".to_string()]);
    }
}
