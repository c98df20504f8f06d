//! Backup directory allocation and mirroring of original files.

use crate::config::BackupPolicy;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Suffix appended to the source directory to name its backup.
pub const BACKUP_SUFFIX: &str = ".h2-backup";

/// Returns the backup directory for `source_dir` under `policy`.
///
/// With [`BackupPolicy::Single`] the base path `<source_dir>.h2-backup` is
/// returned as is, even if it already exists. With
/// [`BackupPolicy::Numbered`] the first of `<base>.0`, `<base>.1`, ... that
/// does not exist at call time is returned.
///
/// # Examples
///
/// ```no_run
/// use h1_code::{BackupPolicy, allocate_backup_dir};
/// use std::path::Path;
///
/// let dir = allocate_backup_dir(Path::new("src"), BackupPolicy::Single);
/// assert_eq!(dir, Path::new("src.h2-backup"));
/// ```
#[must_use]
pub fn allocate_backup_dir(source_dir: &Path, policy: BackupPolicy) -> PathBuf {
    let base = base_backup_path(source_dir);

    if policy == BackupPolicy::Single {
        return base;
    }

    let mut version: u32 = 0;
    loop {
        let candidate = with_suffix(&base, &format!(".{version}"));
        if !candidate.exists() {
            debug!("Allocated backup directory {}", candidate.display());
            return candidate;
        }
        trace!("Backup candidate taken: {}", candidate.display());
        version += 1;
    }
}

/// Copies `original` to `<backup_dir>/<relative_path>`, creating parent
/// directories. An existing backup at that path is overwritten.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or the file cannot be
/// written.
pub async fn mirror_original(
    backup_dir: &Path,
    relative_path: &Path,
    original: &[u8],
) -> Result<PathBuf> {
    let backup_file = backup_dir.join(relative_path);

    if let Some(parent) = backup_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    tokio::fs::write(&backup_file, original)
        .await
        .map_err(|e| Error::io(&backup_file, e))?;

    trace!("Backed up {} bytes to {}", original.len(), backup_file.display());
    Ok(backup_file)
}

/// `<source_dir>.h2-backup`, ignoring any trailing separator on `source_dir`.
fn base_backup_path(source_dir: &Path) -> PathBuf {
    let normalized: PathBuf = source_dir.components().collect();
    with_suffix(&normalized, BACKUP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_single_backup_returns_base() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("project");
        source.create_dir_all().unwrap();

        let backup = allocate_backup_dir(source.path(), BackupPolicy::Single);

        assert_eq!(backup, temp.path().join("project.h2-backup"));
    }

    #[test]
    fn test_single_backup_reuses_existing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("project").create_dir_all().unwrap();
        temp.child("project.h2-backup").create_dir_all().unwrap();

        let backup = allocate_backup_dir(&temp.path().join("project"), BackupPolicy::Single);

        assert_eq!(backup, temp.path().join("project.h2-backup"));
    }

    #[test]
    fn test_numbered_backup_starts_at_zero() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("project").create_dir_all().unwrap();

        let backup = allocate_backup_dir(&temp.path().join("project"), BackupPolicy::Numbered);

        assert_eq!(backup, temp.path().join("project.h2-backup.0"));
        assert!(!backup.exists());
    }

    #[test]
    fn test_numbered_backup_skips_existing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("project").create_dir_all().unwrap();
        temp.child("project.h2-backup.0").create_dir_all().unwrap();
        temp.child("project.h2-backup.1").create_dir_all().unwrap();

        let backup = allocate_backup_dir(&temp.path().join("project"), BackupPolicy::Numbered);

        assert_eq!(backup, temp.path().join("project.h2-backup.2"));
    }

    #[test]
    fn test_numbered_backup_treats_files_as_taken() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("project").create_dir_all().unwrap();
        temp.child("project.h2-backup.0").write_str("not a dir").unwrap();

        let backup = allocate_backup_dir(&temp.path().join("project"), BackupPolicy::Numbered);

        assert_eq!(backup, temp.path().join("project.h2-backup.1"));
    }

    #[test]
    fn test_trailing_separator_is_ignored() {
        let source = PathBuf::from("some/project/");
        let backup = allocate_backup_dir(&source, BackupPolicy::Single);

        assert_eq!(backup, PathBuf::from("some/project.h2-backup"));
    }

    #[tokio::test]
    async fn test_mirror_original_creates_parents() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backup_dir = temp.child("backup");

        let written = mirror_original(backup_dir.path(), Path::new("a/b/c.py"), b"print(1)\n")
            .await
            .unwrap();

        assert_eq!(written, backup_dir.path().join("a/b/c.py"));
        backup_dir.child("a/b/c.py").assert("print(1)\n");
    }

    #[tokio::test]
    async fn test_mirror_original_overwrites() {
        let temp = assert_fs::TempDir::new().unwrap();
        let backup_dir = temp.child("backup");
        backup_dir.child("main.py").write_str("stale").unwrap();

        mirror_original(backup_dir.path(), Path::new("main.py"), b"fresh")
            .await
            .unwrap();

        backup_dir.child("main.py").assert("fresh");
    }
}
