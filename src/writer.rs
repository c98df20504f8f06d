use crate::error::{Error, Result};
use serde::Serialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Name of the sidecar manifest written into the backup directory.
pub const FAILURE_MANIFEST: &str = "h1-failures.json";

/// A file the model could not convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Path relative to the root directory
    pub path: PathBuf,

    /// Why extraction failed
    pub reason: String,
}

/// Contents of [`FAILURE_MANIFEST`].
#[derive(Debug, Serialize)]
struct FailureManifest<'a> {
    /// Directory that was rewritten
    root: String,

    /// Number of failed files
    total: usize,

    /// Individual failures
    failures: &'a [FailureRecord],

    /// Generation timestamp
    generated_at: String,
}

/// Writes rewrite results back over the original files.
pub(crate) struct Writer {
    sentinel_marker: String,
}

impl Writer {
    /// Creates a writer that prefixes failure sentinels with `sentinel_marker`.
    pub(crate) fn new(sentinel_marker: impl Into<String>) -> Self {
        Self {
            sentinel_marker: sentinel_marker.into(),
        }
    }

    /// Replaces `path` with the rewritten code.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub(crate) async fn write_code(&self, path: &Path, code: &str) -> Result<()> {
        write_file_atomic(path, code).await
    }

    /// Replaces `path` with a sentinel line describing `failure`.
    ///
    /// For extraction failures the model's full response is embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub(crate) async fn write_sentinel(&self, path: &Path, failure: &Error) -> Result<()> {
        let response = match failure {
            Error::Extraction { response, .. } => response.as_str(),
            _ => "",
        };
        let sentinel = self.render_sentinel(path, &failure.to_string(), response);
        write_file_atomic(path, &sentinel).await
    }

    /// Builds the sentinel text for a failed file.
    ///
    /// The marker comes first so every failed file can be found with a
    /// single grep; the model's full response is kept verbatim.
    pub(crate) fn render_sentinel(&self, path: &Path, reason: &str, response: &str) -> String {
        format!(
            "{}// Error: cannot get code on file: \"{}\". {}. AI Message: \n\"{}\"\n",
            self.sentinel_marker,
            path.display(),
            reason,
            response
        )
    }

    /// Writes the failure manifest into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized or written.
    pub(crate) async fn write_failure_manifest(
        &self,
        dir: &Path,
        root: &Path,
        failures: &[FailureRecord],
    ) -> Result<PathBuf> {
        let manifest = FailureManifest {
            root: root.display().to_string(),
            total: failures.len(),
            failures,
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        };

        let manifest_path = dir.join(FAILURE_MANIFEST);
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&manifest_path, json)
            .await
            .map_err(|e| Error::io(&manifest_path, e))?;

        info!("Wrote failure manifest to {}", manifest_path.display());
        Ok(manifest_path)
    }
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Writes content to a hidden temporary sibling
/// 2. Syncs it to disk and gives it the target's permissions
/// 3. Renames it over the target path
///
/// An interrupted write leaves the previous content in place and removes the
/// temporary file.
async fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = temp_sibling(path)?;

    if let Err(e) = replace_with_temp(path, &temp_path, content).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
            debug!("Could not remove {}: {}", temp_path.display(), cleanup);
        }
        return Err(e);
    }

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

async fn replace_with_temp(path: &Path, temp_path: &Path, content: &str) -> Result<()> {
    let mut temp_file = tokio::fs::File::create(temp_path)
        .await
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .await
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .sync_all()
        .await
        .map_err(|e| Error::io(temp_path, e))?;

    drop(temp_file);

    match tokio::fs::metadata(path).await {
        Ok(metadata) => tokio::fs::set_permissions(temp_path, metadata.permissions())
            .await
            .map_err(|e| Error::io(temp_path, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(path, e)),
    }

    tokio::fs::rename(temp_path, path)
        .await
        .map_err(|e| Error::io(path, e))
}

/// `dir/.name.h1-tmp` for `dir/name`.
fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("Invalid file path: {}", path.display())))?;

    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".h1-tmp");

    Ok(path.with_file_name(temp_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[tokio::test]
    async fn test_write_code_replaces_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("main.py");
        file.write_str("old content").unwrap();

        Writer::new("# ").write_code(file.path(), "new content\n").await.unwrap();

        file.assert("new content\n");
        assert!(!temp.child(".main.py.h1-tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_writes_keep_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let script = temp.child("run.sh");
        script.write_str("echo hi").unwrap();
        std::fs::set_permissions(script.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        let mode = || std::fs::metadata(script.path()).unwrap().permissions().mode() & 0o777;

        let writer = Writer::new("# ");
        writer.write_code(script.path(), "echo hello\n").await.unwrap();
        assert_eq!(mode(), 0o755);

        let failure = Error::extraction("sh", "Error: no");
        writer.write_sentinel(script.path(), &failure).await.unwrap();
        assert_eq!(mode(), 0o755);
    }

    #[tokio::test]
    async fn test_write_code_creates_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("fresh.py");

        Writer::new("# ").write_code(file.path(), "pass\n").await.unwrap();

        file.assert("pass\n");
    }

    #[tokio::test]
    async fn test_failed_replace_removes_temp_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("target");
        target.child("inner.py").write_str("keep").unwrap();

        let result = Writer::new("# ").write_code(target.path(), "code").await;

        assert!(matches!(result, Err(Error::Io { .. })));
        assert!(!temp.child(".target.h1-tmp").exists());
        target.child("inner.py").assert("keep");
    }

    #[tokio::test]
    async fn test_write_sentinel_starts_with_marker() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("broken.py");
        file.write_str("print(1)").unwrap();

        let failure = Error::extraction("python", "Error: cannot convert");
        Writer::new("⍝ ")
            .write_sentinel(file.path(), &failure)
            .await
            .unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(written.starts_with("⍝ // Error: cannot get code on file:"));
        assert!(written.contains("broken.py"));
        assert!(written.contains("no code block in the correct language"));
        assert!(written.contains("\"Error: cannot convert\""));
    }

    #[test]
    fn test_render_sentinel_uses_configured_marker() {
        let sentinel = Writer::new("#!! ").render_sentinel(Path::new("a/b.rb"), "why", "what");
        assert_eq!(
            sentinel,
            "#!! // Error: cannot get code on file: \"a/b.rb\". why. AI Message: \n\"what\"\n"
        );
    }

    #[tokio::test]
    async fn test_write_failure_manifest() {
        let temp = assert_fs::TempDir::new().unwrap();
        let failures = vec![FailureRecord {
            path: PathBuf::from("src/a.py"),
            reason: "no code block".to_string(),
        }];

        let path = Writer::new("⍝ ")
            .write_failure_manifest(temp.path(), Path::new("src"), &failures)
            .await
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["root"], "src");
        assert_eq!(json["failures"][0]["path"], "src/a.py");
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_temp_sibling() {
        assert_eq!(
            temp_sibling(Path::new("dir/file.rs")).unwrap(),
            PathBuf::from("dir/.file.rs.h1-tmp")
        );
        assert!(temp_sibling(Path::new("/")).is_err());
    }
}
