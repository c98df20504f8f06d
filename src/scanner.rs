use crate::{
    config::Config,
    error::{Error, Result},
};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// A file selected for rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path as discovered under the root directory
    pub absolute_path: PathBuf,

    /// Path relative to the root directory
    pub relative_path: PathBuf,
}

impl SourceFile {
    /// Returns the file name for display.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.absolute_path.file_name().map_or_else(
            || self.relative_path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

/// Statistics collected during scanning.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScanStats {
    /// Entries visited
    visited: usize,

    /// Files whose name matched the extension
    matched: usize,

    /// Walk errors encountered
    errors: usize,
}

/// Recursively finds files whose name ends with the configured extension.
pub(crate) struct Scanner {
    root_dir: PathBuf,
    extension: String,
    matcher: GlobMatcher,
}

impl Scanner {
    /// Creates a new scanner from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension cannot be turned into a glob.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let pattern = format!("*{}", globset::escape(&config.extension));
        let matcher = Glob::new(&pattern)
            .map_err(|e| Error::config(format!("Invalid extension '{}': {e}", config.extension)))?
            .compile_matcher();

        Ok(Self {
            root_dir: config.root_dir.clone(),
            extension: config.extension.clone(),
            matcher,
        })
    }

    /// Scans the root directory and returns matching files sorted by path.
    ///
    /// Hidden files and ignored paths are included; every regular file whose
    /// name ends with the extension is a candidate. Walk errors are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFiles`] if nothing matches.
    pub(crate) fn scan(&self) -> Result<Vec<SourceFile>> {
        let mut stats = ScanStats::default();
        let mut files = Vec::new();

        debug!("Scanning {} for *{}", self.root_dir.display(), self.extension);

        for entry in WalkDir::new(&self.root_dir)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };
            stats.visited += 1;

            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }

            trace!("Matched {}", entry.path().display());
            stats.matched += 1;
            files.push(self.source_file(entry.path()));
        }

        debug!(
            "Scan complete: {} visited, {} matched, {} errors",
            stats.visited, stats.matched, stats.errors
        );

        if files.is_empty() {
            return Err(Error::no_files(&self.root_dir, &self.extension));
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }

    fn source_file(&self, path: &Path) -> SourceFile {
        let relative_path = pathdiff::diff_paths(path, &self.root_dir)
            .unwrap_or_else(|| path.to_path_buf());

        SourceFile {
            absolute_path: path.to_path_buf(),
            relative_path,
        }
    }
}
