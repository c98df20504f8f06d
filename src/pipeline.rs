use crate::{
    backup::{allocate_backup_dir, mirror_original},
    client::{FragmentObserver, LineEcho, RewriteClient, RewriteRequest, Silent},
    config::Config,
    error::{Error, Result},
    prompt::system_prompt,
    scanner::{Scanner, SourceFile},
    writer::{FailureRecord, Writer},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Statistics collected during a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Files whose name matched the extension
    pub total_files: usize,

    /// Files overwritten with rewritten code
    pub rewritten: usize,

    /// Files overwritten with a failure sentinel
    pub failed: usize,

    /// Files left untouched (inside the backup directory or not UTF-8)
    pub skipped: usize,

    /// Backup directory used (or planned, in dry run mode)
    pub backup_dir: PathBuf,

    /// Files the model could not convert
    pub failures: Vec<FailureRecord>,

    /// Total execution time
    pub duration: Duration,

    /// Whether this was a dry run
    pub dry_run: bool,
}

impl RunStats {
    fn new(total_files: usize, backup_dir: PathBuf, dry_run: bool) -> Self {
        Self {
            total_files,
            rewritten: 0,
            failed: 0,
            skipped: 0,
            backup_dir,
            failures: Vec::new(),
            duration: Duration::ZERO,
            dry_run,
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                 Rewrite Summary                       ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Files matched:        {:>8}                        ║",
            self.total_files
        );
        println!(
            "║   - Rewritten:        {:>8}                        ║",
            self.rewritten
        );
        println!(
            "║   - Failed:           {:>8}                        ║",
            self.failed
        );
        println!(
            "║   - Skipped:          {:>8}                        ║",
            self.skipped
        );
        println!("║ Backup Directory:                                     ║");
        println!("║   {}", self.backup_dir.display());
        println!(
            "║ Total time:           {:>8.2}s                       ║",
            self.duration.as_secs_f64()
        );
        if self.dry_run {
            println!("║ ⚠ No files were touched (dry run mode)                ║");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for failure in &self.failures {
            println!("✗ {}: {}", failure.path.display(), failure.reason);
        }
    }
}

/// What happened to one file.
#[derive(Debug)]
enum FileOutcome {
    Written,
    WrittenAsError(FailureRecord),
    Skipped,
}

/// Rewrites every matching file under the root directory, one at a time.
pub struct Pipeline {
    config: Config,
    scanner: Scanner,
    client: RewriteClient,
    writer: Writer,
    system_prompt: String,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The HTTP client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let scanner = Scanner::new(&config)?;
        let client = RewriteClient::new(config.connection.clone())?;
        let writer = Writer::new(config.sentinel_marker.clone());
        let system_prompt = system_prompt(&config.language_name, config.doc_level)?;

        Ok(Self {
            config,
            scanner,
            client,
            writer,
            system_prompt,
        })
    }

    /// Executes the run and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Allocate**: chooses the backup directory
    /// 2. **Scan**: finds files ending with the extension
    /// 3. **Rewrite**: per file, backs up the original, streams a rewrite and
    ///    writes the code or a failure sentinel in place
    /// 4. **Report**: writes the failure manifest if any file failed
    ///
    /// # Errors
    ///
    /// Returns an error if no file matches, on any I/O failure, or when the
    /// completion endpoint fails. Files already processed keep their new
    /// content; the remaining files are left untouched.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use h1_code::{Config, Pipeline};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .root_dir("./lib")
    ///     .extension(".dart")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run().await?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(root_dir = %self.config.root_dir.display()))]
    pub async fn run(self) -> Result<RunStats> {
        let start_time = Instant::now();

        let backup_dir = self.config.backup_dir.clone().unwrap_or_else(|| {
            allocate_backup_dir(&self.config.root_dir, self.config.backup_policy)
        });

        let files = self.scanner.scan()?;
        info!(
            "Found {} *{} files, language {}",
            files.len(),
            self.config.extension,
            self.config.language_name
        );

        let mut stats = RunStats::new(files.len(), backup_dir.clone(), self.config.dry_run);

        if self.config.dry_run {
            warn!("Dry run mode enabled - nothing will be backed up or rewritten");
            for file in &files {
                info!("Would rewrite {}", file.relative_path.display());
            }
            stats.duration = start_time.elapsed();
            return Ok(stats);
        }

        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|e| Error::io(&backup_dir, e))?;
        let backup_root = tokio::fs::canonicalize(&backup_dir)
            .await
            .map_err(|e| Error::io(&backup_dir, e))?;
        info!("Backing up originals to {}", backup_dir.display());

        let total = files.len();
        for (index, file) in files.iter().enumerate() {
            let outcome = match self
                .process_file(file, &backup_dir, &backup_root, index + 1, total)
                .await
            {
                Ok(outcome) => outcome,
                Err(fatal) => {
                    error!("Aborting at {}: {}", file.relative_path.display(), fatal);
                    if !stats.failures.is_empty() {
                        if let Err(e) = self.write_manifest(&backup_dir, &stats).await {
                            error!("{}", e);
                        }
                    }
                    return Err(fatal);
                }
            };

            match outcome {
                FileOutcome::Written => stats.rewritten += 1,
                FileOutcome::WrittenAsError(record) => {
                    stats.failed += 1;
                    stats.failures.push(record);
                }
                FileOutcome::Skipped => stats.skipped += 1,
            }
        }

        if !stats.failures.is_empty() {
            self.write_manifest(&backup_dir, &stats).await?;
        }

        stats.duration = start_time.elapsed();
        info!(
            "✓ Rewrote {} of {} files ({} failed, {} skipped) in {:.2}s",
            stats.rewritten,
            stats.total_files,
            stats.failed,
            stats.skipped,
            stats.duration.as_secs_f64()
        );

        Ok(stats)
    }

    async fn write_manifest(&self, backup_dir: &Path, stats: &RunStats) -> Result<PathBuf> {
        self.writer
            .write_failure_manifest(backup_dir, &self.config.root_dir, &stats.failures)
            .await
    }

    /// Drives one file from PENDING to WRITTEN, WRITTEN_AS_ERROR or SKIPPED.
    async fn process_file(
        &self,
        file: &SourceFile,
        backup_dir: &Path,
        backup_root: &Path,
        position: usize,
        total: usize,
    ) -> Result<FileOutcome> {
        let path = &file.absolute_path;

        if is_inside(path, backup_root).await {
            debug!("Skipping {} (inside backup directory)", path.display());
            return Ok(FileOutcome::Skipped);
        }

        let original = tokio::fs::read(path).await.map_err(|e| Error::io(path, e))?;
        mirror_original(backup_dir, &file.relative_path, &original).await?;

        let Ok(source) = String::from_utf8(original) else {
            warn!("{}", Error::invalid_utf8(path));
            return Ok(FileOutcome::Skipped);
        };

        info!("---- {} ---- [{}/{}]", file.file_name(), position, total);

        let request = RewriteRequest::new(
            &file.relative_path,
            source,
            &self.config.language_name,
            &self.system_prompt,
        );

        let mut observer: Box<dyn FragmentObserver> = if self.config.echo_tokens {
            Box::new(LineEcho::new(std::io::stdout()))
        } else {
            Box::new(Silent)
        };

        match self.client.rewrite(&request, observer.as_mut()).await {
            Ok(code) => {
                self.writer.write_code(path, &code).await?;
                Ok(FileOutcome::Written)
            }
            Err(failure) if failure.is_recoverable() => {
                warn!("Cannot get code on {}: {}", file.file_name(), failure);
                self.writer.write_sentinel(path, &failure).await?;
                Ok(FileOutcome::WrittenAsError(FailureRecord {
                    path: file.relative_path.clone(),
                    reason: failure.to_string(),
                }))
            }
            Err(fatal) => Err(fatal),
        }
    }
}

async fn is_inside(path: &Path, dir: &Path) -> bool {
    tokio::fs::canonicalize(path)
        .await
        .is_ok_and(|canonical| canonical.starts_with(dir))
}
