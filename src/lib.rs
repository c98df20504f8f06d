//! # h1-code
//!
//! Rewrites every source file of one extension under a directory through an
//! OpenAI-compatible chat model, keeping a backup of each original.
//!
//! ## Features
//!
//! - Numbered or single backup directories next to the source tree
//! - Streaming completions with live token echo
//! - Language-tagged code block extraction
//! - Atomic in-place writes, with a sentinel and manifest for failed files
//!
//! ## Quick Start
//!
//! ```no_run
//! use h1_code::{Config, ConnectionConfig, Pipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .root_dir("./src")
//!     .extension(".py")
//!     .doc_level(2)
//!     .connection(ConnectionConfig::new(
//!         "llama3.1",
//!         "http://localhost:11434/v1",
//!         "ollama",
//!     ))
//!     .build()?;
//!
//! Pipeline::new(config)?.run().await?.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Files are processed strictly one at a time:
//! 1. **Scanner**: finds files whose name ends with the extension
//! 2. **Backup**: mirrors each original into the backup directory
//! 3. **Client**: streams a rewrite from the chat completions endpoint
//! 4. **Fence**: extracts the code block tagged with the language
//! 5. **Writer**: replaces the file with the code or a failure sentinel

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod backup;
mod client;
mod config;
mod error;
mod fence;
mod pipeline;
mod prompt;
mod scanner;
mod writer;

pub use backup::{allocate_backup_dir, mirror_original, BACKUP_SUFFIX};
pub use client::{
    collect_fragments, FragmentObserver, LineEcho, RewriteClient, RewriteRequest, Silent,
    StreamFragment,
};
pub use config::{
    default_language_name, BackupPolicy, Config, ConfigBuilder, ConnectionConfig,
    DEFAULT_API_KEY, DEFAULT_BASE_URL, DEFAULT_DOC_LEVEL, DEFAULT_MODEL, DEFAULT_SENTINEL_MARKER,
};
pub use error::{Error, Result};
pub use fence::extract_code_block;
pub use pipeline::{Pipeline, RunStats};
pub use prompt::{doc_clause, system_prompt, user_message, DOC_LEVEL_MAX};
pub use scanner::SourceFile;
pub use writer::{FailureRecord, FAILURE_MANIFEST};

/// Runs the complete rewrite with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - No file matches the extension
/// - The backup directory or a source file cannot be written
/// - The completion endpoint is unreachable or answers with an error
///
/// # Examples
///
/// ```no_run
/// use h1_code::{Config, run};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .root_dir(".")
///     .extension(".go")
///     .build()?;
///
/// run(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run(config: Config) -> Result<RunStats> {
    Pipeline::new(config)?.run().await
}
