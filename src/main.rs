use anyhow::Context;
use clap::Parser;
use h1_code::{
    BackupPolicy, Config, ConnectionConfig, Pipeline, DEFAULT_API_KEY, DEFAULT_BASE_URL,
    DEFAULT_DOC_LEVEL, DEFAULT_MODEL, DEFAULT_SENTINEL_MARKER,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "h1-code",
    version,
    author,
    about = "Rewrite source files into H1-quality code with an LLM",
    long_about = "Rewrite every source file with a given extension through an \
    OpenAI-compatible chat model.\n\n\
    Originals are copied into a backup directory next to the folder before \
    each file is replaced. Files the model cannot convert are replaced with a \
    marked error note and listed in h1-failures.json inside the backup.\n\n\
    USAGE EXAMPLES:\n  \
      # Rewrite Python files with a local Ollama\n  \
      h1-code ./src .py\n\n  \
      # Use a hosted model and thorough documentation\n  \
      h1-code ./lib .dart --base-url https://api.openai.com/v1 --model gpt-4o -l 4\n\n  \
      # See which files would be touched\n  \
      h1-code ./app .kt --dry-run"
)]
struct Cli {
    /// Folder whose files should be rewritten
    #[arg(value_name = "FOLDER")]
    folder: PathBuf,

    /// File extension to match, e.g. `.py` (plain suffix match)
    #[arg(value_name = "EXT")]
    ext: String,

    /// Model name sent with each request
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, default_value = DEFAULT_BASE_URL, value_name = "URL")]
    base_url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "H1_API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    api_key: String,

    /// Reuse `<FOLDER>.h2-backup` instead of creating a numbered backup
    #[arg(long)]
    single_backup: bool,

    /// Explicit backup directory (overrides the automatic name)
    #[arg(long, value_name = "PATH", conflicts_with = "single_backup")]
    backup_dir: Option<PathBuf>,

    /// Human-readable language name used in the prompt
    ///
    /// Defaults to the extension without its dot, capitalized (`.py` -> `Py`).
    #[arg(short = 'n', long, value_name = "NAME")]
    lang_name: Option<String>,

    /// Documentation level: 0 = none ... 4 = comprehensive
    #[arg(
        short = 'l',
        long,
        default_value_t = DEFAULT_DOC_LEVEL,
        value_parser = clap::value_parser!(u8).range(0..=4)
    )]
    doc_level: u8,

    /// Prefix of the note written into files that could not be converted
    #[arg(long, default_value = DEFAULT_SENTINEL_MARKER)]
    marker: String,

    /// Don't echo streamed model output
    #[arg(short, long)]
    quiet: bool,

    /// Dry run (list matching files, touch nothing)
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let policy = if cli.single_backup {
        BackupPolicy::Single
    } else {
        BackupPolicy::Numbered
    };

    let mut builder = Config::builder()
        .root_dir(cli.folder)
        .extension(cli.ext)
        .doc_level(cli.doc_level)
        .backup_policy(policy)
        .connection(ConnectionConfig::new(cli.model, cli.base_url, cli.api_key))
        .sentinel_marker(cli.marker)
        .echo_tokens(!cli.quiet)
        .dry_run(cli.dry_run);

    if let Some(name) = cli.lang_name {
        builder = builder.language_name(name);
    }

    if let Some(dir) = cli.backup_dir {
        builder = builder.backup_dir(dir);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .await
        .context("Rewrite aborted")?;

    stats.print_summary();

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("h1_code=info"),
        1 => EnvFilter::new("h1_code=debug"),
        _ => EnvFilter::new("h1_code=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .init();

    Ok(())
}
