use crate::error::{Error, Result};
use crate::prompt::DOC_LEVEL_MAX;
use std::path::PathBuf;
use std::time::Duration;

/// Model used when none is given on the command line.
pub const DEFAULT_MODEL: &str = "llama3.1";
/// Local Ollama OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
/// Ollama ignores the key but the protocol requires one.
pub const DEFAULT_API_KEY: &str = "ollama";
/// Documentation level used when none is given.
pub const DEFAULT_DOC_LEVEL: u8 = 1;
/// APL comment glyph; a syntax error in every mainstream language.
pub const DEFAULT_SENTINEL_MARKER: &str = "⍝ ";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How the backup directory for a run is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupPolicy {
    /// Always use `<root>.h2-backup`, merging into it if it already exists.
    Single,
    /// Use the first free `<root>.h2-backup.<n>`.
    #[default]
    Numbered,
}

/// Connection settings for the chat-completion endpoint.
///
/// Built once per run and passed by reference to every rewrite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Model identifier sent with each request
    pub model: String,
    /// Base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    /// Bearer credential
    pub api_key: String,
    /// Timeout for establishing the TCP/TLS connection
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Creates connection settings with the default connect timeout.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Returns the chat completions endpoint URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, DEFAULT_BASE_URL, DEFAULT_API_KEY)
    }
}

/// Configuration for a rewrite run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Directory whose files are rewritten in place
    pub root_dir: PathBuf,

    /// File name suffix to match, e.g. `.dart` or `dart`
    pub extension: String,

    /// Human-readable language name, e.g. `Python`
    pub language_name: String,

    /// Documentation verbosity level, 0..=4
    pub doc_level: u8,

    /// Backup directory selection
    pub backup_policy: BackupPolicy,

    /// Explicit backup directory, overriding `backup_policy`
    pub backup_dir: Option<PathBuf>,

    /// Completion endpoint settings
    pub connection: ConnectionConfig,

    /// Prefix written at the start of files the model could not convert
    pub sentinel_marker: String,

    /// Echo streamed tokens to stdout
    pub echo_tokens: bool,

    /// Dry run mode (no backups, no requests, no writes)
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use h1_code::Config;
    ///
    /// let config = Config::builder()
    ///     .root_dir(".")
    ///     .extension("rs")
    ///     .doc_level(2)
    ///     .build()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.language_name, "Rs");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Root directory doesn't exist or is not a directory
    /// - Extension or language name is empty
    /// - Documentation level is above 4
    /// - Sentinel marker is empty
    pub fn validate(&self) -> Result<()> {
        if !self.root_dir.exists() {
            return Err(Error::config(format!(
                "Root directory does not exist: {}",
                self.root_dir.display()
            )));
        }

        if !self.root_dir.is_dir() {
            return Err(Error::config(format!(
                "'{}' is not a valid directory",
                self.root_dir.display()
            )));
        }

        if self.extension.trim().is_empty() {
            return Err(Error::config("extension must not be empty"));
        }

        if self.language_name.trim().is_empty() {
            return Err(Error::config("language name must not be empty"));
        }

        if self.doc_level > DOC_LEVEL_MAX {
            return Err(Error::config(format!(
                "doc_level ({}) must be between 0 and {DOC_LEVEL_MAX}",
                self.doc_level
            )));
        }

        if self.sentinel_marker.is_empty() {
            return Err(Error::config("sentinel marker must not be empty"));
        }

        if self.connection.model.trim().is_empty() {
            return Err(Error::config("model identifier must not be empty"));
        }

        Ok(())
    }

    /// Returns the lowercased fence tag for the configured language.
    #[must_use]
    pub fn language_tag(&self) -> String {
        self.language_name.to_lowercase()
    }
}

/// Derives a language name from an extension: first letter upper, the rest
/// lower.
///
/// A leading dot is dropped, so `.PY` and `py` both give `Py`.
#[must_use]
pub fn default_language_name(extension: &str) -> String {
    let trimmed = extension.trim_start_matches('.');
    let mut chars = trimmed.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    root_dir: Option<PathBuf>,
    extension: Option<String>,
    language_name: Option<String>,
    doc_level: Option<u8>,
    backup_policy: Option<BackupPolicy>,
    backup_dir: Option<PathBuf>,
    connection: Option<ConnectionConfig>,
    sentinel_marker: Option<String>,
    echo_tokens: Option<bool>,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Sets the root directory to rewrite.
    #[must_use]
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the file name suffix to match.
    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Overrides the language name derived from the extension.
    #[must_use]
    pub fn language_name(mut self, name: impl Into<String>) -> Self {
        self.language_name = Some(name.into());
        self
    }

    /// Sets the documentation verbosity level (0..=4).
    #[must_use]
    pub fn doc_level(mut self, level: u8) -> Self {
        self.doc_level = Some(level);
        self
    }

    /// Sets the backup policy.
    #[must_use]
    pub fn backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = Some(policy);
        self
    }

    /// Uses an explicit backup directory instead of allocating one.
    #[must_use]
    pub fn backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(path.into());
        self
    }

    /// Sets the completion endpoint settings.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Sets the prefix written into files that could not be converted.
    #[must_use]
    pub fn sentinel_marker(mut self, marker: impl Into<String>) -> Self {
        self.sentinel_marker = Some(marker.into());
        self
    }

    /// Enables or disables echoing streamed tokens to stdout.
    #[must_use]
    pub fn echo_tokens(mut self, enabled: bool) -> Self {
        self.echo_tokens = Some(enabled);
        self
    }

    /// Enables dry run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let extension = self.extension.unwrap_or_default();
        let language_name = self
            .language_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_language_name(&extension));

        let config = Config {
            root_dir: self.root_dir.unwrap_or_else(|| PathBuf::from(".")),
            extension,
            language_name,
            doc_level: self.doc_level.unwrap_or(DEFAULT_DOC_LEVEL),
            backup_policy: self.backup_policy.unwrap_or_default(),
            backup_dir: self.backup_dir,
            connection: self.connection.unwrap_or_default(),
            sentinel_marker: self
                .sentinel_marker
                .unwrap_or_else(|| DEFAULT_SENTINEL_MARKER.to_string()),
            echo_tokens: self.echo_tokens.unwrap_or(true),
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
