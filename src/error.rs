use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the h1-code library.
///
/// Every variant except [`Error::Extraction`] is fatal for a run. Extraction
/// failures are recovered per file by writing a sentinel into the file.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// No file under the root matched the extension.
    #[error("The pattern `{}/**/*{pattern}` does not match anything", path.display())]
    NoFiles {
        /// Directory that was scanned
        path: PathBuf,
        /// Extension suffix that was searched for
        pattern: String,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// Documentation level outside of the supported range.
    #[error("Documentation level {level} is out of range (expected 0..=4)")]
    DocLevel {
        /// Requested level
        level: u8,
    },

    /// The completion endpoint could not be reached.
    #[error("Cannot reach completion endpoint '{url}': {message}")]
    Connection {
        /// Endpoint URL
        url: String,
        /// Transport error message
        message: String,
    },

    /// The completion endpoint answered with a non-success status.
    #[error("Completion request failed with status {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// The event stream broke or carried an undecodable chunk.
    #[error("Completion stream failed: {message}")]
    Stream {
        /// Error message
        message: String,
    },

    /// The model response did not contain a code block in the expected language.
    #[error("Model response has no code block in the correct language (```{tag})")]
    Extraction {
        /// Lowercased language tag that was searched for
        tag: String,
        /// Full accumulated model response
        response: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates a no files error.
    #[must_use]
    pub fn no_files(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::NoFiles {
            path: path.into(),
            pattern: pattern.into(),
        }
    }

    /// Creates a connection error for the given endpoint.
    #[must_use]
    pub fn connection(url: impl Into<String>, source: &reqwest::Error) -> Self {
        Self::Connection {
            url: url.into(),
            message: source.to_string(),
        }
    }

    /// Creates a stream error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Creates an extraction error carrying the whole model response.
    #[must_use]
    pub fn extraction(tag: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Extraction {
            tag: tag.into(),
            response: response.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the completion endpoint was unreachable.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns true if the error only affects the current file.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
