//! Centralized error types for astromail.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All errors produced by the astromail library.
#[derive(Error, Debug)]
pub enum MailError {
    /// Unparseable headers or media type. Fatal to decoding that one message.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported transfer encoding. Recovered by falling back to the raw bytes.
    #[error("Unsupported transfer encoding: {0}")]
    Encoding(String),

    /// A record with this id already exists in the folder.
    #[error("Message '{id}' already exists in folder '{folder}'")]
    DuplicateId { folder: String, id: String },

    /// A folder or record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bounded wait ran out of time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Network or object-store failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bad arguments (folder name, page number, page size).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The configuration or account state could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for the outcome ingestion treats as "already stored".
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateId { .. })
    }
}

impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
