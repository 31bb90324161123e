use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PicsortError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Filesystem errors
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    // Metadata errors
    #[error("Metadata tool unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("Failed to extract metadata from {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("Date parsing error: {0}")]
    InvalidDateFormat(String),

    // Manifest and cache errors
    #[error("Cannot read manifest {path}: {reason}")]
    ManifestRead { path: PathBuf, reason: String },

    #[error("Cannot write manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Discarding corrupt cache {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("A rebuild is already running for {0}")]
    RebuildInProgress(PathBuf),

    // Decisions
    #[error("Cannot write decisions to {path}: {source}")]
    ExportWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read decisions {path}: {reason}")]
    DecisionsRead { path: PathBuf, reason: String },

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PicsortError {
    /// Whether this error means the metadata tool could not be used at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PicsortError::ExtractionUnavailable(_))
    }

    /// The bare reason behind an unavailable tool, without the error prefix.
    pub fn into_unavailable_reason(self) -> String {
        match self {
            PicsortError::ExtractionUnavailable(reason) => reason,
            other => other.to_string(),
        }
    }
}

/// Result type for picsort operations.
pub type Result<T> = std::result::Result<T, PicsortError>;
