//! Application-wide error types.
//!
//! Library modules return specific variants via `thiserror`; the CLI layer
//! uses `anyhow` for convenient propagation. The taxonomy follows the
//! pipeline's fault model:
//!
//! - [`Error::UnsupportedFormat`] / [`Error::CorruptFile`]: fatal for one
//!   file only, never for a batch.
//! - [`Error::Lookup`]: remote service rejected a request. Auth/quota
//!   statuses suspend further lookups in the batch; everything else
//!   degrades to "no matches".
//! - [`Error::Write`]: tag write failed; the original file is guaranteed
//!   unmodified (restored from backup).

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container type not recognized
    #[error("Unsupported container format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Container recognized but unreadable
    #[error("Corrupt audio file {path}: {message}")]
    CorruptFile { path: PathBuf, message: String },

    /// Remote metadata service rejected the request.
    /// `status_code` 0 means the service was unreachable (transport error).
    #[error("Metadata lookup failed (HTTP {status_code}): {message}")]
    Lookup { status_code: u16, message: String },

    /// Tag write failed; the original file was restored from backup
    #[error("Write failed for {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// Per-file processing deadline exceeded
    #[error("Processing deadline exceeded for {0}")]
    Deadline(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an unsupported-format error.
    pub fn unsupported_format(path: impl Into<PathBuf>) -> Self {
        Self::UnsupportedFormat { path: path.into() }
    }

    /// Create a corrupt-file error.
    pub fn corrupt_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a lookup error.
    pub fn lookup(status_code: u16, message: impl Into<String>) -> Self {
        Self::Lookup {
            status_code,
            message: message.into(),
        }
    }

    /// Create a write error.
    pub fn write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this is a lookup failure that should suspend further
    /// lookups in the batch (auth or quota exhaustion).
    ///
    /// MusicBrainz signals rate-limit overruns with 503, so it is treated
    /// as quota-class alongside 429.
    pub fn is_lookup_quota(&self) -> bool {
        matches!(
            self,
            Error::Lookup {
                status_code: 401 | 403 | 429 | 503,
                ..
            }
        )
    }
}
