//! Error types for snapvault

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for snapvault operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid snapshot or metadata: {reason}")]
    Validation { reason: String },

    #[error("Integrity verification failed: {reason}")]
    Integrity { reason: String },

    #[error("Storage backend '{backend}' failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Storage backend '{backend}' rejected credentials: {reason}")]
    Authentication { backend: String, reason: String },

    #[error("Content not found: {id}")]
    NotFound { id: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Unsupported encryption algorithm: {name}")]
    UnsupportedAlgorithm { name: String },
}

impl Error {
    /// Attach a path to an IO error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        Self::Integrity {
            reason: reason.into(),
        }
    }

    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// True for credential failures, which callers must never treat as "nothing to do"
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Extension for attaching the offending path to `std::io::Result`
pub trait IoResultExt<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}

/// Result type alias for snapvault operations
pub type Result<T> = std::result::Result<T, Error>;
