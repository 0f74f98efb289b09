//! Error types for chainstep-state crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing ledger documents.
#[derive(Debug, Error)]
pub enum StateError {
    /// The document exists but cannot be parsed into the ledger schema.
    #[error("ledger document {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Filesystem error.
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Environment name cannot be used as a file stem.
    #[error("invalid environment name: {0:?}")]
    InvalidEnvironment(String),

    /// Another run holds the environment lease.
    #[error("environment {environment} is locked by {path}; remove it if no other run is active")]
    LeaseHeld {
        environment: String,
        path: PathBuf,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
