//! Error types for the Oru engine.

use crate::TaskId;
use thiserror::Error;

/// All possible errors from the Oru engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying database failure (I/O, disk full, lock contention).
    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure while locating or creating the database.
    #[error("storage: {0}")]
    Io(#[from] std::io::Error),

    /// A stored or supplied value could not be encoded or decoded.
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Invalid input rejected before anything was written.
    #[error("constraint violated on '{field}': {message}")]
    Constraint {
        field: &'static str,
        message: String,
    },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The remote backend could not be reached or answered abnormally.
    /// High-water marks and cursors are never advanced on this error,
    /// so the same sync call is safe to retry.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// A schema migration failed. Fatal at startup; the store must not
    /// be used.
    #[error("migration to version {version} failed: {message}")]
    Migration { version: i64, message: String },
}

impl Error {
    pub(crate) fn constraint(field: &'static str, message: impl Into<String>) -> Self {
        Error::Constraint {
            field,
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
