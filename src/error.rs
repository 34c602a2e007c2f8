//! Error type shared by the store, the persistence gateway and the CLI.

use thiserror::Error;

/// Everything that can go wrong while reading or mutating tasks.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input: empty title, invalid enum value, unparsable date.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The serialized blob does not fit into the store.
    #[error("storage capacity exceeded ({size} bytes, limit {limit})")]
    StorageCapacity {
        /// Size of the rejected write in bytes.
        size: usize,
        /// Configured capacity in bytes.
        limit: usize,
    },

    /// The storage backend cannot be used at all.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Corrupt persisted blob or malformed import document.
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
