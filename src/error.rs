//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for semweave operations.
pub type Result<T> = std::result::Result<T, SemweaveError>;

/// Errors surfaced by indexing, storage, and query operations.
#[derive(Debug, Error)]
pub enum SemweaveError {
    /// Invalid configuration, rejected before any I/O is performed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source document could not be read. Fatal for that document only.
    #[error("unable to read source {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An embedding store whose byte length is not a whole number of records.
    #[error(
        "corrupt embedding store {}: {len} bytes is not a multiple of the {record}-byte record size",
        path.display()
    )]
    CorruptStore { path: PathBuf, len: u64, record: u64 },

    /// The embedding backend failed; the store is left at its last complete
    /// ordinal and the operation is safe to retry.
    #[error("embedding capability failure: {0}")]
    EmbeddingCapability(String),

    /// A vector index could not be built, persisted, or loaded.
    #[error("index failure for {}: {message}", path.display())]
    IndexBuild { path: PathBuf, message: String },

    /// Cooperative shutdown was requested between batches.
    #[error("shutdown requested")]
    Shutdown,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SemweaveError {
    /// Shorthand for a [`SemweaveError::Configuration`] error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        SemweaveError::Configuration(message.into())
    }

    /// Shorthand for an [`SemweaveError::EmbeddingCapability`] error.
    pub fn capability<M: Into<String>>(message: M) -> Self {
        SemweaveError::EmbeddingCapability(message.into())
    }
}
