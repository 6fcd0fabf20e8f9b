//! Outbox store error types.

use thiserror::Error;

/// Outbox store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Backing store unreachable or executor shut down
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Payload serialization error
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
