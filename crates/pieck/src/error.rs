//! Error types for the dispatcher.

use thiserror::Error;

/// Errors from the dispatch pipeline.
#[derive(Error, Debug)]
pub enum PieckError {
    /// Outbox store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] outbox_store::StoreError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dispatch operations.
pub type PieckResult<T> = Result<T, PieckError>;
