//! Storage error types.

use fleetflow_core::CoreError;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("journal error: {0}")]
    Wal(#[from] fleetflow_wal::WalError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Core(e) => e,
            other => CoreError::Store {
                reason: other.to_string(),
            },
        }
    }
}
