//! Storage errors

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while reading or writing a stored document
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage file {path} is keyed {found}, expected {expected}")]
    KeyMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Storage {key} has version {found}, newest supported is {supported}")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },

    #[error("Store {key} is unavailable")]
    Unavailable { key: String },
}
