//! Buffer errors

use cs_core::EntityIdError;
use cs_storage::StorageError;
use thiserror::Error;

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;

#[derive(Debug, Error)]
pub enum BufferError {
    /// A buffer configuration field is missing or out of range
    #[error("invalid buffer configuration field '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// An observed value is not a finite number
    #[error("value {value} for {entity_id} is not a finite number")]
    InvalidValue { entity_id: String, value: String },

    #[error("invalid entity id '{entity_id}': {source}")]
    InvalidEntityId {
        entity_id: String,
        #[source]
        source: EntityIdError,
    },

    /// The document could not be persisted
    #[error("failed to persist buffer settings: {0}")]
    Persistence(#[from] StorageError),
}

impl BufferError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BufferError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
