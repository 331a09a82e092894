//! Presence configuration errors

use cs_core::EntityIdError;
use cs_expression::ExpressionError;
use cs_storage::StorageError;
use thiserror::Error;

/// Result type for presence operations
pub type PresenceResult<T> = Result<T, PresenceError>;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("invalid entity id '{entity_id}': {source}")]
    InvalidEntityId {
        entity_id: String,
        #[source]
        source: EntityIdError,
    },

    /// A presence entity is not known to the state lookup
    #[error("entity '{entity_id}' does not exist")]
    UnknownEntity { entity_id: String },

    #[error("staleness timeout {seconds}s is outside {min}..={max}s")]
    TimeoutOutOfRange { seconds: u64, min: u64, max: u64 },

    #[error("the custom rule requires an expression")]
    MissingExpression,

    #[error("an expression is only allowed with the custom rule")]
    UnexpectedExpression,

    #[error("invalid presence expression: {0}")]
    Expression(#[from] ExpressionError),

    #[error("failed to persist presence configuration: {0}")]
    Persistence(#[from] StorageError),
}
