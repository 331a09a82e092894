//! Schedule errors

use cs_core::EntityIdError;
use thiserror::Error;

/// Result type for schedule operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    #[error("invalid entity id '{entity_id}': {source}")]
    InvalidEntityId {
        entity_id: String,
        #[source]
        source: EntityIdError,
    },

    /// Not a `HH:MM` time of day
    #[error("invalid time '{value}', expected HH:MM")]
    InvalidTime { value: String },

    #[error("invalid day '{value}'")]
    InvalidDay { value: String },

    #[error("invalid slot: {reason}")]
    InvalidSlot { reason: String },
}
