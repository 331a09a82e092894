//! Error types for actuation

use thiserror::Error;

/// Result type for actuation
pub type ActuationResult<T> = Result<T, ActuationError>;

/// Errors raised while applying a setpoint to a device
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActuationError {
    #[error("entity kind {kind} has no setpoint action: {entity_id}")]
    UnsupportedKind { entity_id: String, kind: String },

    #[error("entity not found: {entity_id}")]
    UnknownEntity { entity_id: String },

    #[error("invalid setpoint {value} for {entity_id}")]
    InvalidValue { entity_id: String, value: f64 },

    /// The device or integration refused the call
    #[error("actuation of {entity_id} failed: {reason}")]
    Rejected { entity_id: String, reason: String },
}
