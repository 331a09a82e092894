//! Change suppression for scheduled setpoints
//!
//! Before the scheduler writes a target to a device it asks the
//! [`BufferManager`] whether to hold back. A change is suppressed when the
//! device already sits within the dead-band (`value_delta`) of the target.
//!
//! Buffers resolve with strict precedence: a slot's inline override, then the
//! entity's override, then the global default. A malformed override at any
//! tier is skipped, never fatal.

mod config;
mod error;
mod history;
mod manager;
mod settings;

pub use config::{BufferConfig, DEFAULT_APPLIES_TO, MAX_TIME_MINUTES};
pub use error::{BufferError, BufferResult};
pub use history::EntityHistory;
pub use manager::{BufferManager, RepairReport, SuppressionDecision};
pub use settings::{BufferDocument, BufferSettings};
