//! Orchestration for the climate scheduler
//!
//! [`Coordinator`] runs the decision pipeline for every scheduled entity and
//! hands surviving setpoints to an [`Actuator`]. [`StateMachineActuator`]
//! applies them to the in-memory state machine with the kind-specific
//! service action.

mod actuator;
mod coordinator;
mod error;

pub use actuator::{setpoint, Actuator, ServiceAction, StateMachineActuator, TEMPERATURE_ATTRIBUTE};
pub use coordinator::{Coordinator, TickOutcome};
pub use error::{ActuationError, ActuationResult};
