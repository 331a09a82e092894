//! Presence evaluation for the climate scheduler
//!
//! Turns presence indicators (people, trackers, occupancy sensors, helper
//! booleans) into a single Home/Away [`Mode`](cs_core::Mode) that selects
//! which schedule table applies. Mode flips are announced on the event bus as
//! `climate_scheduler_mode_changed` and to registered listeners.

mod config;
mod error;
mod evaluator;

pub use config::{
    PresenceConfig, DEFAULT_FORCE_AWAY_ENTITY, DEFAULT_FORCE_HOME_ENTITY, DEFAULT_TIMEOUT_SECONDS,
    MAX_TIMEOUT_SECONDS, MIN_TIMEOUT_SECONDS,
};
pub use error::{PresenceError, PresenceResult};
pub use evaluator::{is_home, ListenerId, ModeEvaluation, ModeListener, ModeReason, PresenceEvaluator};
