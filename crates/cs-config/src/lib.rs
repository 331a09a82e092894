//! Configuration for the climate scheduler daemon
//!
//! Loads a single YAML file with `serde` defaults for every field. String
//! values may reference environment variables with `${VAR}` (optionally
//! `${VAR:-fallback}`) or the `!env_var VAR` tag.

mod env;
mod error;
mod scheduler_config;

pub use env::{interpolate, interpolate_with};
pub use error::{ConfigError, ConfigResult};
pub use scheduler_config::{
    load_config, BufferSection, InitialState, PresenceSection, SchedulerConfig,
    DEFAULT_FORCE_AWAY_ENTITY, DEFAULT_FORCE_HOME_ENTITY, MAX_BUFFER_MINUTES,
    PRESENCE_TIMEOUT_RANGE,
};
