//! Daemon configuration
//!
//! ```yaml
//! storage_dir: ${CLIMATE_DATA:-/var/lib/climate-scheduler}
//! evaluation_interval_seconds: 60
//! log_level: info
//!
//! presence:
//!   entities: [person.alex, device_tracker.sam_phone]
//!   rule: anyone_home
//!   timeout_seconds: 1800
//!
//! buffer:
//!   time_minutes: 15
//!   value_delta: 2.0
//!
//! debug:
//!   buffer: true
//!
//! tracked_entities: [climate.living_room]
//! ```

use cs_core::{DebugOptions, EntityId, PresenceRule};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::env;
use crate::error::{ConfigError, ConfigResult};

/// Default override switch forcing Home
pub const DEFAULT_FORCE_HOME_ENTITY: &str = "input_boolean.climate_scheduler_force_home";
/// Default override switch forcing Away
pub const DEFAULT_FORCE_AWAY_ENTITY: &str = "input_boolean.climate_scheduler_force_away";

/// Accepted presence staleness timeout, in seconds
pub const PRESENCE_TIMEOUT_RANGE: (u64, u64) = (60, 86_400);
/// Longest accepted buffer window, in minutes
pub const MAX_BUFFER_MINUTES: u32 = 1440;

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Directory holding `.storage/`
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Seconds between scheduled evaluations
    #[serde(default = "default_interval")]
    pub evaluation_interval_seconds: u64,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub presence: PresenceSection,

    /// Global buffer defaults, used until a stored configuration exists
    #[serde(default)]
    pub buffer: BufferSection,

    #[serde(default)]
    pub debug: DebugOptions,

    /// Entities added to the schedule document at startup
    #[serde(default)]
    pub tracked_entities: Vec<String>,

    /// States written to the state machine before the first evaluation
    #[serde(default)]
    pub initial_states: Vec<InitialState>,
}

/// The `presence:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSection {
    #[serde(default)]
    pub entities: Vec<String>,

    #[serde(default)]
    pub rule: PresenceRule,

    #[serde(default = "default_presence_timeout")]
    pub timeout_seconds: u64,

    /// Required when `rule` is `custom`, forbidden otherwise
    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default = "default_force_home")]
    pub force_home_entity: String,

    #[serde(default = "default_force_away")]
    pub force_away_entity: String,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            rule: PresenceRule::default(),
            timeout_seconds: default_presence_timeout(),
            expression: None,
            force_home_entity: default_force_home(),
            force_away_entity: default_force_away(),
        }
    }
}

/// The `buffer:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSection {
    #[serde(default = "default_buffer_minutes")]
    pub time_minutes: u32,

    #[serde(default = "default_value_delta")]
    pub value_delta: f64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_applies_to")]
    pub applies_to: String,
}

impl Default for BufferSection {
    fn default() -> Self {
        Self {
            time_minutes: default_buffer_minutes(),
            value_delta: default_value_delta(),
            enabled: true,
            applies_to: default_applies_to(),
        }
    }
}

/// A seeded entity state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_presence_timeout() -> u64 {
    1800
}

fn default_force_home() -> String {
    DEFAULT_FORCE_HOME_ENTITY.to_string()
}

fn default_force_away() -> String {
    DEFAULT_FORCE_AWAY_ENTITY.to_string()
}

fn default_buffer_minutes() -> u32 {
    15
}

fn default_value_delta() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_applies_to() -> String {
    "climate".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            evaluation_interval_seconds: default_interval(),
            log_level: default_log_level(),
            presence: PresenceSection::default(),
            buffer: BufferSection::default(),
            debug: DebugOptions::default(),
            tracked_entities: Vec::new(),
            initial_states: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Parse, interpolate and validate YAML text
    pub fn from_yaml_str(content: &str, source_path: &Path) -> ConfigResult<Self> {
        let raw: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        // An empty file is an all-defaults configuration
        let raw = match raw {
            Value::Null => Value::Mapping(Default::default()),
            other => other,
        };

        let resolved = env::interpolate(raw)?;
        let config: SchedulerConfig =
            serde_yaml::from_value(resolved).map_err(|e| ConfigError::ParseYaml {
                path: source_path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and identifier shapes
    pub fn validate(&self) -> ConfigResult<()> {
        if self.evaluation_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "evaluation_interval_seconds",
                "must be at least 1",
            ));
        }

        let presence = &self.presence;
        for (i, id) in presence.entities.iter().enumerate() {
            check_entity_id(&format!("presence.entities[{}]", i), id)?;
        }
        check_entity_id("presence.force_home_entity", &presence.force_home_entity)?;
        check_entity_id("presence.force_away_entity", &presence.force_away_entity)?;

        let (min, max) = PRESENCE_TIMEOUT_RANGE;
        if !(min..=max).contains(&presence.timeout_seconds) {
            return Err(ConfigError::invalid(
                "presence.timeout_seconds",
                format!("must be between {} and {}", min, max),
            ));
        }

        let has_expression = presence
            .expression
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        match (presence.rule, has_expression) {
            (PresenceRule::Custom, false) => {
                return Err(ConfigError::invalid(
                    "presence.expression",
                    "required when rule is custom",
                ))
            }
            (PresenceRule::AnyoneHome | PresenceRule::EveryoneHome, true) => {
                return Err(ConfigError::invalid(
                    "presence.expression",
                    "only allowed when rule is custom",
                ))
            }
            _ => {}
        }

        if self.buffer.time_minutes > MAX_BUFFER_MINUTES {
            return Err(ConfigError::invalid(
                "buffer.time_minutes",
                format!("must not exceed {}", MAX_BUFFER_MINUTES),
            ));
        }
        if !self.buffer.value_delta.is_finite() || self.buffer.value_delta < 0.0 {
            return Err(ConfigError::invalid(
                "buffer.value_delta",
                "must be a non-negative number",
            ));
        }

        for (i, id) in self.tracked_entities.iter().enumerate() {
            check_entity_id(&format!("tracked_entities[{}]", i), id)?;
        }
        for (i, seed) in self.initial_states.iter().enumerate() {
            check_entity_id(&format!("initial_states[{}].entity_id", i), &seed.entity_id)?;
        }

        Ok(())
    }
}

fn check_entity_id(key: &str, id: &str) -> ConfigResult<()> {
    id.parse::<EntityId>()
        .map(|_| ())
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}

/// Load the daemon configuration from a YAML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<SchedulerConfig> {
    let path = path.as_ref();
    debug!(path = ?path, "Loading configuration");

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    SchedulerConfig::from_yaml_str(&content, path)
}
