//! Presence configuration

use crate::error::{PresenceError, PresenceResult};
use cs_core::{EntityId, PresenceRule};
use cs_storage::Storable;
use serde::{Deserialize, Serialize};

/// Shortest accepted staleness timeout
pub const MIN_TIMEOUT_SECONDS: u64 = 60;
/// Longest accepted staleness timeout (one day)
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 1800;

pub const DEFAULT_FORCE_HOME_ENTITY: &str = "input_boolean.climate_scheduler_force_home";
pub const DEFAULT_FORCE_AWAY_ENTITY: &str = "input_boolean.climate_scheduler_force_away";

/// How the Home/Away mode is derived
///
/// `expression` is set exactly when `rule` is [`PresenceRule::Custom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default)]
    pub entities: Vec<EntityId>,
    #[serde(default)]
    pub rule: PresenceRule,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default = "default_force_home")]
    pub force_home_entity: EntityId,
    #[serde(default = "default_force_away")]
    pub force_away_entity: EntityId,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_force_home() -> EntityId {
    EntityId::from_static("input_boolean", "climate_scheduler_force_home")
}

fn default_force_away() -> EntityId {
    EntityId::from_static("input_boolean", "climate_scheduler_force_away")
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            rule: PresenceRule::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            expression: None,
            force_home_entity: default_force_home(),
            force_away_entity: default_force_away(),
        }
    }
}

impl Storable for PresenceConfig {
    const KEY: &'static str = "climate_scheduler.presence";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

impl PresenceConfig {
    /// Check the timeout range and the rule/expression pairing
    ///
    /// Does not check that entities exist or that the expression compiles.
    pub fn validate_shape(&self) -> PresenceResult<()> {
        check_timeout(self.timeout_seconds)?;
        check_pairing(self.rule, self.expression.as_deref())?;
        Ok(())
    }

    pub fn staleness_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.timeout_seconds as i64)
    }

    /// Presence entities plus both override switches
    pub fn watched_entities(&self) -> Vec<EntityId> {
        let mut watched = self.entities.clone();
        watched.push(self.force_home_entity.clone());
        watched.push(self.force_away_entity.clone());
        watched
    }
}

pub(crate) fn parse_entity_id(entity_id: &str) -> PresenceResult<EntityId> {
    entity_id
        .trim()
        .parse()
        .map_err(|source| PresenceError::InvalidEntityId {
            entity_id: entity_id.to_string(),
            source,
        })
}

pub(crate) fn check_timeout(seconds: u64) -> PresenceResult<()> {
    if (MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&seconds) {
        Ok(())
    } else {
        Err(PresenceError::TimeoutOutOfRange {
            seconds,
            min: MIN_TIMEOUT_SECONDS,
            max: MAX_TIMEOUT_SECONDS,
        })
    }
}

pub(crate) fn check_pairing(rule: PresenceRule, expression: Option<&str>) -> PresenceResult<()> {
    match (rule, expression) {
        (PresenceRule::Custom, None) => Err(PresenceError::MissingExpression),
        (PresenceRule::AnyoneHome | PresenceRule::EveryoneHome, Some(_)) => {
            Err(PresenceError::UnexpectedExpression)
        }
        _ => Ok(()),
    }
}
