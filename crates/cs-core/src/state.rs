//! State type representing an entity's current observation

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId};

/// Status literal used by trackers and persons when at home
pub const STATE_HOME: &str = "home";

/// Status literal used by trackers and persons when away
pub const STATE_NOT_HOME: &str = "not_home";

/// Status literal of an active boolean entity
pub const STATE_ON: &str = "on";

/// Status literal of an inactive boolean entity
pub const STATE_OFF: &str = "off";

/// Status literal for an unreachable entity
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Status literal for an entity without a known value
pub const STATE_UNKNOWN: &str = "unknown";

/// The observed state of an entity at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The status string (e.g. "home", "on", "21.5", "heat")
    pub state: String,

    /// Additional attributes (e.g. a thermostat's `temperature` setpoint)
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the status string last changed
    pub last_changed: DateTime<Utc>,

    /// When the entity was last written, even with an identical status
    pub last_updated: DateTime<Utc>,

    /// Who caused the last write
    pub context: Context,
}

impl State {
    /// Create a new state stamped with the current time
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Create the successor state, keeping `last_changed` when the status is unchanged
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        self.with_update_at(new_state, new_attributes, context, Utc::now())
    }

    /// Like [`State::with_update`], stamped with a caller supplied time
    pub fn with_update_at(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
        now: DateTime<Utc>,
    ) -> Self {
        let new_state = new_state.into();
        let last_changed = if self.state != new_state {
            now
        } else {
            self.last_changed
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    /// Override the update timestamps (used when replaying observations)
    pub fn at(mut self, updated: DateTime<Utc>) -> Self {
        self.last_changed = updated;
        self.last_updated = updated;
        self
    }

    /// The kind tag of the entity (e.g. "person")
    pub fn kind(&self) -> &str {
        self.entity_id.kind()
    }

    /// Time elapsed since the last write
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_updated)
    }

    /// Check if the status represents an unavailable entity
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Check if the status represents an unknown value
    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The status parsed as a number, if it is one
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
