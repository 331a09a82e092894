//! Per-entity change history

use crate::config::BufferConfig;
use chrono::{DateTime, Utc};
use cs_core::EntityId;
use serde::{Deserialize, Serialize};

/// What the engine last observed for one controlled entity
///
/// Created on the first recorded change and updated in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHistory {
    pub entity_id: EntityId,
    pub last_known_value: f64,
    #[serde(default)]
    pub last_manual_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_scheduled_change: Option<DateTime<Utc>>,
    /// Effective entity-level configuration when last refreshed
    #[serde(default)]
    pub config: BufferConfig,
}

impl EntityHistory {
    pub fn new(entity_id: EntityId, value: f64, config: BufferConfig) -> Self {
        Self {
            entity_id,
            last_known_value: value,
            last_manual_change: None,
            last_scheduled_change: None,
            config,
        }
    }

    /// Whether a manual change happened within `window` before `now`
    pub fn manual_change_within(&self, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.last_manual_change
            .map(|at| now.signed_duration_since(at) <= window)
            .unwrap_or(false)
    }
}
