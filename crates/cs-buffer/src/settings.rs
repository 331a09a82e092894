//! The persisted buffer document
//!
//! Stored under `climate_scheduler.buffer`:
//!
//! ```json
//! {
//!   "global": {"time_minutes": 15, "value_delta": 2.0, "enabled": true, "applies_to": "climate"},
//!   "entities": {"climate.office": {"time_minutes": 60, "value_delta": 0.5}},
//!   "histories": {"climate.office": {...}}
//! }
//! ```
//!
//! Older installs kept only the global buffer as flat
//! `buffer_time_minutes`/`buffer_value_delta`/`buffer_enabled` keys; those
//! are read into `global` when no `global` object is present.

use crate::config::BufferConfig;
use crate::history::EntityHistory;
use cs_storage::Storable;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Global default plus per-entity overrides
///
/// Entity overrides are kept as written so one malformed entry only disables
/// itself; it is parsed at decision time and dropped by repair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferSettings {
    pub global: BufferConfig,
    #[serde(default)]
    pub entities: BTreeMap<String, Value>,
}

/// Everything the buffer engine persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredBuffer")]
pub struct BufferDocument {
    #[serde(flatten)]
    pub settings: BufferSettings,
    #[serde(default)]
    pub histories: BTreeMap<String, EntityHistory>,
}

impl Storable for BufferDocument {
    const KEY: &'static str = "climate_scheduler.buffer";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 2;
}

/// Every shape the document has been stored in
#[derive(Deserialize)]
struct StoredBuffer {
    #[serde(default)]
    global: Option<Value>,
    #[serde(default)]
    entities: Map<String, Value>,
    #[serde(default)]
    histories: Map<String, Value>,

    #[serde(default)]
    buffer_time_minutes: Option<Value>,
    #[serde(default)]
    buffer_value_delta: Option<Value>,
    #[serde(default)]
    buffer_enabled: Option<Value>,
}

impl StoredBuffer {
    fn legacy_global(&self) -> Option<Value> {
        if self.buffer_time_minutes.is_none()
            && self.buffer_value_delta.is_none()
            && self.buffer_enabled.is_none()
        {
            return None;
        }

        let defaults = BufferConfig::default();
        Some(serde_json::json!({
            "time_minutes": self.buffer_time_minutes.clone().unwrap_or(defaults.time_minutes.into()),
            "value_delta": self.buffer_value_delta.clone().unwrap_or(defaults.value_delta.into()),
            "enabled": self.buffer_enabled.clone().unwrap_or(Value::Bool(defaults.enabled)),
        }))
    }
}

impl From<StoredBuffer> for BufferDocument {
    fn from(stored: StoredBuffer) -> Self {
        let raw_global = stored.global.clone().or_else(|| stored.legacy_global());
        let global = match raw_global {
            Some(raw) => BufferConfig::from_value(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Stored global buffer is invalid, using defaults");
                BufferConfig::default()
            }),
            None => BufferConfig::default(),
        };

        let histories = stored
            .histories
            .into_iter()
            .filter_map(|(entity, raw)| match serde_json::from_value::<EntityHistory>(raw) {
                Ok(history) if history.entity_id.to_string() == entity => Some((entity, history)),
                Ok(_) => {
                    warn!(entity_id = %entity, "Stored history is keyed under the wrong entity, dropping");
                    None
                }
                Err(e) => {
                    warn!(entity_id = %entity, error = %e, "Dropping unreadable history");
                    None
                }
            })
            .collect();

        Self {
            settings: BufferSettings {
                global,
                entities: stored.entities.into_iter().collect(),
            },
            histories,
        }
    }
}
