//! Core types for the climate scheduler
//!
//! This crate provides the fundamental types shared by every component:
//! EntityId, State, Context, Event, Mode, the [`StateLookup`] collaborator
//! trait, the [`Clock`] abstraction and [`DebugOptions`].

mod clock;
mod context;
mod debug;
mod entity_id;
mod event;
mod lookup;
mod mode;
mod state;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use context::{ChangeSource, Context};
#[doc(hidden)]
pub use debug::__tracing;
pub use debug::DebugOptions;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use lookup::{SharedStateLookup, StateLookup};
pub use mode::{Mode, PresenceRule};
pub use state::{
    State, STATE_HOME, STATE_NOT_HOME, STATE_OFF, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN,
};

/// Event types and payloads produced or consumed by the scheduler
pub mod events {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    /// An entity's state was written
    pub const STATE_CHANGED: &str = "state_changed";

    /// The presence mode flipped
    pub const MODE_CHANGED: &str = "climate_scheduler_mode_changed";

    /// A presence or buffer configuration mutator changed something
    pub const CONFIG_CHANGED: &str = "climate_scheduler_config_changed";

    /// A schedule slot was created, replaced or removed
    pub const SLOT_UPDATED: &str = "climate_scheduler_slot_updated";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for MODE_CHANGED events
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ModeChangedData {
        pub old_mode: Mode,
        pub new_mode: Mode,
        pub timestamp: DateTime<Utc>,
    }

    impl EventData for ModeChangedData {
        fn event_type() -> &'static str {
            MODE_CHANGED
        }
    }

    /// Old and new value of one configuration field
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FieldChange {
        pub old: serde_json::Value,
        pub new: serde_json::Value,
    }

    /// Data for CONFIG_CHANGED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConfigChangedData {
        /// Component whose configuration changed (`presence`, `buffer`)
        pub component: String,
        /// Mutator that made the change (e.g. `set_entity_config`)
        pub operation: String,
        pub timestamp: DateTime<Utc>,
        pub old_config: serde_json::Value,
        pub new_config: serde_json::Value,
        /// Changed fields keyed by path, e.g. `global.time_minutes` or
        /// `entities["climate.office"]`
        pub changes: BTreeMap<String, FieldChange>,
    }

    impl ConfigChangedData {
        /// Build the payload, computing the field-level diff
        pub fn new(
            component: impl Into<String>,
            operation: impl Into<String>,
            timestamp: DateTime<Utc>,
            old_config: &impl Serialize,
            new_config: &impl Serialize,
        ) -> Self {
            let old_config = serde_json::to_value(old_config).unwrap_or_default();
            let new_config = serde_json::to_value(new_config).unwrap_or_default();
            let mut changes = BTreeMap::new();
            diff_values("", &old_config, &new_config, &mut changes);
            Self {
                component: component.into(),
                operation: operation.into(),
                timestamp,
                old_config,
                new_config,
                changes,
            }
        }

        pub fn is_noop(&self) -> bool {
            self.changes.is_empty()
        }
    }

    impl EventData for ConfigChangedData {
        fn event_type() -> &'static str {
            CONFIG_CHANGED
        }
    }

    /// Identifier-like keys join with `.`, anything else is bracketed and quoted
    fn child_path(path: &str, key: &str) -> String {
        let plain = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        match (plain, path.is_empty()) {
            (true, true) => key.to_string(),
            (true, false) => format!("{}.{}", path, key),
            (false, _) => {
                let quoted = serde_json::Value::String(key.to_string()).to_string();
                format!("{}[{}]", path, quoted)
            }
        }
    }

    fn diff_values(
        path: &str,
        old: &serde_json::Value,
        new: &serde_json::Value,
        out: &mut BTreeMap<String, FieldChange>,
    ) {
        use serde_json::Value;

        if let (Value::Object(old_map), Value::Object(new_map)) = (old, new) {
            let keys: std::collections::BTreeSet<&String> =
                old_map.keys().chain(new_map.keys()).collect();
            for key in keys {
                let child = child_path(path, key);
                diff_values(
                    &child,
                    old_map.get(key).unwrap_or(&Value::Null),
                    new_map.get(key).unwrap_or(&Value::Null),
                    out,
                );
            }
        } else if old != new {
            let key = if path.is_empty() { "." } else { path };
            out.insert(
                key.to_string(),
                FieldChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
    }

    /// Data for SLOT_UPDATED events
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SlotUpdatedData {
        pub entity: EntityId,
        pub mode: Mode,
        /// Lowercase weekday name
        pub day: String,
        /// `HH:MM-HH:MM`
        pub time_slot: String,
        /// New target, or `None` when the slot was removed
        pub target_value: Option<f64>,
    }

    impl EventData for SlotUpdatedData {
        fn event_type() -> &'static str {
            SLOT_UPDATED
        }
    }

}
