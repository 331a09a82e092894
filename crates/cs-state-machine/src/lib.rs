//! In-memory entity state store
//!
//! The StateMachine is the reference implementation of the [`StateLookup`]
//! collaborator. It holds the latest observation of every entity, indexes
//! entities by kind and fires `state_changed` events on the event bus so the
//! coordinator can tell scheduled writes from manual ones.

use chrono::{DateTime, Utc};
use cs_core::events::StateChangedData;
use cs_core::{Context, EntityId, SharedClock, State, StateLookup, SystemClock};
use cs_event_bus::EventBus;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Concurrent store of entity states
pub struct StateMachine {
    /// Entity states keyed by entity id string
    states: DashMap<String, State>,
    /// Entity ids grouped by kind
    kind_index: DashMap<String, Vec<String>>,
    event_bus: Arc<EventBus>,
    /// Source of `last_updated` / `last_changed` stamps
    clock: SharedClock,
}

impl StateMachine {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_clock(event_bus, Arc::new(SystemClock))
    }

    /// State machine that stamps writes from the given clock
    pub fn with_clock(event_bus: Arc<EventBus>, clock: SharedClock) -> Self {
        Self {
            states: DashMap::new(),
            kind_index: DashMap::new(),
            event_bus,
            clock,
        }
    }

    /// Set the status and attributes of an entity
    ///
    /// `last_changed` only moves when the status string differs from the
    /// previous one. Fires `state_changed` with the old and new state.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let now = self.clock.utc_now();
        let old_state = self.get(&entity_id.to_string());
        let new_state = match &old_state {
            Some(existing) => existing.with_update_at(state, attributes, context, now),
            None => State::new(entity_id, state, attributes, context).at(now),
        };
        self.commit(old_state, new_state)
    }

    /// Write an observation with an explicit update time
    ///
    /// Used when seeding from configuration or replaying history, where the
    /// observation is older than "now".
    pub fn set_at(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        updated: DateTime<Utc>,
        context: Context,
    ) -> State {
        let old_state = self.get(&entity_id.to_string());
        let new_state = State::new(entity_id, state, attributes, context).at(updated);
        self.commit(old_state, new_state)
    }

    /// Merge a single attribute into an entity's state, keeping its status
    ///
    /// Returns `None` when the entity does not exist.
    pub fn set_attribute(
        &self,
        entity_id: &EntityId,
        key: &str,
        value: serde_json::Value,
        context: Context,
    ) -> Option<State> {
        let current = self.get(&entity_id.to_string())?;
        let mut attributes = current.attributes.clone();
        attributes.insert(key.to_string(), value);
        let status = current.state.clone();
        Some(self.commit(
            Some(current.clone()),
            current.with_update_at(status, attributes, context, self.clock.utc_now()),
        ))
    }

    fn commit(&self, old_state: Option<State>, new_state: State) -> State {
        let entity_id = new_state.entity_id.clone();
        let key = entity_id.to_string();

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            source = ?new_state.context.source,
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.kind_index
                .entry(entity_id.kind().to_string())
                .or_default()
                .push(key);
        }

        let context = new_state.context.clone();
        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Current status string, or `None` if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Entity ids of one kind
    pub fn entity_ids(&self, kind: &str) -> Vec<String> {
        self.kind_index
            .get(kind)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// States of one kind
    pub fn kind_states(&self, kind: &str) -> Vec<State> {
        self.entity_ids(kind)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity, firing `state_changed` with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            if let Some(mut ids) = self.kind_index.get_mut(entity_id.kind()) {
                ids.retain(|id| id != &key);
            }

            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl StateLookup for StateMachine {
    fn get(&self, entity_id: &str) -> Option<State> {
        StateMachine::get(self, entity_id)
    }
}

/// Shared handle to the state machine
pub type SharedStateMachine = Arc<StateMachine>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local, TimeZone};
    use cs_core::{Clock, MockClock};
    use serde_json::json;

    fn make_test_setup() -> (Arc<EventBus>, StateMachine) {
        let event_bus = Arc::new(EventBus::new());
        let state_machine = StateMachine::new(event_bus.clone());
        (event_bus, state_machine)
    }

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_and_get_state() {
        let (_, sm) = make_test_setup();
        let attrs = HashMap::from([("temperature".to_string(), json!(21.0))]);

        let state = sm.set(id("climate.living_room"), "heat", attrs.clone(), Context::new());
        assert_eq!(state.state, "heat");
        assert_eq!(state.attributes, attrs);

        let retrieved = sm.get("climate.living_room").unwrap();
        assert_eq!(retrieved.state, "heat");
        assert!(sm.is_state("climate.living_room", "heat"));
        assert!(!sm.is_state("climate.missing", "heat"));
    }

    #[test]
    fn test_kind_indexing() {
        let (_, sm) = make_test_setup();
        sm.set(id("person.alex"), "home", HashMap::new(), Context::new());
        sm.set(id("person.sam"), "not_home", HashMap::new(), Context::new());
        sm.set(id("device_tracker.phone"), "home", HashMap::new(), Context::new());

        let persons = sm.entity_ids("person");
        assert_eq!(persons.len(), 2);
        assert!(persons.contains(&"person.alex".to_string()));
        assert_eq!(sm.kind_states("device_tracker").len(), 1);
        assert_eq!(sm.entity_count(), 3);
    }

    #[test]
    fn test_set_at_backdates_observation() {
        let (_, sm) = make_test_setup();
        let then = Utc::now() - Duration::hours(3);
        let state = sm.set_at(id("person.alex"), "home", HashMap::new(), then, Context::new());
        assert_eq!(state.last_updated, then);
        assert_eq!(sm.get("person.alex").unwrap().last_updated, then);
    }

    #[test]
    fn test_writes_are_stamped_from_clock() {
        let clock = MockClock::at(Local.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap());
        let sm = StateMachine::with_clock(Arc::new(EventBus::new()), Arc::new(clock.clone()));
        let start = clock.utc_now();

        let first = sm.set(id("climate.office"), "heat", HashMap::new(), Context::new());
        assert_eq!(first.last_updated, start);
        assert_eq!(first.last_changed, start);

        clock.advance_minutes(5);
        let second = sm.set(id("climate.office"), "heat", HashMap::new(), Context::new());
        assert_eq!(second.last_updated, start + Duration::minutes(5));
        assert_eq!(second.last_changed, start);

        clock.advance_minutes(5);
        let third = sm
            .set_attribute(&id("climate.office"), "temperature", json!(20), Context::new())
            .unwrap();
        assert_eq!(third.last_updated, start + Duration::minutes(10));
        assert_eq!(third.last_changed, start);
    }

    #[test]
    fn test_set_attribute_keeps_status() {
        let (_, sm) = make_test_setup();
        assert!(sm
            .set_attribute(&id("climate.office"), "temperature", json!(20), Context::new())
            .is_none());

        sm.set(id("climate.office"), "heat", HashMap::new(), Context::new());
        let updated = sm
            .set_attribute(&id("climate.office"), "temperature", json!(19.5), Context::scheduler())
            .unwrap();
        assert_eq!(updated.state, "heat");
        assert_eq!(updated.attribute::<f64>("temperature"), Some(19.5));
        assert!(updated.context.is_scheduler());
    }

    #[test]
    fn test_remove_state() {
        let (_, sm) = make_test_setup();
        sm.set(id("binary_sensor.door"), "on", HashMap::new(), Context::new());

        let removed = sm.remove(&id("binary_sensor.door"), Context::new());
        assert_eq!(removed.unwrap().state, "on");
        assert!(sm.get("binary_sensor.door").is_none());
        assert!(sm.entity_ids("binary_sensor").is_empty());
    }

    #[test]
    fn test_state_lookup_trait() {
        let (_, sm) = make_test_setup();
        sm.set(id("person.alex"), "home", HashMap::new(), Context::new());
        let lookup: &dyn StateLookup = &sm;

        assert_eq!(lookup.status("person.alex").as_deref(), Some("home"));
        assert!(lookup.contains("person.alex"));
        assert!(lookup.get("person.nobody").is_none());
    }

    #[tokio::test]
    async fn test_state_changed_event_carries_context() {
        let (bus, sm) = make_test_setup();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        sm.set(id("climate.office"), "heat", HashMap::new(), Context::user());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.entity_id.to_string(), "climate.office");
        assert!(event.data.old_state.is_none());
        assert!(!event.context.is_scheduler());
        assert_eq!(event.data.new_state.unwrap().state, "heat");
    }
}
