//! Applying setpoints to controlled devices

use crate::error::{ActuationError, ActuationResult};
use async_trait::async_trait;
use cs_core::{Context, EntityId, State};
use cs_state_machine::StateMachine;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Attribute holding the setpoint of climate-like entities
pub const TEMPERATURE_ATTRIBUTE: &str = "temperature";

/// Service action used to change an entity's setpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// `climate` and `water_heater`: the `temperature` attribute
    SetTemperature,
    /// `number` and `input_number`: the state itself
    SetValue,
}

impl ServiceAction {
    pub fn for_kind(kind: &str) -> Option<Self> {
        match kind {
            "climate" | "water_heater" => Some(Self::SetTemperature),
            "number" | "input_number" => Some(Self::SetValue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetTemperature => "set_temperature",
            Self::SetValue => "set_value",
        }
    }
}

/// Current setpoint of a controlled entity, as recorded by the buffer
///
/// Climate-like entities carry it in the `temperature` attribute, everything
/// else in the state.
pub fn setpoint(state: &State) -> Option<Value> {
    match ServiceAction::for_kind(state.kind()) {
        Some(ServiceAction::SetTemperature) => state
            .attributes
            .get(TEMPERATURE_ATTRIBUTE)
            .filter(|v| !v.is_null())
            .cloned(),
        _ if state.is_unavailable() || state.is_unknown() => None,
        _ => Some(Value::String(state.state.clone())),
    }
}

/// Applies a numeric setpoint to an entity
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn apply(&self, entity_id: &EntityId, value: f64) -> ActuationResult<()>;
}

/// Actuator writing setpoints straight into the state machine
///
/// Writes carry a scheduler context so the change watcher can tell them from
/// manual changes.
pub struct StateMachineActuator {
    states: Arc<StateMachine>,
}

impl StateMachineActuator {
    pub fn new(states: Arc<StateMachine>) -> Self {
        Self { states }
    }
}

#[async_trait]
impl Actuator for StateMachineActuator {
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    async fn apply(&self, entity_id: &EntityId, value: f64) -> ActuationResult<()> {
        let action = ServiceAction::for_kind(entity_id.kind()).ok_or_else(|| {
            ActuationError::UnsupportedKind {
                entity_id: entity_id.to_string(),
                kind: entity_id.kind().to_string(),
            }
        })?;
        let number = serde_json::Number::from_f64(value).ok_or(ActuationError::InvalidValue {
            entity_id: entity_id.to_string(),
            value,
        })?;

        let key = entity_id.to_string();
        let current = self
            .states
            .get(&key)
            .ok_or_else(|| ActuationError::UnknownEntity { entity_id: key.clone() })?;

        match action {
            ServiceAction::SetTemperature => {
                self.states.set_attribute(
                    entity_id,
                    TEMPERATURE_ATTRIBUTE,
                    Value::Number(number),
                    Context::scheduler(),
                );
            }
            ServiceAction::SetValue => {
                self.states.set(
                    entity_id.clone(),
                    value.to_string(),
                    current.attributes,
                    Context::scheduler(),
                );
            }
        }
        info!(action = action.as_str(), value, "Applied setpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_event_bus::EventBus;
    use serde_json::json;
    use std::collections::HashMap;

    fn make_test_setup() -> (Arc<StateMachine>, StateMachineActuator) {
        let states = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        states.set(
            "climate.office".parse().unwrap(),
            "heat",
            HashMap::from([("temperature".to_string(), json!(19.0))]),
            Context::new(),
        );
        states.set(
            "input_number.boiler".parse().unwrap(),
            "45",
            HashMap::new(),
            Context::new(),
        );
        (states.clone(), StateMachineActuator::new(states))
    }

    #[test]
    fn test_service_action_for_kind() {
        assert_eq!(ServiceAction::for_kind("climate"), Some(ServiceAction::SetTemperature));
        assert_eq!(ServiceAction::for_kind("water_heater"), Some(ServiceAction::SetTemperature));
        assert_eq!(ServiceAction::for_kind("number"), Some(ServiceAction::SetValue));
        assert_eq!(ServiceAction::for_kind("input_number"), Some(ServiceAction::SetValue));
        assert_eq!(ServiceAction::for_kind("light"), None);
        assert_eq!(ServiceAction::SetValue.as_str(), "set_value");
    }

    #[tokio::test]
    async fn test_climate_writes_temperature_attribute() {
        let (states, actuator) = make_test_setup();
        let id: EntityId = "climate.office".parse().unwrap();
        actuator.apply(&id, 21.5).await.unwrap();

        let state = states.get("climate.office").unwrap();
        assert_eq!(state.state, "heat");
        assert_eq!(state.attribute::<f64>("temperature"), Some(21.5));
        assert!(state.context.is_scheduler());
        assert_eq!(setpoint(&state), Some(json!(21.5)));
    }

    #[tokio::test]
    async fn test_number_writes_state() {
        let (states, actuator) = make_test_setup();
        let id: EntityId = "input_number.boiler".parse().unwrap();
        actuator.apply(&id, 50.0).await.unwrap();

        let state = states.get("input_number.boiler").unwrap();
        assert_eq!(state.numeric_state(), Some(50.0));
        assert_eq!(setpoint(&state), Some(json!("50")));
    }

    #[tokio::test]
    async fn test_errors() {
        let (_, actuator) = make_test_setup();
        let light: EntityId = "light.desk".parse().unwrap();
        assert!(matches!(
            actuator.apply(&light, 1.0).await,
            Err(ActuationError::UnsupportedKind { .. })
        ));

        let missing: EntityId = "climate.attic".parse().unwrap();
        assert!(matches!(
            actuator.apply(&missing, 20.0).await,
            Err(ActuationError::UnknownEntity { .. })
        ));

        let office: EntityId = "climate.office".parse().unwrap();
        assert!(matches!(
            actuator.apply(&office, f64::NAN).await,
            Err(ActuationError::InvalidValue { .. })
        ));
    }
}
