//! The `states` object and state functions exposed to expressions

use cs_core::{State, StateLookup};
use minijinja::value::{Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only view of live entity states
///
/// Supports:
/// - `states('person.alex')` - status string
/// - `states['person.alex']` - full state object
/// - `states.person.alex` - full state object through a kind proxy
#[derive(Clone)]
pub struct StatesObject {
    lookup: Arc<dyn StateLookup>,
}

impl std::fmt::Debug for StatesObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatesObject").finish_non_exhaustive()
    }
}

impl StatesObject {
    pub fn new(lookup: Arc<dyn StateLookup>) -> Self {
        Self { lookup }
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.lookup.status(entity_id)
    }

    pub fn get_full_state(&self, entity_id: &str) -> Option<State> {
        self.lookup.get(entity_id)
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn is_state_any(&self, entity_id: &str, states: &[String]) -> bool {
        self.get_state(entity_id)
            .map(|current| states.iter().any(|s| *s == current))
            .unwrap_or(false)
    }

    pub fn state_attr(&self, entity_id: &str, attribute: &str) -> Value {
        self.lookup
            .get(entity_id)
            .and_then(|s| s.attributes.get(attribute).cloned())
            .map(json_to_value)
            .unwrap_or(Value::UNDEFINED)
    }

    /// Whether the entity exists and is neither unknown nor unavailable
    pub fn has_value(&self, entity_id: &str) -> bool {
        self.lookup
            .get(entity_id)
            .map(|s| !s.is_unavailable() && !s.is_unknown())
            .unwrap_or(false)
    }
}

impl Object for StatesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;

        if key.contains('.') {
            return self.get_full_state(key).map(state_to_value);
        }

        Some(Value::from_object(KindProxy {
            kind: key.to_string(),
            lookup: self.lookup.clone(),
        }))
    }

    fn call(self: &Arc<Self>, _state: &minijinja::State, args: &[Value]) -> Result<Value, Error> {
        let entity_id = args.first().and_then(|v| v.as_str()).ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation, "states() requires an entity id")
        })?;

        Ok(self
            .get_state(entity_id)
            .map(Value::from)
            .unwrap_or(Value::UNDEFINED))
    }
}

/// Proxy allowing `states.person.alex`
#[derive(Clone)]
struct KindProxy {
    kind: String,
    lookup: Arc<dyn StateLookup>,
}

impl std::fmt::Debug for KindProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindProxy")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Object for KindProxy {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        self.lookup
            .get(&format!("{}.{}", self.kind, name))
            .map(state_to_value)
    }
}

fn state_to_value(state: State) -> Value {
    Value::from_object(StateWrapper(state))
}

/// A single entity state as seen from an expression
#[derive(Debug, Clone)]
pub struct StateWrapper(pub State);

impl Object for StateWrapper {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        match key {
            "state" => Some(Value::from(self.0.state.as_str())),
            "entity_id" => Some(Value::from(self.0.entity_id.to_string())),
            "kind" | "domain" => Some(Value::from(self.0.entity_id.kind())),
            "name" => Some(Value::from(self.0.entity_id.name())),
            "last_changed" => Some(Value::from(self.0.last_changed.to_rfc3339())),
            "last_updated" => Some(Value::from(self.0.last_updated.to_rfc3339())),
            "attributes" => {
                let attrs: BTreeMap<String, Value> = self
                    .0
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v.clone())))
                    .collect();
                Some(Value::from_object(attrs))
            }
            _ => self.0.attributes.get(key).map(|v| json_to_value(v.clone())),
        }
    }
}

/// Convert a JSON attribute into an expression value
pub(crate) fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::from(()),
        serde_json::Value::Bool(b) => Value::from(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                Value::from(f)
            } else {
                Value::from(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(arr) => {
            Value::from(arr.into_iter().map(json_to_value).collect::<Vec<_>>())
        }
        serde_json::Value::Object(obj) => {
            let map: BTreeMap<String, Value> = obj
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect();
            Value::from_object(map)
        }
    }
}

/// `is_state(entity_id, 'home')` or `is_state(entity_id, ['home', 'work'])`
pub fn is_state_fn(states: &StatesObject, entity_id: &str, state: Value) -> bool {
    // strings are iterable too, so check them first
    if let Some(s) = state.as_str() {
        states.is_state(entity_id, s)
    } else if let Ok(iter) = state.try_iter() {
        let wanted: Vec<String> = iter
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        states.is_state_any(entity_id, &wanted)
    } else {
        false
    }
}
