//! Entity ID type representing a `kind.name` pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity id must have the shape 'kind.name'")]
    InvalidFormat,

    #[error("entity kind cannot be empty")]
    EmptyKind,

    #[error("entity name cannot be empty")]
    EmptyName,

    #[error(
        "entity kind must be lowercase alphanumeric with single underscores, not starting or ending with one"
    )]
    InvalidKindChars,

    #[error("entity name must be lowercase alphanumeric with underscores, not starting or ending with one")]
    InvalidNameChars,
}

/// Identifier of an entity known to the state lookup (e.g. `climate.living_room`)
///
/// The kind selects how the entity is interpreted: presence classification,
/// actuation action and which value counts as its setpoint all depend on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    kind: String,
    name: String,
}

impl EntityId {
    /// Build an id from its two parts, validating both
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, EntityIdError> {
        let kind = kind.into();
        let name = name.into();

        if kind.is_empty() {
            return Err(EntityIdError::EmptyKind);
        }
        if name.is_empty() {
            return Err(EntityIdError::EmptyName);
        }
        if !Self::is_valid_kind(&kind) {
            return Err(EntityIdError::InvalidKindChars);
        }
        if !Self::is_valid_name(&name) {
            return Err(EntityIdError::InvalidNameChars);
        }

        Ok(Self { kind, name })
    }

    /// Build an id from compile-time parts known to be valid
    pub fn from_static(kind: &'static str, name: &'static str) -> Self {
        debug_assert!(Self::is_valid_kind(kind) && Self::is_valid_name(name));
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    /// The kind (domain) part, e.g. `climate`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The name part, e.g. `living_room`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this entity belongs to one of the given kinds
    pub fn is_kind(&self, kinds: &[&str]) -> bool {
        kinds.contains(&self.kind.as_str())
    }

    fn is_valid_name(s: &str) -> bool {
        if s.starts_with('_') || s.ends_with('_') {
            return false;
        }
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    fn is_valid_kind(s: &str) -> bool {
        !s.contains("__") && Self::is_valid_name(s)
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((kind, name)) if !name.contains('.') => Self::new(kind, name),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_entity_id() {
        let id = EntityId::new("climate", "living_room").unwrap();
        assert_eq!(id.kind(), "climate");
        assert_eq!(id.name(), "living_room");
        assert_eq!(id.to_string(), "climate.living_room");
    }

    #[test]
    fn test_parse_presence_ids() {
        let tracker: EntityId = "device_tracker.phone_a".parse().unwrap();
        assert_eq!(tracker.kind(), "device_tracker");
        assert!(tracker.is_kind(&["person", "device_tracker"]));
        assert!(!tracker.is_kind(&["binary_sensor"]));
    }

    #[test]
    fn test_invalid_shape() {
        assert_eq!(
            "thermostat".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "climate.up.stairs".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            ".living_room".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyKind
        );
        assert_eq!(
            "climate.".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyName
        );
    }

    #[test]
    fn test_invalid_chars() {
        assert_eq!(
            "Climate.room".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidKindChars
        );
        assert_eq!(
            "climate.Room".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidNameChars
        );
        assert_eq!(
            "input__boolean.away".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidKindChars
        );
        assert!("climate.first__floor".parse::<EntityId>().is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let id = EntityId::new("person", "alex").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"person.alex\"");

        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<EntityId>("\"not an id\"").is_err());
    }
}
