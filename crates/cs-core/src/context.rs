//! Context type recording who caused a state write

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The party responsible for a state write
///
/// The coordinator tags its own actuations with [`ChangeSource::Scheduler`];
/// any other write to a controlled entity is treated as a manual change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// A person changed the value (UI, physical control, service call)
    User,
    /// The climate scheduler applied a scheduled value
    Scheduler,
    /// A device integration reported a value on its own
    #[default]
    Integration,
}

/// Context attached to every state write and event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Who caused the write
    #[serde(default)]
    pub source: ChangeSource,

    /// Context that caused this one, when part of a chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// A fresh integration context
    pub fn new() -> Self {
        Self::with_source(ChangeSource::Integration)
    }

    /// A fresh context for the given source
    pub fn with_source(source: ChangeSource) -> Self {
        Self {
            id: Ulid::new().to_string(),
            source,
            parent_id: None,
        }
    }

    /// A fresh context for a user-initiated write
    pub fn user() -> Self {
        Self::with_source(ChangeSource::User)
    }

    /// A fresh context for a scheduler actuation
    pub fn scheduler() -> Self {
        Self::with_source(ChangeSource::Scheduler)
    }

    /// Child context keeping this context's source
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            source: self.source,
            parent_id: Some(self.id.clone()),
        }
    }

    /// Whether the scheduler itself caused this write
    pub fn is_scheduler(&self) -> bool {
        self.source == ChangeSource::Scheduler
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
