//! The state lookup collaborator

use std::sync::Arc;

use crate::State;

/// Read access to live entity states
///
/// Implementations return `None` for unknown entities; callers treat that as
/// "absent", never as an error.
pub trait StateLookup: Send + Sync {
    /// Current state of an entity
    fn get(&self, entity_id: &str) -> Option<State>;

    /// Current status string of an entity
    fn status(&self, entity_id: &str) -> Option<String> {
        self.get(entity_id).map(|s| s.state)
    }

    /// Whether the entity currently exists
    fn contains(&self, entity_id: &str) -> bool {
        self.get(entity_id).is_some()
    }
}

/// Shared handle to a state lookup
pub type SharedStateLookup = Arc<dyn StateLookup>;
