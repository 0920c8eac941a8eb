//! Entity state storage with domain indexing for Home Assistant
//!
//! Entities write their current state here after every update. The store is
//! the host's view of the world: the sensor post count and attributes, the
//! TTS entity's presence, and so on.

use dashmap::DashMap;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Current state of every entity, indexed by entity_id and by domain
#[derive(Default)]
pub struct StateStore {
    states: DashMap<String, State>,
    domain_index: DashMap<String, Vec<String>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the state of an entity
    ///
    /// `last_changed` only moves when the state value itself changed.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let previous = self.states.get(&key).map(|s| s.clone());

        let new_state = match &previous {
            Some(existing) => existing.with_update(state, attributes, context),
            None => State::new(entity_id.clone(), state, attributes, context),
        };

        debug!(
            state = %new_state.state,
            changed = previous.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Writing entity state"
        );

        self.states.insert(key.clone(), new_state.clone());
        if previous.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string, or None if entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check whether an entity_id is already taken
    pub fn contains(&self, entity_id: &str) -> bool {
        self.states.contains_key(entity_id)
    }

    /// Get all entity IDs for a domain
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Get all states for a domain
    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Remove an entity's state
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let key = entity_id.to_string();
        let removed = self.states.remove(&key).map(|(_, s)| s);

        if removed.is_some() {
            trace!("Removing entity state");
            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &key);
            }
        }

        removed
    }

    /// Get the total number of entities
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let store = StateStore::new();
        let attrs = HashMap::from([("subreddit".to_string(), json!("rust"))]);
        store.set(id("sensor.reddit_rust"), "10", attrs, Context::new());

        let state = store.get("sensor.reddit_rust").unwrap();
        assert_eq!(state.state, "10");
        assert_eq!(state.attributes.get("subreddit"), Some(&json!("rust")));
        assert_eq!(store.get_state("sensor.reddit_rust").as_deref(), Some("10"));
    }

    #[test]
    fn test_domain_index() {
        let store = StateStore::new();
        store.set(id("sensor.a"), "1", HashMap::new(), Context::new());
        store.set(id("sensor.b"), "2", HashMap::new(), Context::new());
        store.set(id("tts.voice"), "unknown", HashMap::new(), Context::new());
        // rewriting an existing entity must not duplicate the index entry
        store.set(id("sensor.a"), "3", HashMap::new(), Context::new());

        assert_eq!(store.entity_ids("sensor").len(), 2);
        assert_eq!(store.domain_states("tts").len(), 1);
        assert_eq!(store.entity_count(), 3);
    }

    #[test]
    fn test_remove() {
        let store = StateStore::new();
        store.set(id("sensor.a"), "1", HashMap::new(), Context::new());
        assert!(store.remove(&id("sensor.a")).is_some());
        assert!(store.remove(&id("sensor.a")).is_none());
        assert!(store.entity_ids("sensor").is_empty());
        assert!(!store.contains("sensor.a"));
    }
}
