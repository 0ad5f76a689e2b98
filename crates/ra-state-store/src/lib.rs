//! Entity state storage
//!
//! The StateStore holds the current state of every known entity and fires a
//! `StateChanged` event on the bus for every write. Automations read it for
//! guard predicates ("is the motion sensor still on?") and the virtual
//! devices write to it when they execute a command.

use dashmap::DashMap;
use ra_core::{Context, EntityId, EntityState};
use ra_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// The state store tracks all entity states
pub struct StateStore {
    states: DashMap<EntityId, EntityState>,
    event_bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity
    ///
    /// `last_changed` only moves when the state value actually changed.
    /// Always fires a state_changed event carrying `context`, so the acting
    /// identity of the write reaches every subscriber.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> EntityState {
        let old_state = self.states.get(&entity_id).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => EntityState::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(entity_id.clone(), new_state.clone());
        self.event_bus
            .fire_state_changed(entity_id, old_state, Some(new_state.clone()), context);

        new_state
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<EntityState> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value, or None if the entity is unknown
    pub fn get_state(&self, entity_id: &EntityId) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &EntityId, state: &str) -> bool {
        self.states
            .get(entity_id)
            .map(|s| s.state == state)
            .unwrap_or(false)
    }

    /// Number of the given entities currently in `state`
    pub fn count_in_state<'a>(
        &self,
        entity_ids: impl IntoIterator<Item = &'a EntityId>,
        state: &str,
    ) -> usize {
        entity_ids
            .into_iter()
            .filter(|id| self.is_state(id, state))
            .count()
    }

    /// True if any of the given entities is in `state`
    pub fn any_in_state<'a>(
        &self,
        entity_ids: impl IntoIterator<Item = &'a EntityId>,
        state: &str,
    ) -> bool {
        entity_ids.into_iter().any(|id| self.is_state(id, state))
    }

    /// All entity ids of a domain, sorted
    pub fn entity_ids(&self, domain: &str) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .states
            .iter()
            .filter(|r| r.key().is_domain(domain))
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Remove an entity's state
    ///
    /// Fires a state_changed event with no new state.
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<EntityState> {
        let old_state = self.states.remove(entity_id).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");
            self.event_bus
                .fire_state_changed(entity_id.clone(), Some(state.clone()), None, context);
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_set_fires_event_with_context() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let store = StateStore::new(bus);

        store.set(id("light.desk"), "on", HashMap::new(), Context::with_user("alice"));
        store.set(id("light.desk"), "off", HashMap::new(), Context::with_user("svc"));

        let first = rx.recv().await.unwrap();
        assert!(first.old_state.is_none());
        assert!(first.context.is_user("alice"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.old_value(), Some("on"));
        assert_eq!(second.new_value(), Some("off"));
        assert!(second.context.is_user("svc"));
    }

    #[test]
    fn test_queries() {
        let store = StateStore::new(Arc::new(EventBus::new()));
        let ids = [id("light.a"), id("light.b"), id("light.c")];
        store.set(ids[0].clone(), "on", HashMap::new(), Context::new());
        store.set(ids[1].clone(), "on", HashMap::new(), Context::new());
        store.set(ids[2].clone(), "off", HashMap::new(), Context::new());
        store.set(id("cover.blind"), "open", HashMap::new(), Context::new());

        assert_eq!(store.count_in_state(&ids, "on"), 2);
        assert!(store.any_in_state(&ids, "off"));
        assert!(!store.is_state(&id("light.unknown"), "on"));
        assert_eq!(store.entity_ids("light"), ids.to_vec());
        assert_eq!(store.get_state(&id("cover.blind")).as_deref(), Some("open"));
        assert_eq!(store.entity_count(), 4);
    }

    #[tokio::test]
    async fn test_remove() {
        let bus = Arc::new(EventBus::new());
        let store = StateStore::new(bus.clone());
        store.set(id("light.desk"), "on", HashMap::new(), Context::new());

        let mut rx = bus.subscribe();
        assert!(store.remove(&id("light.desk"), Context::new()).is_some());
        assert!(store.remove(&id("light.desk"), Context::new()).is_none());

        let event = rx.recv().await.unwrap();
        assert!(event.new_state.is_none());
        assert_eq!(store.entity_count(), 0);
    }
}
