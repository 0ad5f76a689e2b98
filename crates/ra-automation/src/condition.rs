//! Conditions
//!
//! State-based predicates ANDed into the motion guards of the light state
//! machines, e.g. "only while the TV is off".

use std::sync::Arc;

use ra_core::EntityId;
use ra_state_store::StateStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{trace, warn};

/// Condition errors
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),
}

/// Result type for condition operations
pub type ConditionResult<T> = Result<T, ConditionError>;

/// Condition definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// Entity is in the given state
    State(StateCondition),

    /// None of the inner conditions holds
    Not(NotCondition),
}

impl Condition {
    pub fn state(entity_id: EntityId, state: impl Into<String>) -> Self {
        Condition::State(StateCondition {
            entity_id,
            state: state.into(),
        })
    }

    pub fn not(conditions: Vec<Condition>) -> Self {
        Condition::Not(NotCondition { conditions })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCondition {
    pub entity_id: EntityId,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotCondition {
    pub conditions: Vec<Condition>,
}

/// A set of conditions evaluated against the live state store
pub struct ConditionSet {
    conditions: Vec<Condition>,
    states: Option<Arc<StateStore>>,
}

impl ConditionSet {
    pub fn new(conditions: Vec<Condition>, states: Arc<StateStore>) -> Self {
        Self {
            conditions,
            states: Some(states),
        }
    }

    /// A set with no conditions, always met
    pub fn empty() -> Self {
        Self {
            conditions: Vec::new(),
            states: None,
        }
    }

    pub fn evaluate(&self, condition: &Condition) -> ConditionResult<bool> {
        match condition {
            Condition::State(c) => {
                let actual = self
                    .states
                    .as_ref()
                    .and_then(|states| states.get_state(&c.entity_id))
                    .ok_or_else(|| ConditionError::EntityNotFound(c.entity_id.clone()))?;
                trace!(entity_id = %c.entity_id, expected = %c.state, actual = %actual, "State condition");
                Ok(actual == c.state)
            }
            Condition::Not(c) => {
                for inner in &c.conditions {
                    if self.evaluate(inner)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// True if every condition holds; an evaluation error counts as false
    pub fn all_met(&self) -> bool {
        self.conditions
            .iter()
            .all(|condition| match self.evaluate(condition) {
                Ok(met) => met,
                Err(e) => {
                    warn!(error = %e, "Condition could not be evaluated, treating as false");
                    false
                }
            })
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_core::Context;
    use ra_event_bus::EventBus;
    use std::collections::HashMap;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    fn store() -> Arc<StateStore> {
        let states = Arc::new(StateStore::new(Arc::new(EventBus::new())));
        states.set(id("media_player.tv"), "off", HashMap::new(), Context::new());
        states.set(id("input_boolean.guests"), "on", HashMap::new(), Context::new());
        states
    }

    #[test]
    fn test_state_condition() {
        let set = ConditionSet::new(
            vec![Condition::state(id("media_player.tv"), "off")],
            store(),
        );
        assert!(set.all_met());

        let set = ConditionSet::new(
            vec![
                Condition::state(id("media_player.tv"), "off"),
                Condition::state(id("input_boolean.guests"), "off"),
            ],
            store(),
        );
        assert!(!set.all_met());
    }

    #[test]
    fn test_not_condition() {
        let set = ConditionSet::new(
            vec![Condition::not(vec![Condition::state(
                id("input_boolean.guests"),
                "on",
            )])],
            store(),
        );
        assert!(!set.all_met());
    }

    #[test]
    fn test_missing_entity_is_false() {
        let set = ConditionSet::new(vec![Condition::state(id("sensor.ghost"), "on")], store());
        assert!(matches!(
            set.evaluate(&Condition::state(id("sensor.ghost"), "on")),
            Err(ConditionError::EntityNotFound(_))
        ));
        assert!(!set.all_met());
    }

    #[test]
    fn test_empty_set_is_met() {
        assert!(ConditionSet::empty().all_met());
        assert!(ConditionSet::empty().is_empty());
    }

    #[test]
    fn test_condition_from_yaml_shape() {
        let json = serde_json::json!({
            "condition": "state",
            "entity_id": "media_player.tv",
            "state": "off"
        });
        let condition: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(condition, Condition::state(id("media_player.tv"), "off"));
    }
}
