//! State-changed event carried by the event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, EntityState};

/// A change of an entity's state
///
/// `old_state` is `None` the first time an entity reports, `new_state` is
/// `None` when it is removed. The context names who caused the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChanged {
    pub entity_id: EntityId,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
    pub context: Context,
    pub time_fired: DateTime<Utc>,
}

impl StateChanged {
    pub fn new(
        entity_id: EntityId,
        old_state: Option<EntityState>,
        new_state: Option<EntityState>,
        context: Context,
    ) -> Self {
        Self {
            entity_id,
            old_state,
            new_state,
            context,
            time_fired: Utc::now(),
        }
    }

    /// New state value, if the entity still exists
    pub fn new_value(&self) -> Option<&str> {
        self.new_state.as_ref().map(|s| s.state.as_str())
    }

    /// Previous state value, if any
    pub fn old_value(&self) -> Option<&str> {
        self.old_state.as_ref().map(|s| s.state.as_str())
    }

    /// True when the state value changed (attribute-only updates are not)
    pub fn is_value_change(&self) -> bool {
        self.new_value().is_some() && self.old_value() != self.new_value()
    }

    /// True when the value changed and the new value is `value`
    pub fn changed_to(&self, value: &str) -> bool {
        self.is_value_change() && self.new_value() == Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn state(value: &str) -> EntityState {
        EntityState::new(
            "light.desk".parse().unwrap(),
            value,
            HashMap::new(),
            Context::new(),
        )
    }

    #[test]
    fn test_changed_to() {
        let id: EntityId = "light.desk".parse().unwrap();

        let first = StateChanged::new(id.clone(), None, Some(state("on")), Context::new());
        assert!(first.changed_to("on"));

        let toggled = StateChanged::new(
            id.clone(),
            Some(state("on")),
            Some(state("off")),
            Context::new(),
        );
        assert!(toggled.changed_to("off"));
        assert!(!toggled.changed_to("on"));

        let attrs_only = StateChanged::new(id.clone(), Some(state("on")), Some(state("on")), Context::new());
        assert!(!attrs_only.is_value_change());

        let removed = StateChanged::new(id, Some(state("on")), None, Context::new());
        assert!(!removed.is_value_change());
    }
}
