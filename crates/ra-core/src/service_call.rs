//! Service call type for invoking device commands

use crate::{Context, EntityId};
use serde::{Deserialize, Serialize};

/// A call to `domain.service`, e.g. `light.turn_on`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,

    pub service: String,

    /// Data passed to the service (`entity_id`, brightness, ...)
    pub service_data: serde_json::Value,

    /// Who issued the call
    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Full service identifier (`domain.service`)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Typed value from `service_data`
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Target entities, accepting both a single string and a list
    ///
    /// Entries that are not valid entity ids are skipped.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => s.parse().into_iter().collect(),
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.parse().ok())
                .collect(),
            _ => vec![],
        }
    }

    /// `service_data` without the `entity_id` key
    pub fn parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.service_data {
            serde_json::Value::Object(map) => map
                .iter()
                .filter(|(k, _)| k.as_str() != "entity_id")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_ids_single_and_list() {
        let single = ServiceCall::new(
            "light",
            "turn_on",
            json!({"entity_id": "light.desk"}),
            Context::new(),
        );
        assert_eq!(single.entity_ids().len(), 1);
        assert_eq!(single.service_id(), "light.turn_on");

        let list = ServiceCall::new(
            "light",
            "turn_off",
            json!({"entity_id": ["light.desk", "light.lamp", "not an id"]}),
            Context::new(),
        );
        assert_eq!(list.entity_ids().len(), 2);
    }

    #[test]
    fn test_parameters_exclude_entity_id() {
        let call = ServiceCall::new(
            "light",
            "turn_on",
            json!({"entity_id": "light.desk", "brightness": 120}),
            Context::new(),
        );
        let params = call.parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(call.get::<u8>("brightness"), Some(120));
    }
}
