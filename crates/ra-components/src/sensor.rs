//! Motion sensors and the sun
//!
//! Nothing commands these; their states are reported from outside and only
//! need an initial value.

use std::collections::HashMap;

use ra_core::{domains, states, Context, EntityId};
use ra_state_store::StateStore;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Binary sensor configuration from YAML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinarySensorConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Device class, e.g. `motion` or `occupancy`
    #[serde(default)]
    pub device_class: Option<String>,
}

/// Register binary sensors, all starting `off`
pub fn load_binary_sensors(
    config: &HashMap<String, Option<BinarySensorConfig>>,
    store: &StateStore,
) -> usize {
    let mut count = 0;

    for (id, config) in config {
        let entity_id = match EntityId::new(domains::BINARY_SENSOR, id) {
            Ok(e) => e,
            Err(e) => {
                warn!("Invalid binary_sensor id '{}': {}", id, e);
                continue;
            }
        };
        let config = config.clone().unwrap_or_default();

        let mut attributes = HashMap::new();
        if let Some(name) = &config.name {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        attributes.insert(
            "device_class".to_string(),
            json!(config.device_class.as_deref().unwrap_or("motion")),
        );

        store.set(entity_id, states::OFF, attributes, Context::new());
        debug!("Loaded binary_sensor.{}", id);
        count += 1;
    }

    if count > 0 {
        info!("Loaded {} binary sensors", count);
    }
    count
}

/// Register the sun entity, above or below the horizon
pub fn load_sun(store: &StateStore, entity_id: &EntityId, above_horizon: bool) {
    let state = if above_horizon {
        states::ABOVE_HORIZON
    } else {
        states::BELOW_HORIZON
    };
    store.set(entity_id.clone(), state, HashMap::new(), Context::new());
    debug!(entity_id = %entity_id, state, "Loaded sun");
}
