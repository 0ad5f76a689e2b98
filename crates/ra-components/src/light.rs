//! Virtual lights
//!
//! `light.turn_on` merges the call's parameters into the light's attributes,
//! so the attributes always show what the light was last turned on with.

use std::collections::HashMap;
use std::sync::Arc;

use ra_core::{domains, states, Context, EntityId, ServiceCall};
use ra_service_registry::ServiceRegistry;
use ra_state_store::StateStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Virtual light configuration from YAML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VirtualLightConfig {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Initial state (default: off)
    #[serde(default)]
    pub initial: Option<bool>,
    /// Initial brightness, 0-255
    #[serde(default)]
    pub brightness: Option<u8>,
}

/// Load virtual lights and register them in the state store
pub fn load_virtual_lights(
    config: &HashMap<String, Option<VirtualLightConfig>>,
    store: &StateStore,
) -> usize {
    let mut count = 0;

    for (id, config) in config {
        let entity_id = match EntityId::new(domains::LIGHT, id) {
            Ok(e) => e,
            Err(e) => {
                warn!("Invalid light id '{}': {}", id, e);
                continue;
            }
        };
        let config = config.clone().unwrap_or_default();

        let state = if config.initial.unwrap_or(false) {
            states::ON
        } else {
            states::OFF
        };

        let mut attributes = HashMap::new();
        if let Some(name) = &config.name {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        attributes.insert(
            "brightness".to_string(),
            json!(config.brightness.unwrap_or(255)),
        );

        store.set(entity_id, state, attributes, Context::new());
        debug!("Loaded light.{} = {}", id, state);
        count += 1;
    }

    if count > 0 {
        info!("Loaded {} virtual lights", count);
    }
    count
}

/// Attributes after turning on with `parameters`
///
/// `brightness_pct` is converted to `brightness`; `transition` only affects
/// how the change is made and is not kept.
fn apply_parameters(
    mut attributes: HashMap<String, Value>,
    parameters: serde_json::Map<String, Value>,
) -> HashMap<String, Value> {
    for (key, value) in parameters {
        match key.as_str() {
            "transition" => {}
            "brightness_pct" => {
                if let Some(pct) = value.as_f64() {
                    let brightness = (pct.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u64;
                    attributes.insert("brightness".to_string(), json!(brightness));
                }
            }
            _ => {
                attributes.insert(key, value);
            }
        }
    }
    attributes
}

/// Register light services
pub fn register_light_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    // turn_on service
    let states_clone = states.clone();
    services.register(domains::LIGHT, "turn_on", move |call: ServiceCall| {
        let store = states_clone.clone();
        async move {
            let parameters = call.parameters();
            for entity_id in crate::target::target_entities(&call, domains::LIGHT) {
                let Some(current) = store.get(&entity_id) else {
                    warn!(entity_id = %entity_id, "Unknown light");
                    continue;
                };
                let attrs = apply_parameters(current.attributes.clone(), parameters.clone());
                store.set(entity_id, states::ON, attrs, call.context.clone());
            }
            Ok(())
        }
    });

    // turn_off service
    let states_clone = states.clone();
    services.register(domains::LIGHT, "turn_off", move |call: ServiceCall| {
        let store = states_clone.clone();
        async move {
            for entity_id in crate::target::target_entities(&call, domains::LIGHT) {
                if let Some(current) = store.get(&entity_id) {
                    let attrs = current.attributes.clone();
                    store.set(entity_id, states::OFF, attrs, call.context.clone());
                }
            }
            Ok(())
        }
    });

    // toggle service
    let states_clone = states;
    services.register(domains::LIGHT, "toggle", move |call: ServiceCall| {
        let store = states_clone.clone();
        async move {
            for entity_id in crate::target::target_entities(&call, domains::LIGHT) {
                if let Some(current) = store.get(&entity_id) {
                    let new_state = if current.is(states::ON) {
                        states::OFF
                    } else {
                        states::ON
                    };
                    let attrs = current.attributes.clone();
                    store.set(entity_id, new_state, attrs, call.context.clone());
                }
            }
            Ok(())
        }
    });

    info!("Light services registered");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_config_deserialize() {
        let yaml = r#"
            name: Desk lamp
            initial: true
            brightness: 128
        "#;
        let config: VirtualLightConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, Some("Desk lamp".to_string()));
        assert_eq!(config.initial, Some(true));
        assert_eq!(config.brightness, Some(128));
    }

    #[test]
    fn test_apply_parameters() {
        let mut attributes = HashMap::new();
        attributes.insert("friendly_name".to_string(), json!("Desk"));
        attributes.insert("brightness".to_string(), json!(255));

        let params = json!({"brightness_pct": 40, "transition": 2.0, "color_temp_kelvin": 2700});
        let params = params.as_object().cloned().unwrap();
        let attributes = apply_parameters(attributes, params);

        assert_eq!(attributes["brightness"], json!(102));
        assert_eq!(attributes["color_temp_kelvin"], json!(2700));
        assert_eq!(attributes["friendly_name"], json!("Desk"));
        assert!(!attributes.contains_key("transition"));
        assert!(!attributes.contains_key("brightness_pct"));
    }
}
