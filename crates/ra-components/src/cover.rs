//! Virtual covers

use std::collections::HashMap;
use std::sync::Arc;

use ra_core::{domains, states, Context, EntityId, ServiceCall};
use ra_service_registry::ServiceRegistry;
use ra_state_store::StateStore;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Virtual cover configuration from YAML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VirtualCoverConfig {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Initial state (default: closed)
    #[serde(default)]
    pub open: Option<bool>,
}

fn position(state: &str) -> u8 {
    if state == states::OPEN {
        100
    } else {
        0
    }
}

/// Load virtual covers and register them in the state store
pub fn load_virtual_covers(
    config: &HashMap<String, Option<VirtualCoverConfig>>,
    store: &StateStore,
) -> usize {
    let mut count = 0;

    for (id, config) in config {
        let entity_id = match EntityId::new(domains::COVER, id) {
            Ok(e) => e,
            Err(e) => {
                warn!("Invalid cover id '{}': {}", id, e);
                continue;
            }
        };
        let config = config.clone().unwrap_or_default();

        let state = if config.open.unwrap_or(false) {
            states::OPEN
        } else {
            states::CLOSED
        };

        let mut attributes = HashMap::new();
        if let Some(name) = &config.name {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        attributes.insert("current_position".to_string(), json!(position(state)));

        store.set(entity_id, state, attributes, Context::new());
        debug!("Loaded cover.{} = {}", id, state);
        count += 1;
    }

    if count > 0 {
        info!("Loaded {} virtual covers", count);
    }
    count
}

fn move_covers(store: &StateStore, call: &ServiceCall, state: &str) {
    for entity_id in crate::target::target_entities(call, domains::COVER) {
        let Some(current) = store.get(&entity_id) else {
            warn!(entity_id = %entity_id, "Unknown cover");
            continue;
        };
        let mut attrs = current.attributes.clone();
        attrs.insert("current_position".to_string(), json!(position(state)));
        store.set(entity_id, state, attrs, call.context.clone());
    }
}

/// Register cover services
pub fn register_cover_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    let store = states.clone();
    services.register(domains::COVER, "open_cover", move |call: ServiceCall| {
        let store = store.clone();
        async move {
            move_covers(&store, &call, states::OPEN);
            Ok(())
        }
    });

    let store = states;
    services.register(domains::COVER, "close_cover", move |call: ServiceCall| {
        let store = store.clone();
        async move {
            move_covers(&store, &call, states::CLOSED);
            Ok(())
        }
    });

    info!("Cover services registered");
}
