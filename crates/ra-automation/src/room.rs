//! Rooms
//!
//! A room owns its running automations, exposes `room.toggle_<slug>` to
//! enable or disable them, and publishes each one's enabled flag as
//! `sensor.<slug>_<kind>_enabled`.

use std::collections::HashMap;
use std::sync::Arc;

use ra_core::{domains, states, Context, EntityId, ServiceCall};
use ra_event_bus::EventBus;
use ra_service_registry::{ServiceError, ServiceRegistry};
use ra_state_store::SharedStateStore;
use tracing::{info, instrument, warn};

use crate::blinds_automation::BlindsAutomation;
use crate::config::AutomationConfig;
use crate::error::{AutomationError, AutomationResult};
use crate::host::AutomationHost;
use crate::light_automation::LightAutomation;
use crate::main_light_automation::MainLightAutomation;
use crate::runtime::{self, AutomationHandle, AutomationKind, Mailbox, Snapshot};

/// Service domain of the room toggles
pub const ROOM_DOMAIN: &str = "room";

pub struct Room {
    slug: String,
    states: SharedStateStore,
    automations: Vec<AutomationHandle>,
}

impl Room {
    /// Create an empty room; `slug` must be usable inside an entity id
    pub fn new(slug: impl Into<String>, states: SharedStateStore) -> AutomationResult<Self> {
        let slug = slug.into();
        EntityId::new(domains::SENSOR, format!("{}_enabled", slug))
            .map_err(|e| AutomationError::InvalidConfig(format!("room '{}': {}", slug, e)))?;

        Ok(Self {
            slug,
            states,
            automations: Vec::new(),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn kinds(&self) -> Vec<AutomationKind> {
        self.automations.iter().map(|a| a.kind()).collect()
    }

    pub fn handle(&self, kind: AutomationKind) -> Option<&AutomationHandle> {
        self.automations.iter().find(|a| a.kind() == kind)
    }

    /// Build the automation described by `config` and start its task
    ///
    /// A room holds at most one automation of each kind.
    #[instrument(skip(self, config, host, bus), fields(room = %self.slug))]
    pub fn spawn(
        &mut self,
        config: AutomationConfig,
        host: &AutomationHost,
        bus: &EventBus,
    ) -> AutomationResult<()> {
        let kind = match &config {
            AutomationConfig::SecondaryLight(_) => AutomationKind::SecondaryLight,
            AutomationConfig::MainLight(_) => AutomationKind::MainLight,
            AutomationConfig::Blinds(_) => AutomationKind::Blinds,
        };
        if self.handle(kind).is_some() {
            return Err(AutomationError::InvalidConfig(format!(
                "room '{}' already has a {} automation",
                self.slug, kind
            )));
        }

        let events = bus.subscribe();
        let (mailbox, inbox) = Mailbox::channel();
        let handle = match config {
            AutomationConfig::SecondaryLight(c) => runtime::spawn(
                LightAutomation::new(c, host.clone(), mailbox.clone()),
                events,
                mailbox,
                inbox,
            ),
            AutomationConfig::MainLight(c) => runtime::spawn(
                MainLightAutomation::new(c, host.clone(), mailbox.clone()),
                events,
                mailbox,
                inbox,
            ),
            AutomationConfig::Blinds(c) => runtime::spawn(
                BlindsAutomation::new(c, host.clone(), mailbox.clone()),
                events,
                mailbox,
                inbox,
            ),
        };

        info!(kind = %kind, "Automation added to room");
        self.automations.push(handle);
        self.publish_status(kind, Context::new());
        Ok(())
    }

    /// Name of this room's toggle service in the `room` domain
    pub fn service_name(&self) -> String {
        format!("toggle_{}", self.slug)
    }

    pub fn status_entity(&self, kind: AutomationKind) -> Option<EntityId> {
        EntityId::new(domains::SENSOR, format!("{}_{}_enabled", self.slug, kind)).ok()
    }

    fn publish_status(&self, kind: AutomationKind, context: Context) {
        let (Some(entity_id), Some(handle)) = (self.status_entity(kind), self.handle(kind)) else {
            warn!(room = %self.slug, kind = %kind, "Cannot publish automation status");
            return;
        };
        let value = if handle.is_enabled() {
            states::ON
        } else {
            states::OFF
        };
        let mut attributes = HashMap::new();
        attributes.insert("room".to_string(), serde_json::json!(self.slug));
        attributes.insert("automation".to_string(), serde_json::json!(kind.as_str()));
        self.states.set(entity_id, value, attributes, context);
    }

    /// Toggle one automation, or every automation of the room when `kind` is `None`
    #[instrument(skip(self, context), fields(room = %self.slug))]
    pub fn toggle(&self, kind: Option<AutomationKind>, context: Context) -> AutomationResult<()> {
        let targets: Vec<AutomationKind> = match kind {
            Some(kind) if self.handle(kind).is_none() => {
                return Err(AutomationError::NotInRoom(kind.to_string()))
            }
            Some(kind) => vec![kind],
            None => self.kinds(),
        };

        for kind in targets {
            if let Some(handle) = self.handle(kind) {
                let enabled = handle.toggle();
                info!(kind = %kind, enabled, "Toggled automation");
                self.publish_status(kind, context.child());
            }
        }
        Ok(())
    }

    /// Register `room.toggle_<slug>`
    ///
    /// The optional `automation` field of the call names the kind to toggle.
    pub fn register_services(self: &Arc<Self>, registry: &ServiceRegistry) {
        let room = Arc::clone(self);
        registry.register(ROOM_DOMAIN, self.service_name(), move |call: ServiceCall| {
            let room = room.clone();
            async move { room.handle_toggle(call) }
        });
    }

    fn handle_toggle(&self, call: ServiceCall) -> Result<(), ServiceError> {
        let kind = match call.service_data.get("automation") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(name)) => Some(
                name.parse::<AutomationKind>()
                    .map_err(|e| ServiceError::InvalidData(e.to_string()))?,
            ),
            Some(other) => {
                return Err(ServiceError::InvalidData(format!(
                    "automation must be a string, got {}",
                    other
                )))
            }
        };
        self.toggle(kind, call.context)
            .map_err(|e| ServiceError::InvalidData(e.to_string()))
    }

    /// Current snapshots of every automation
    pub async fn snapshots(&self) -> Vec<Snapshot> {
        let mut snapshots = Vec::with_capacity(self.automations.len());
        for handle in &self.automations {
            if let Some(snapshot) = handle.snapshot().await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Post `AllOff` to every automation
    pub fn all_off(&self) {
        for handle in &self.automations {
            handle.all_off();
        }
    }

    pub async fn shutdown(&self) {
        for handle in &self.automations {
            handle.shutdown().await;
        }
        info!(room = %self.slug, "Room stopped");
    }
}
