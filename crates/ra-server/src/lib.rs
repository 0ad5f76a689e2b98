//! Wiring for the room automation daemon

use std::sync::Arc;

use anyhow::{Context as _, Result};
use ra_automation::{AutomationHost, RecordingCommands, Room, ServiceCommands, SharedCommands};
use ra_components::{
    load_binary_sensors, load_sun, load_virtual_covers, load_virtual_lights,
    register_cover_services, register_light_services,
};
use ra_config::RoomsConfig;
use ra_event_bus::EventBus;
use ra_fsm::{FsmStorage, SharedClock, SystemClock};
use ra_service_registry::ServiceRegistry;
use ra_state_store::StateStore;
use tracing::{info, warn};

/// A running daemon: devices, rooms and the services that reach them
pub struct RoomAutomation {
    /// Event bus for state changes
    pub bus: Arc<EventBus>,
    /// Entity states
    pub states: Arc<StateStore>,
    /// Device and room services
    pub services: Arc<ServiceRegistry>,
    /// Commands captured instead of sent when running dry
    pub recorder: Option<Arc<RecordingCommands>>,
    rooms: Vec<Arc<Room>>,
}

impl RoomAutomation {
    /// Start with the system clock
    pub fn start(config: &RoomsConfig) -> Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Load the devices, then spawn every room's automations
    ///
    /// Must run inside a tokio runtime.
    pub fn start_with_clock(config: &RoomsConfig, clock: SharedClock) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());

        let devices = &config.devices;
        let lights = load_virtual_lights(&devices.lights, &states);
        let covers = load_virtual_covers(&devices.covers, &states);
        let sensors = load_binary_sensors(&devices.binary_sensors, &states);
        load_sun(&states, &devices.sun.entity_id, devices.sun.above_horizon);
        register_light_services(&services, states.clone());
        register_cover_services(&services, states.clone());
        info!(lights, covers, sensors, "Devices loaded");

        let recorder = config.dry_run.then(|| Arc::new(RecordingCommands::new()));
        let commands: SharedCommands = match &recorder {
            Some(recorder) => {
                warn!("Dry run: device commands are logged, not sent");
                recorder.clone()
            }
            None => Arc::new(ServiceCommands::new(
                services.clone(),
                Some(config.service_account_id.clone()),
            )),
        };

        let host = AutomationHost {
            states: states.clone(),
            commands,
            clock,
            storage: FsmStorage::new(&config.storage_dir),
            service_account_id: Some(config.service_account_id.clone()),
        };

        let mut rooms = Vec::with_capacity(config.rooms.len());
        for room_config in &config.rooms {
            let mut room = Room::new(room_config.name.clone(), states.clone())
                .with_context(|| format!("room '{}'", room_config.name))?;
            for automation in room_config.automations()? {
                room.spawn(automation, &host, &bus)
                    .with_context(|| format!("room '{}'", room_config.name))?;
            }
            let room = Arc::new(room);
            room.register_services(&services);
            info!(room = %room.slug(), automations = room.kinds().len(), "Room started");
            rooms.push(room);
        }

        Ok(Self {
            bus,
            states,
            services,
            recorder,
            rooms,
        })
    }

    pub fn rooms(&self) -> &[Arc<Room>] {
        &self.rooms
    }

    pub fn room(&self, slug: &str) -> Option<&Arc<Room>> {
        self.rooms.iter().find(|r| r.slug() == slug)
    }

    /// Stop every automation task
    pub async fn shutdown(&self) {
        for room in &self.rooms {
            room.shutdown().await;
        }
    }
}
