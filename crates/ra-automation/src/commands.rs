//! Device command sink
//!
//! State machine actions never talk to devices directly. They call
//! [`DeviceCommands::send_command`], which is fire-and-forget: failures are
//! logged by the sink and never reach the state machine.

use std::fmt;
use std::sync::{Arc, Mutex};

use ra_core::{Context, EntityId};
use ra_service_registry::ServiceRegistry;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Commands the automations issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
    OpenCover,
    CloseCover,
}

impl DeviceCommand {
    pub fn domain(&self) -> &'static str {
        match self {
            DeviceCommand::TurnOn | DeviceCommand::TurnOff => ra_core::domains::LIGHT,
            DeviceCommand::OpenCover | DeviceCommand::CloseCover => ra_core::domains::COVER,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            DeviceCommand::TurnOn => "turn_on",
            DeviceCommand::TurnOff => "turn_off",
            DeviceCommand::OpenCover => "open_cover",
            DeviceCommand::CloseCover => "close_cover",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain(), self.service())
    }
}

/// Sink for device commands
pub trait DeviceCommands: Send + Sync {
    fn send_command(&self, entity_id: &EntityId, command: DeviceCommand, parameters: Option<Value>);
}

pub type SharedCommands = Arc<dyn DeviceCommands>;

/// Sends commands as service calls made under the service account
///
/// The acting identity on every call is the service account, so the state
/// changes the devices report back are classified as automation-initiated.
pub struct ServiceCommands {
    registry: Arc<ServiceRegistry>,
    service_account_id: Option<String>,
}

impl ServiceCommands {
    pub fn new(registry: Arc<ServiceRegistry>, service_account_id: Option<String>) -> Self {
        Self {
            registry,
            service_account_id,
        }
    }

    fn context(&self) -> Context {
        match &self.service_account_id {
            Some(id) => Context::with_user(id.clone()),
            None => Context::new(),
        }
    }
}

impl DeviceCommands for ServiceCommands {
    fn send_command(&self, entity_id: &EntityId, command: DeviceCommand, parameters: Option<Value>) {
        let mut data = serde_json::Map::new();
        data.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
        if let Some(Value::Object(params)) = parameters {
            data.extend(params);
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(entity_id = %entity_id, command = %command, "No async runtime, dropping command");
                return;
            }
        };

        debug!(entity_id = %entity_id, command = %command, "Sending device command");

        let registry = self.registry.clone();
        let context = self.context();
        let entity_id = entity_id.clone();
        runtime.spawn(async move {
            if let Err(e) = registry
                .call(command.domain(), command.service(), Value::Object(data), context)
                .await
            {
                warn!(entity_id = %entity_id, command = %command, error = %e, "Device command failed");
            }
        });
    }
}

/// A command captured by [`RecordingCommands`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub entity_id: EntityId,
    pub command: DeviceCommand,
    pub parameters: Option<Value>,
}

/// Records commands instead of sending them (dry runs and tests)
#[derive(Debug, Default)]
pub struct RecordingCommands {
    sent: Mutex<Vec<SentCommand>>,
}

impl RecordingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of times `command` was sent to `entity_id`
    pub fn count(&self, entity_id: &EntityId, command: DeviceCommand) -> usize {
        self.sent
            .lock()
            .map(|s| {
                s.iter()
                    .filter(|c| &c.entity_id == entity_id && c.command == command)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl DeviceCommands for RecordingCommands {
    fn send_command(&self, entity_id: &EntityId, command: DeviceCommand, parameters: Option<Value>) {
        info!(entity_id = %entity_id, command = %command, parameters = ?parameters, "Dry run command");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentCommand {
                entity_id: entity_id.clone(),
                command,
                parameters,
            });
        }
    }
}
