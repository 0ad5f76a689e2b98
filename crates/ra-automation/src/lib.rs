//! Room automations
//!
//! Per-entity state machines for lights and blinds, the automations that
//! feed them from the event bus, and the rooms that hold those automations.
//!
//! ```text
//! EventBus ──► Automation task ──► LightMachine / MainLightMachine / BlindsMachine
//!                  ▲     │                        │
//!          Mailbox │     └── DeviceCommands ◄─────┘
//!           (timers, toggles)
//! ```

pub mod blinds;
pub mod blinds_automation;
pub mod classify;
pub mod commands;
pub mod condition;
pub mod config;
pub mod error;
pub mod host;
pub mod light;
pub mod light_automation;
pub mod main_light;
pub mod main_light_automation;
pub mod room;
pub mod runtime;

pub use blinds::{BlindsState, BlindsTrigger};
pub use blinds_automation::BlindsAutomation;
pub use classify::{classify, Initiator};
pub use commands::{
    DeviceCommand, DeviceCommands, RecordingCommands, SentCommand, ServiceCommands,
    SharedCommands,
};
pub use condition::{Condition, ConditionError, ConditionSet};
pub use config::{
    AutomationConfig, BlindsConfig, FsmConfig, LightAutomationConfig, LightParameters,
    MainLightConfig, NightModeConfig,
};
pub use error::{AutomationError, AutomationResult};
pub use host::AutomationHost;
pub use light::{LightState, LightTrigger};
pub use light_automation::LightAutomation;
pub use main_light::{MainLightState, MainLightTrigger};
pub use main_light_automation::MainLightAutomation;
pub use room::Room;
pub use runtime::{Automation, AutomationHandle, AutomationKind, Mailbox, Snapshot};
