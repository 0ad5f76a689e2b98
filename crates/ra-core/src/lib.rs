//! Core types for room automation
//!
//! This crate provides the vocabulary shared by every other crate in the
//! workspace: entity identifiers, entity states, the context that records
//! who caused a change, state-changed events and service calls.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::StateChanged;
pub use service_call::ServiceCall;
pub use state::EntityState;

/// Well-known state values reported by lights, switches and sensors
pub mod states {
    pub const ON: &str = "on";
    pub const OFF: &str = "off";
    pub const OPEN: &str = "open";
    pub const CLOSED: &str = "closed";
    pub const ABOVE_HORIZON: &str = "above_horizon";
    pub const BELOW_HORIZON: &str = "below_horizon";
    pub const UNAVAILABLE: &str = "unavailable";
}

/// Entity domains the automations understand
pub mod domains {
    pub const LIGHT: &str = "light";
    pub const COVER: &str = "cover";
    pub const BINARY_SENSOR: &str = "binary_sensor";
    pub const SENSOR: &str = "sensor";
    pub const SUN: &str = "sun";
}
