//! Virtual devices
//!
//! Lights, covers and sensors that live only in the state store. Their
//! services apply a command by writing the new state under the caller's
//! context, so a command sent by the automations comes back on the event bus
//! exactly as a real device report would.

mod cover;
mod light;
mod sensor;
mod target;

pub use cover::{load_virtual_covers, register_cover_services, VirtualCoverConfig};
pub use light::{load_virtual_lights, register_light_services, VirtualLightConfig};
pub use sensor::{load_binary_sensors, load_sun, BinarySensorConfig};
