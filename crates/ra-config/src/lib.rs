//! YAML configuration for the room automation daemon
//!
//! Reads `rooms.yaml` into typed settings and converts each room's
//! automation sections into the configs `ra-automation` is built from.
//!
//! # Example
//!
//! ```ignore
//! use ra_config::load_config;
//!
//! let config = load_config("/etc/room-automation/rooms.yaml")?;
//! for room in &config.rooms {
//!     let automations = room.automations()?;
//! }
//! ```

mod error;
mod loader;
mod rooms;
mod time;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, parse_config};
pub use rooms::{
    BlindsSection, DevicesConfig, MainLightSection, NightModeSection, RoomConfig, RoomsConfig,
    SecondaryLightSection, SunConfig, WindowSection,
};
pub use time::{parse_time, seconds};
