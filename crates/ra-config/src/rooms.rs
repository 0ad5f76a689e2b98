//! The `rooms.yaml` file
//!
//! ```yaml
//! service_account_id: 5f3c...
//! storage_dir: storage
//! devices:
//!   lights: { desk: , ceiling: }
//!   binary_sensors: { office_motion: }
//! rooms:
//!   - name: office
//!     secondary_light:
//!       lights: [light.desk]
//!       motion_sensors: [binary_sensor.office_motion]
//!       schedule: { start: "18:00", stop: "06:00" }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use ra_automation::{
    AutomationConfig, BlindsConfig, BlindsState, Condition, FsmConfig, LightAutomationConfig,
    LightParameters, LightState, MainLightConfig, MainLightState, NightModeConfig,
};
use ra_components::{BinarySensorConfig, VirtualCoverConfig, VirtualLightConfig};
use ra_core::{domains, EntityId};
use ra_fsm::ScheduleWindow;
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::time::{parse_optional_time, parse_time, seconds};

/// Top level of `rooms.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// User id the automations act under. Required: changes made under any
    /// other id are user-initiated.
    #[serde(default)]
    pub service_account_id: String,

    /// Directory of the `<entity-id>_fsm.json` files
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log commands instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Virtual devices to create at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesConfig {
    #[serde(default)]
    pub lights: HashMap<String, Option<VirtualLightConfig>>,

    #[serde(default)]
    pub covers: HashMap<String, Option<VirtualCoverConfig>>,

    #[serde(default)]
    pub binary_sensors: HashMap<String, Option<BinarySensorConfig>>,

    #[serde(default)]
    pub sun: SunConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SunConfig {
    #[serde(default = "default_sun_entity")]
    pub entity_id: EntityId,

    /// Initial position
    #[serde(default = "default_true")]
    pub above_horizon: bool,
}

impl Default for SunConfig {
    fn default() -> Self {
        Self {
            entity_id: default_sun_entity(),
            above_horizon: true,
        }
    }
}

fn default_sun_entity() -> EntityId {
    EntityId::sun()
}

fn default_true() -> bool {
    true
}

/// One room and its automations
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Room slug, used in `room.toggle_<name>` and the status sensors
    pub name: String,

    #[serde(default)]
    pub secondary_light: Option<SecondaryLightSection>,

    #[serde(default)]
    pub main_light: Option<MainLightSection>,

    #[serde(default)]
    pub blinds: Option<BlindsSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowSection {
    pub start: String,
    pub stop: String,
}

impl WindowSection {
    fn to_window(&self, key: &str) -> ConfigResult<ScheduleWindow> {
        Ok(ScheduleWindow::new(
            parse_time(&format!("{}.start", key), &self.start)?,
            parse_time(&format!("{}.stop", key), &self.stop)?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NightModeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_night_start")]
    pub start: String,

    #[serde(default = "default_night_stop")]
    pub stop: String,

    /// Lights night mode applies to; all lights when absent
    #[serde(default)]
    pub devices: Option<Vec<EntityId>>,

    /// Turn-on parameters while night mode is active
    #[serde(default)]
    pub parameters: Option<LightParameters>,
}

fn default_night_start() -> String {
    "23:30".to_string()
}

fn default_night_stop() -> String {
    "05:00".to_string()
}

impl NightModeSection {
    fn to_config(&self) -> ConfigResult<NightModeConfig> {
        let defaults = NightModeConfig::default();
        Ok(NightModeConfig {
            enabled: self.enabled,
            devices: self.devices.clone(),
            on_parameters: self
                .parameters
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.on_parameters),
            window: ScheduleWindow::new(
                parse_time("night_mode.start", &self.start)?,
                parse_time("night_mode.stop", &self.stop)?,
            ),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecondaryLightSection {
    pub lights: Vec<EntityId>,

    #[serde(default)]
    pub motion_sensors: Vec<EntityId>,

    #[serde(default = "default_hold_on")]
    pub hold_on_seconds: u64,

    #[serde(default = "default_wait_for_off")]
    pub wait_for_off_seconds: u64,

    /// Working hours for motion; always when absent
    #[serde(default)]
    pub schedule: Option<WindowSection>,

    #[serde(default)]
    pub night_mode: Option<NightModeSection>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub initial_state: Option<LightState>,
}

fn default_hold_on() -> u64 {
    3600
}

fn default_wait_for_off() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainLightSection {
    pub lights: Vec<EntityId>,

    #[serde(default)]
    pub motion_sensors: Vec<EntityId>,

    #[serde(default = "default_main_wait_for_off")]
    pub wait_for_off_seconds: u64,

    #[serde(default)]
    pub initial_state: Option<MainLightState>,
}

fn default_main_wait_for_off() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlindsSection {
    pub blinds: Vec<EntityId>,

    /// Daily open time; sunrise when absent
    #[serde(default)]
    pub open_at: Option<String>,

    /// Daily close time; sunset when absent
    #[serde(default)]
    pub close_at: Option<String>,

    #[serde(default = "default_sun_entity")]
    pub sun_entity: EntityId,

    #[serde(default)]
    pub initial_state: Option<BlindsState>,
}

fn require_domain(key: &str, ids: &[EntityId], domain: &str) -> ConfigResult<()> {
    if ids.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "at least one entity is required".to_string(),
        });
    }
    if let Some(bad) = ids.iter().find(|id| !id.is_domain(domain)) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("{} is not a {} entity", bad, domain),
        });
    }
    Ok(())
}

impl SecondaryLightSection {
    pub fn to_config(&self, room: &str) -> ConfigResult<LightAutomationConfig> {
        let key = |field: &str| format!("{}.secondary_light.{}", room, field);
        require_domain(&key("lights"), &self.lights, domains::LIGHT)?;

        let fsm = FsmConfig {
            hold_on: seconds(&key("hold_on_seconds"), self.hold_on_seconds)?,
            wait_for_off: seconds(&key("wait_for_off_seconds"), self.wait_for_off_seconds)?,
            schedule_window: self
                .schedule
                .as_ref()
                .map(|w| w.to_window(&key("schedule")))
                .transpose()?,
            night_mode: match &self.night_mode {
                Some(section) => section.to_config()?,
                None => NightModeConfig::default(),
            },
            conditions: self.conditions.clone(),
        };

        Ok(LightAutomationConfig {
            lights: self.lights.clone(),
            motion_sensors: self.motion_sensors.clone(),
            fsm,
            initial_state: self.initial_state.unwrap_or(LightState::Off),
        })
    }
}

impl MainLightSection {
    pub fn to_config(&self, room: &str) -> ConfigResult<MainLightConfig> {
        let key = |field: &str| format!("{}.main_light.{}", room, field);
        require_domain(&key("lights"), &self.lights, domains::LIGHT)?;

        Ok(MainLightConfig {
            lights: self.lights.clone(),
            motion_sensors: self.motion_sensors.clone(),
            wait_for_off: seconds(&key("wait_for_off_seconds"), self.wait_for_off_seconds)?,
            initial_state: self.initial_state.unwrap_or(MainLightState::Off),
        })
    }
}

impl BlindsSection {
    pub fn to_config(&self, room: &str) -> ConfigResult<BlindsConfig> {
        let key = |field: &str| format!("{}.blinds.{}", room, field);
        require_domain(&key("blinds"), &self.blinds, domains::COVER)?;

        Ok(BlindsConfig {
            blinds: self.blinds.clone(),
            open_at: parse_optional_time(&key("open_at"), self.open_at.as_deref())?,
            close_at: parse_optional_time(&key("close_at"), self.close_at.as_deref())?,
            sun_entity: self.sun_entity.clone(),
            initial_state: self.initial_state.unwrap_or(BlindsState::OpenByAutomation),
        })
    }
}

impl RoomConfig {
    /// The room's automations, converted and validated
    pub fn automations(&self) -> ConfigResult<Vec<AutomationConfig>> {
        let mut automations = Vec::new();
        if let Some(section) = &self.secondary_light {
            automations.push(AutomationConfig::SecondaryLight(section.to_config(&self.name)?));
        }
        if let Some(section) = &self.main_light {
            automations.push(AutomationConfig::MainLight(section.to_config(&self.name)?));
        }
        if let Some(section) = &self.blinds {
            automations.push(AutomationConfig::Blinds(section.to_config(&self.name)?));
        }
        Ok(automations)
    }
}

impl RoomsConfig {
    /// Check everything that deserialisation alone does not
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for room in &self.rooms {
            if !names.insert(room.name.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    message: format!("room '{}' is defined twice", room.name),
                });
            }
            if EntityId::new(domains::SENSOR, format!("{}_enabled", room.name)).is_err() {
                return Err(ConfigError::InvalidValue {
                    key: "rooms.name".to_string(),
                    reason: format!(
                        "'{}' must be lowercase letters, digits and underscores",
                        room.name
                    ),
                });
            }
            room.automations()?;
        }
        if self.service_account_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                key: "service_account_id".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::time::Duration;

    fn parse(yaml: &str) -> RoomsConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse("service_account_id: svc\nrooms: []");
        assert_eq!(config.storage_dir, PathBuf::from("storage"));
        assert_eq!(config.log_level, "info");
        assert!(!config.dry_run);
        assert_eq!(config.devices.sun.entity_id.to_string(), "sun.sun");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_account_is_required() {
        for yaml in ["rooms: []", "service_account_id: \"\"\nrooms: []"] {
            assert!(matches!(
                parse(yaml).validate(),
                Err(ConfigError::MissingField { key }) if key == "service_account_id"
            ));
        }
    }

    #[test]
    fn test_secondary_light_section() {
        let config = parse(
            r#"
rooms:
  - name: office
    secondary_light:
      lights: [light.desk, light.shelf]
      motion_sensors: [binary_sensor.office_motion]
      hold_on_seconds: 1800
      schedule: { start: "18:00", stop: "06:00" }
      night_mode:
        devices: [light.desk]
        parameters: { brightness_pct: 10 }
      conditions:
        - condition: state
          entity_id: media_player.tv
          state: "off"
      initial_state: OnBySwitch
"#,
        );
        let light = config.rooms[0]
            .secondary_light
            .as_ref()
            .unwrap()
            .to_config("office")
            .unwrap();

        assert_eq!(light.lights.len(), 2);
        assert_eq!(light.fsm.hold_on, Duration::from_secs(1800));
        assert_eq!(light.fsm.wait_for_off, Duration::from_secs(300));
        let window = light.fsm.schedule_window.unwrap();
        assert!(window.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(light.fsm.night_mode.enabled);
        assert_eq!(light.fsm.night_mode.on_parameters.brightness_pct, Some(10));
        assert!(!light.fsm.night_mode.applies_to(&"light.shelf".parse().unwrap()));
        assert_eq!(light.fsm.conditions.len(), 1);
        assert_eq!(light.initial_state, LightState::OnBySwitch);
    }

    #[test]
    fn test_blinds_section() {
        let config = parse(
            r#"
rooms:
  - name: bedroom
    blinds:
      blinds: [cover.bedroom]
      close_at: "21:30"
"#,
        );
        let automations = config.rooms[0].automations().unwrap();
        let AutomationConfig::Blinds(blinds) = &automations[0] else {
            panic!("expected blinds");
        };
        assert_eq!(blinds.open_at, None);
        assert_eq!(blinds.close_at, NaiveTime::from_hms_opt(21, 30, 0));
        assert_eq!(blinds.sun_entity.to_string(), "sun.sun");
        assert_eq!(blinds.initial_state, BlindsState::OpenByAutomation);
    }

    #[test]
    fn test_wrong_domain_is_rejected() {
        let config = parse(
            r#"
rooms:
  - name: hall
    main_light:
      lights: [cover.hall]
"#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "hall.main_light.lights"
        ));
    }

    #[test]
    fn test_duplicate_room_is_rejected() {
        let config = parse(
            r#"
rooms:
  - name: hall
  - name: hall
"#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_bad_room_name_is_rejected() {
        let config = parse("rooms:\n  - name: Living Room\n");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_bad_schedule_time() {
        let config = parse(
            r#"
rooms:
  - name: office
    secondary_light:
      lights: [light.desk]
      schedule: { start: "late", stop: "06:00" }
"#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "office.secondary_light.schedule.start"
        ));
    }
}
