//! Runtime configuration of the automations
//!
//! These are the typed, validated settings an automation is built from. The
//! YAML file format lives in `ra-config`, which converts into these types.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveTime;
use ra_core::EntityId;
use ra_fsm::ScheduleWindow;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blinds::BlindsState;
use crate::condition::Condition;
use crate::light::LightState;
use crate::main_light::MainLightState;

/// Parameters of a `light.turn_on` call
///
/// Also used as the memento of a light's attributes when it is switched off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness_pct: Option<u8>,

    /// Transition time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp_kelvin: Option<u32>,

    /// Color temperature in mireds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hs_color: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgb_color: Option<[u8; 3]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy_color: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl LightParameters {
    pub fn brightness(brightness: u8) -> Self {
        Self {
            brightness: Some(brightness),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Pick the turn-on parameters out of a light's state attributes
    ///
    /// Returns `None` when no known parameter is present or the attributes
    /// cannot be read as parameters.
    pub fn from_attributes(attributes: &HashMap<String, serde_json::Value>) -> Option<Self> {
        let object: serde_json::Map<String, serde_json::Value> = attributes
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match serde_json::from_value::<Self>(serde_json::Value::Object(object)) {
            Ok(params) if !params.is_empty() => Some(params),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Light attributes are not usable as parameters");
                None
            }
        }
    }

    /// Service data fields for this parameter set
    pub fn to_service_data(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Night mode: reduced light parameters during a nightly window
#[derive(Debug, Clone)]
pub struct NightModeConfig {
    pub enabled: bool,

    /// Lights night mode applies to; `None` means every light
    pub devices: Option<Vec<EntityId>>,

    pub on_parameters: LightParameters,

    pub window: ScheduleWindow,
}

impl NightModeConfig {
    pub fn is_active(&self, now: NaiveTime) -> bool {
        self.enabled && self.window.contains(now)
    }

    pub fn applies_to(&self, entity_id: &EntityId) -> bool {
        self.devices
            .as_ref()
            .map(|devices| devices.contains(entity_id))
            .unwrap_or(true)
    }
}

impl Default for NightModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            devices: None,
            on_parameters: LightParameters {
                brightness_pct: Some(40),
                transition: Some(2.0),
                ..Default::default()
            },
            window: ScheduleWindow::new(hm(23, 30), hm(5, 0)),
        }
    }
}

/// Timing and gating shared by the light state machines of one automation
#[derive(Debug, Clone)]
pub struct FsmConfig {
    /// How long a manually switched state is held before it decays
    pub hold_on: Duration,

    /// Grace period waiting for renewed motion before turning off
    pub wait_for_off: Duration,

    /// Working hours; `None` means always
    pub schedule_window: Option<ScheduleWindow>,

    pub night_mode: NightModeConfig,

    /// Extra conditions ANDed into the motion guards
    pub conditions: Vec<Condition>,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            hold_on: Duration::from_secs(3600),
            wait_for_off: Duration::from_secs(300),
            schedule_window: None,
            night_mode: NightModeConfig::default(),
            conditions: Vec::new(),
        }
    }
}

/// Secondary lights switched by motion
#[derive(Debug, Clone)]
pub struct LightAutomationConfig {
    pub lights: Vec<EntityId>,
    pub motion_sensors: Vec<EntityId>,
    pub fsm: FsmConfig,
    pub initial_state: LightState,
}

/// Main lights switched by the user and turned off once the room is empty
#[derive(Debug, Clone)]
pub struct MainLightConfig {
    pub lights: Vec<EntityId>,
    pub motion_sensors: Vec<EntityId>,
    pub wait_for_off: Duration,
    pub initial_state: MainLightState,
}

/// Blinds opened and closed on a daily schedule or by the sun
#[derive(Debug, Clone)]
pub struct BlindsConfig {
    pub blinds: Vec<EntityId>,

    /// Daily open time; follows sunrise when unset
    pub open_at: Option<NaiveTime>,

    /// Daily close time; follows sunset when unset
    pub close_at: Option<NaiveTime>,

    pub sun_entity: EntityId,
    pub initial_state: BlindsState,
}

/// Settings of one automation, tagged by kind
#[derive(Debug, Clone)]
pub enum AutomationConfig {
    SecondaryLight(LightAutomationConfig),
    MainLight(MainLightConfig),
    Blinds(BlindsConfig),
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}
