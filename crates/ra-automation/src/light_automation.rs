//! Secondary light automation
//!
//! Drives one [`LightMachine`] per light from three sources:
//!
//! - motion sensors turning `on`
//! - the lights' own state changes, split into user and automation initiated
//! - per-light timers, delivered through the mailbox
//!
//! The automation's own commands come back as automation-initiated changes.
//! Those that agree with the machine's state are echoes and are dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use ra_core::{states, EntityId, StateChanged};
use ra_fsm::TimerToken;
use tracing::{debug, info, instrument, warn};

use crate::classify::{classify, Classified, Initiator};
use crate::condition::ConditionSet;
use crate::config::{FsmConfig, LightAutomationConfig, LightParameters};
use crate::host::AutomationHost;
use crate::light::{self, LightContext, LightMachine, LightState, LightTrigger};
use crate::runtime::{Automation, AutomationKind, Mailbox, Snapshot, TimerTarget};

struct LightUnit {
    machine: LightMachine,
    ctx: LightContext,
}

impl LightUnit {
    fn fire(&mut self, trigger: LightTrigger) {
        if let Err(e) = self.machine.fire(trigger, &mut self.ctx) {
            warn!(entity_id = %self.ctx.entity_id, error = %e, "Light transition failed");
        }
    }

    /// Keep the light's attributes for the next turn-on, unless night mode
    /// produced them
    fn capture_parameters(&mut self, event: &StateChanged) {
        if self.ctx.night_mode_active() {
            return;
        }
        let captured = event
            .old_state
            .as_ref()
            .and_then(|old| LightParameters::from_attributes(&old.attributes));
        if let Some(params) = captured {
            debug!(entity_id = %self.ctx.entity_id, params = ?params, "Captured light parameters");
            self.ctx.last_params = Some(params);
        }
    }
}

pub struct LightAutomation {
    lights: Vec<EntityId>,
    motion_sensors: Vec<EntityId>,
    config: Arc<FsmConfig>,
    host: AutomationHost,
    units: BTreeMap<EntityId, LightUnit>,
    enabled: bool,
}

impl LightAutomation {
    pub fn new(config: LightAutomationConfig, host: AutomationHost, mailbox: Mailbox) -> Self {
        let storage = host.storage.child("light");
        let fsm = Arc::new(config.fsm);
        let conditions = Arc::new(ConditionSet::new(
            fsm.conditions.clone(),
            host.states.clone(),
        ));

        let units = config
            .lights
            .iter()
            .map(|id| {
                let machine = light::build(&storage, id, config.initial_state);
                let mut ctx = LightContext::new(
                    id.clone(),
                    host.commands.clone(),
                    mailbox.clone(),
                    fsm.clone(),
                    conditions.clone(),
                    host.clock.clone(),
                );
                if let Some(state) = host.states.get(id) {
                    ctx.device_on = state.is(states::ON);
                    ctx.last_params = LightParameters::from_attributes(&state.attributes);
                }
                (id.clone(), LightUnit { machine, ctx })
            })
            .collect();

        Self {
            lights: config.lights,
            motion_sensors: config.motion_sensors,
            config: fsm,
            host,
            units,
            enabled: true,
        }
    }

    fn motion_present(&self) -> bool {
        self.host.states.any_in_state(&self.motion_sensors, states::ON)
    }

    fn lights_on(&self) -> usize {
        self.host.states.count_in_state(&self.lights, states::ON)
    }

    fn fire_all(&mut self, trigger: LightTrigger) {
        for unit in self.units.values_mut() {
            unit.fire(trigger);
        }
    }

    fn fire_all_except(&mut self, skip: &EntityId, trigger: LightTrigger) {
        for (id, unit) in self.units.iter_mut() {
            if id != skip {
                unit.fire(trigger);
            }
        }
    }

    /// Fire `AllOff` on every light
    pub fn fire_all_off(&mut self) {
        info!("Turning off all lights");
        self.fire_all(LightTrigger::AllOff);
    }

    fn on_motion(&mut self, event: &StateChanged) {
        if !event.is_value_change() || !event.changed_to(states::ON) {
            return;
        }
        if !self.enabled {
            debug!(sensor = %event.entity_id, "Automation disabled, ignoring motion");
            return;
        }
        self.fire_all(LightTrigger::MotionOn);
    }

    fn on_light(&mut self, change: Classified<'_>, event: &StateChanged) {
        let lights_on = self.lights_on();
        let entity_id = change.entity_id.clone();
        let Some(unit) = self.units.get_mut(&entity_id) else {
            return;
        };

        let value = change.value;
        if value != states::ON && value != states::OFF {
            return;
        }
        unit.ctx.device_on = value == states::ON;
        let state = unit.machine.state();

        match (change.initiator, value == states::ON) {
            (Initiator::User, true) => unit.fire(LightTrigger::SwitchOn),
            (Initiator::User, false) => {
                unit.capture_parameters(event);
                unit.fire(LightTrigger::SwitchOff);
                if lights_on == 0 {
                    self.fire_all_except(&entity_id, LightTrigger::AllOff);
                }
            }
            (Initiator::Automation, true) => {
                if state.is_on() {
                    debug!(entity_id = %entity_id, state = %state, "Echo of own turn-on");
                    return;
                }
                unit.fire(LightTrigger::MotionOn);
            }
            (Initiator::Automation, false) => {
                unit.capture_parameters(event);
                if !state.is_on() {
                    debug!(entity_id = %entity_id, state = %state, "Echo of own turn-off");
                    return;
                }
                if lights_on == 0 {
                    self.fire_all_off();
                } else {
                    unit.fire(LightTrigger::MotionOff);
                }
            }
        }
    }
}

impl Automation for LightAutomation {
    fn kind(&self) -> AutomationKind {
        AutomationKind::SecondaryLight
    }

    fn watches(&self, entity_id: &EntityId) -> bool {
        self.units.contains_key(entity_id) || self.motion_sensors.contains(entity_id)
    }

    fn start(&mut self) {
        for unit in self.units.values_mut() {
            unit.machine.activate(&mut unit.ctx);
        }
    }

    #[instrument(skip(self, event), fields(entity_id = %event.entity_id))]
    fn on_state_changed(&mut self, event: &StateChanged) {
        if self.motion_sensors.contains(&event.entity_id) {
            self.on_motion(event);
            return;
        }
        if let Some(change) = classify(event, self.host.service_account()) {
            self.on_light(change, event);
        }
    }

    fn on_timer(&mut self, target: TimerTarget, token: TimerToken) {
        let TimerTarget::Entity(entity_id) = target else {
            return;
        };
        let motion = self.enabled && self.motion_present();
        let wait_for_off = self.config.wait_for_off;
        let Some(unit) = self.units.get_mut(&entity_id) else {
            return;
        };
        if !unit.ctx.timer.is_current(token) {
            debug!(entity_id = %entity_id, "Stale timer");
            return;
        }

        if motion && unit.machine.state().is_motion_held() {
            debug!(entity_id = %entity_id, "Motion still present, restarting idle timer");
            unit.ctx.start_timer(wait_for_off);
            return;
        }
        unit.fire(LightTrigger::TimerElapsed);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        for unit in self.units.values_mut() {
            unit.ctx.enabled = enabled;
            if !enabled && unit.machine.state() != LightState::OnBySwitch {
                unit.ctx.cancel_timer();
            }
        }
        if !enabled {
            return;
        }

        if self.motion_present() {
            self.fire_all(LightTrigger::MotionOn);
        }
        let config = self.config.clone();
        for unit in self.units.values_mut() {
            if unit.ctx.timer.is_pending() {
                continue;
            }
            if let Some(duration) = unit.machine.state().timer_duration(&config) {
                unit.ctx.start_timer(duration);
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn all_off(&mut self) {
        self.fire_all_off();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            kind: self.kind(),
            enabled: self.enabled,
            states: self
                .units
                .iter()
                .map(|(id, unit)| (id.clone(), unit.machine.state().to_string()))
                .collect(),
        }
    }

    fn stop(&mut self) {
        for unit in self.units.values_mut() {
            unit.ctx.cancel_timer();
        }
    }
}
