//! Main light automation
//!
//! Follows the lights' on/off changes and turns a light off once no motion
//! has been seen for `wait_for_off`.

use std::collections::BTreeMap;

use ra_core::{states, EntityId, StateChanged};
use ra_fsm::TimerToken;
use tracing::{debug, instrument, warn};

use crate::classify::classify;
use crate::config::MainLightConfig;
use crate::host::AutomationHost;
use crate::main_light::{
    self, MainLightContext, MainLightMachine, MainLightState, MainLightTrigger,
};
use crate::runtime::{Automation, AutomationKind, Mailbox, Snapshot, TimerTarget};

struct MainLightUnit {
    machine: MainLightMachine,
    ctx: MainLightContext,
}

impl MainLightUnit {
    fn fire(&mut self, trigger: MainLightTrigger) {
        if let Err(e) = self.machine.fire(trigger, &mut self.ctx) {
            warn!(entity_id = %self.ctx.entity_id, error = %e, "Main light transition failed");
        }
    }
}

pub struct MainLightAutomation {
    motion_sensors: Vec<EntityId>,
    host: AutomationHost,
    units: BTreeMap<EntityId, MainLightUnit>,
    enabled: bool,
}

impl MainLightAutomation {
    pub fn new(config: MainLightConfig, host: AutomationHost, mailbox: Mailbox) -> Self {
        let storage = host.storage.child("main_light");
        let units = config
            .lights
            .iter()
            .map(|id| {
                let machine = main_light::build(&storage, id, config.initial_state);
                let mut ctx = MainLightContext::new(
                    id.clone(),
                    host.commands.clone(),
                    mailbox.clone(),
                    config.wait_for_off,
                );
                ctx.device_on = host.states.is_state(id, states::ON);
                (id.clone(), MainLightUnit { machine, ctx })
            })
            .collect();

        Self {
            motion_sensors: config.motion_sensors,
            host,
            units,
            enabled: true,
        }
    }

    fn motion_present(&self) -> bool {
        self.host.states.any_in_state(&self.motion_sensors, states::ON)
    }
}

impl Automation for MainLightAutomation {
    fn kind(&self) -> AutomationKind {
        AutomationKind::MainLight
    }

    fn watches(&self, entity_id: &EntityId) -> bool {
        self.units.contains_key(entity_id)
    }

    fn start(&mut self) {
        for unit in self.units.values_mut() {
            unit.machine.activate(&mut unit.ctx);
        }
    }

    #[instrument(skip(self, event), fields(entity_id = %event.entity_id))]
    fn on_state_changed(&mut self, event: &StateChanged) {
        let Some(change) = classify(event, self.host.service_account()) else {
            return;
        };
        let Some(unit) = self.units.get_mut(change.entity_id) else {
            return;
        };

        let (trigger, target) = match change.value {
            states::ON => (MainLightTrigger::SwitchOn, MainLightState::On),
            states::OFF => (MainLightTrigger::SwitchOff, MainLightState::Off),
            _ => return,
        };
        unit.ctx.device_on = target == MainLightState::On;
        if unit.machine.is_in_state(target) {
            debug!(state = %target, "Already in matching state");
            return;
        }
        unit.fire(trigger);
    }

    fn on_timer(&mut self, target: TimerTarget, token: TimerToken) {
        let TimerTarget::Entity(entity_id) = target else {
            return;
        };
        let motion = self.enabled && self.motion_present();
        let Some(unit) = self.units.get_mut(&entity_id) else {
            return;
        };
        if !unit.ctx.timer.is_current(token) {
            return;
        }

        if motion && unit.machine.is_in_state(MainLightState::On) {
            debug!(entity_id = %entity_id, "Room still occupied, restarting timer");
            unit.ctx.start_timer();
            return;
        }
        unit.fire(MainLightTrigger::TimerElapsed);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        for unit in self.units.values_mut() {
            unit.ctx.enabled = enabled;
            if !enabled {
                unit.ctx.cancel_timer();
            } else if unit.machine.is_in_state(MainLightState::On) && !unit.ctx.timer.is_pending() {
                unit.ctx.start_timer();
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn all_off(&mut self) {
        for unit in self.units.values_mut() {
            unit.fire(MainLightTrigger::AllOff);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{DeviceCommand, RecordingCommands};
    use ra_core::Context;
    use ra_event_bus::EventBus;
    use ra_fsm::{FsmStorage, MockClock};
    use ra_state_store::StateStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_follows_switch_and_turns_off_after_timeout() {
        tokio::time::pause();
        let dir = TempDir::new().unwrap();
        let states = Arc::new(StateStore::new(Arc::new(EventBus::new())));
        let commands = Arc::new(RecordingCommands::new());
        let host = AutomationHost {
            states: states.clone(),
            commands: commands.clone(),
            clock: Arc::new(MockClock::at(9, 0)),
            storage: FsmStorage::new(dir.path()),
            service_account_id: Some("svc".to_string()),
        };
        let config = MainLightConfig {
            lights: vec![id("light.ceiling")],
            motion_sensors: vec![id("binary_sensor.motion")],
            wait_for_off: Duration::from_secs(60),
            initial_state: MainLightState::Off,
        };
        let (mailbox, mut inbox) = Mailbox::channel();
        let mut automation = MainLightAutomation::new(config, host, mailbox);
        automation.start();

        states.set(id("binary_sensor.motion"), "on", HashMap::new(), Context::new());
        let new = states.set(id("light.ceiling"), "on", HashMap::new(), Context::with_user("alice"));
        automation.on_state_changed(&StateChanged::new(
            id("light.ceiling"),
            None,
            Some(new),
            Context::with_user("alice"),
        ));
        assert_eq!(
            automation.snapshot().state_of(&id("light.ceiling")),
            Some("On")
        );

        // Motion still present: the timer is restarted
        tokio::time::sleep(Duration::from_secs(61)).await;
        if let Some(crate::runtime::AutomationMessage::TimerElapsed { target, token }) =
            inbox.recv().await
        {
            automation.on_timer(target, token);
        }
        assert_eq!(automation.snapshot().state_of(&id("light.ceiling")), Some("On"));

        states.set(id("binary_sensor.motion"), "off", HashMap::new(), Context::new());
        tokio::time::sleep(Duration::from_secs(61)).await;
        if let Some(crate::runtime::AutomationMessage::TimerElapsed { target, token }) =
            inbox.recv().await
        {
            automation.on_timer(target, token);
        }
        assert_eq!(automation.snapshot().state_of(&id("light.ceiling")), Some("Off"));
        assert_eq!(commands.count(&id("light.ceiling"), DeviceCommand::TurnOff), 1);
    }
}
