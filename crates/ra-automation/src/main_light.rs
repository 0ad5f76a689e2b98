//! Main light state machine
//!
//! Main lights are only ever switched on by a person. Once on, they stay on
//! while the room is occupied and go off `wait_for_off` after the last motion.

use std::fmt;
use std::time::Duration;

use ra_core::EntityId;
use ra_fsm::{FsmStorage, StateMachine, Timer};
use serde::{Deserialize, Serialize};

use crate::commands::{DeviceCommand, SharedCommands};
use crate::runtime::{Mailbox, TimerTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MainLightState {
    Off,
    On,
}

impl MainLightState {
    pub const ALL: [MainLightState; 2] = [MainLightState::Off, MainLightState::On];
}

impl fmt::Display for MainLightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainLightTrigger {
    SwitchOn,
    SwitchOff,
    TimerElapsed,
    AllOff,
}

impl MainLightTrigger {
    pub const ALL: [MainLightTrigger; 4] = [
        MainLightTrigger::SwitchOn,
        MainLightTrigger::SwitchOff,
        MainLightTrigger::TimerElapsed,
        MainLightTrigger::AllOff,
    ];
}

pub type MainLightMachine = StateMachine<MainLightState, MainLightTrigger, MainLightContext>;

pub struct MainLightContext {
    pub entity_id: EntityId,
    pub timer: Timer,
    commands: SharedCommands,
    mailbox: Mailbox,
    wait_for_off: Duration,
    pub device_on: bool,
    pub enabled: bool,
}

impl MainLightContext {
    pub fn new(
        entity_id: EntityId,
        commands: SharedCommands,
        mailbox: Mailbox,
        wait_for_off: Duration,
    ) -> Self {
        Self {
            entity_id,
            timer: Timer::new(),
            commands,
            mailbox,
            wait_for_off,
            device_on: false,
            enabled: true,
        }
    }

    pub fn turn_on(&mut self) {
        if self.device_on || !self.enabled {
            return;
        }
        self.commands
            .send_command(&self.entity_id, DeviceCommand::TurnOn, None);
        self.device_on = true;
    }

    pub fn turn_off(&mut self) {
        if !self.device_on || !self.enabled {
            return;
        }
        self.commands
            .send_command(&self.entity_id, DeviceCommand::TurnOff, None);
        self.device_on = false;
    }

    pub fn start_timer(&mut self) {
        if !self.enabled {
            return;
        }
        let callback = self
            .mailbox
            .timer_callback(TimerTarget::Entity(self.entity_id.clone()));
        self.timer.start(self.wait_for_off, callback);
    }

    pub fn cancel_timer(&mut self) {
        self.timer.cancel();
    }
}

pub fn build(
    storage: &FsmStorage,
    entity_id: &EntityId,
    initial: MainLightState,
) -> MainLightMachine {
    let (loader, persister) = storage.bind(&entity_id.to_string(), initial);
    let mut machine = StateMachine::with_storage(loader, persister).named(entity_id.to_string());
    configure(&mut machine);
    machine
}

pub fn configure(machine: &mut MainLightMachine) {
    use MainLightState::*;
    use MainLightTrigger::*;

    machine
        .configure(Off)
        .on_activate(|c: &mut MainLightContext| {
            c.cancel_timer();
            c.turn_off();
        })
        .permit(SwitchOn, On)
        .permit_reentry(SwitchOff)
        .ignore(TimerElapsed)
        .permit_reentry(AllOff);

    machine
        .configure(On)
        .on_activate(|c: &mut MainLightContext| {
            c.turn_on();
            c.start_timer();
        })
        .on_exit(MainLightContext::cancel_timer)
        .permit_reentry(SwitchOn)
        .permit(SwitchOff, Off)
        .permit(TimerElapsed, Off)
        .permit(AllOff, Off);
}
