//! Blinds state machine
//!
//! Automation opens and closes a cover until someone moves it by hand. From
//! then on automation triggers are ignored until the next room-wide
//! `AllOpen`/`AllClose`.

use std::fmt;

use ra_core::{states, EntityId};
use ra_fsm::{FsmStorage, StateMachine};
use serde::{Deserialize, Serialize};

use crate::commands::{DeviceCommand, SharedCommands};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlindsState {
    OpenByAutomation,
    OpenByManual,
    Closed,
    CloseManually,
}

impl BlindsState {
    pub const ALL: [BlindsState; 4] = [
        BlindsState::OpenByAutomation,
        BlindsState::OpenByManual,
        BlindsState::Closed,
        BlindsState::CloseManually,
    ];

    pub fn is_open(&self) -> bool {
        matches!(self, BlindsState::OpenByAutomation | BlindsState::OpenByManual)
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, BlindsState::OpenByManual | BlindsState::CloseManually)
    }
}

impl fmt::Display for BlindsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlindsTrigger {
    AutomationOpen,
    AutomationClose,
    ManualOpen,
    ManualClose,
    AllOpen,
    AllClose,
}

impl BlindsTrigger {
    pub const ALL: [BlindsTrigger; 6] = [
        BlindsTrigger::AutomationOpen,
        BlindsTrigger::AutomationClose,
        BlindsTrigger::ManualOpen,
        BlindsTrigger::ManualClose,
        BlindsTrigger::AllOpen,
        BlindsTrigger::AllClose,
    ];
}

pub type BlindsMachine = StateMachine<BlindsState, BlindsTrigger, BlindsContext>;

pub struct BlindsContext {
    pub entity_id: EntityId,
    commands: SharedCommands,

    /// Last reported cover state (`open`, `closed`, ...)
    pub device_state: Option<String>,

    pub enabled: bool,
}

impl BlindsContext {
    pub fn new(entity_id: EntityId, commands: SharedCommands) -> Self {
        Self {
            entity_id,
            commands,
            device_state: None,
            enabled: true,
        }
    }

    fn send(&mut self, command: DeviceCommand, target: &str) {
        if !self.enabled || self.device_state.as_deref() == Some(target) {
            return;
        }
        self.commands.send_command(&self.entity_id, command, None);
        self.device_state = Some(target.to_string());
    }

    pub fn open(&mut self) {
        self.send(DeviceCommand::OpenCover, states::OPEN);
    }

    pub fn close(&mut self) {
        self.send(DeviceCommand::CloseCover, states::CLOSED);
    }
}

pub fn build(storage: &FsmStorage, entity_id: &EntityId, initial: BlindsState) -> BlindsMachine {
    let (loader, persister) = storage.bind(&entity_id.to_string(), initial);
    let mut machine = StateMachine::with_storage(loader, persister).named(entity_id.to_string());
    configure(&mut machine);
    machine
}

pub fn configure(machine: &mut BlindsMachine) {
    use BlindsState::*;
    use BlindsTrigger::*;

    machine
        .configure(OpenByAutomation)
        .on_activate(BlindsContext::open)
        .ignore(AutomationOpen)
        .permit(AutomationClose, Closed)
        .permit(ManualOpen, OpenByManual)
        .permit(ManualClose, CloseManually)
        .permit_reentry(AllOpen)
        .permit(AllClose, Closed);

    machine
        .configure(OpenByManual)
        .ignore(AutomationOpen)
        .ignore(AutomationClose)
        .permit_reentry(ManualOpen)
        .permit(ManualClose, CloseManually)
        .permit(AllOpen, OpenByAutomation)
        .permit(AllClose, Closed);

    machine
        .configure(Closed)
        .on_activate(BlindsContext::close)
        .permit(AutomationOpen, OpenByAutomation)
        .ignore(AutomationClose)
        .permit(ManualOpen, OpenByManual)
        .permit(ManualClose, CloseManually)
        .permit(AllOpen, OpenByAutomation)
        .permit_reentry(AllClose);

    machine
        .configure(CloseManually)
        .ignore(AutomationOpen)
        .ignore(AutomationClose)
        .permit(ManualOpen, OpenByManual)
        .permit_reentry(ManualClose)
        .permit(AllOpen, OpenByAutomation)
        .permit(AllClose, Closed);
}
