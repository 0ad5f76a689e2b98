//! Collaborators every automation is built with

use ra_fsm::{FsmStorage, SharedClock};
use ra_state_store::SharedStateStore;

use crate::commands::SharedCommands;

#[derive(Clone)]
pub struct AutomationHost {
    /// Live entity states, read by guards and cross-entity rules
    pub states: SharedStateStore,
    pub commands: SharedCommands,
    pub clock: SharedClock,
    /// Root storage directory; each automation kind uses a sub-directory
    pub storage: FsmStorage,
    /// Identity the automations act under
    pub service_account_id: Option<String>,
}

impl AutomationHost {
    pub fn service_account(&self) -> Option<&str> {
        self.service_account_id.as_deref()
    }
}
