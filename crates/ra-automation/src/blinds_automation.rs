//! Blinds automation
//!
//! Opens every blind at `open_at` and closes them at `close_at`. When a time
//! is not configured the sun entity decides instead: `above_horizon` opens
//! and `below_horizon` closes. Both are room-wide broadcasts that clear any
//! manual lock.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use ra_core::{states, EntityId, StateChanged};
use ra_fsm::schedule::until_next;
use ra_fsm::{is_after, is_before, is_within_window, Timer, TimerToken};
use tracing::{debug, info, instrument, warn};

use crate::blinds::{self, BlindsContext, BlindsMachine, BlindsTrigger};
use crate::classify::{classify, Initiator};
use crate::config::BlindsConfig;
use crate::host::AutomationHost;
use crate::runtime::{Automation, AutomationKind, Mailbox, Snapshot, TimerTarget};

struct BlindsUnit {
    machine: BlindsMachine,
    ctx: BlindsContext,
}

impl BlindsUnit {
    fn fire(&mut self, trigger: BlindsTrigger) {
        if let Err(e) = self.machine.fire(trigger, &mut self.ctx) {
            warn!(entity_id = %self.ctx.entity_id, error = %e, "Blinds transition failed");
        }
    }
}

pub struct BlindsAutomation {
    blinds: Vec<EntityId>,
    open_at: Option<NaiveTime>,
    close_at: Option<NaiveTime>,
    sun_entity: EntityId,
    host: AutomationHost,
    mailbox: Mailbox,
    units: BTreeMap<EntityId, BlindsUnit>,
    open_timer: Timer,
    close_timer: Timer,
    enabled: bool,
}

impl BlindsAutomation {
    pub fn new(config: BlindsConfig, host: AutomationHost, mailbox: Mailbox) -> Self {
        let storage = host.storage.child("blinds");
        let units = config
            .blinds
            .iter()
            .map(|id| {
                let machine = blinds::build(&storage, id, config.initial_state);
                let mut ctx = BlindsContext::new(id.clone(), host.commands.clone());
                ctx.device_state = host.states.get_state(id);
                (id.clone(), BlindsUnit { machine, ctx })
            })
            .collect();

        Self {
            blinds: config.blinds,
            open_at: config.open_at,
            close_at: config.close_at,
            sun_entity: config.sun_entity,
            host,
            mailbox,
            units,
            open_timer: Timer::new(),
            close_timer: Timer::new(),
            enabled: true,
        }
    }

    fn sun_is_up(&self) -> bool {
        self.host
            .states
            .is_state(&self.sun_entity, states::ABOVE_HORIZON)
    }

    /// Whether the blinds should be open right now
    pub fn is_open_time(&self) -> bool {
        let now = self.host.clock.time_of_day();
        match (self.open_at, self.close_at) {
            (None, None) => self.sun_is_up(),
            (Some(open), Some(close)) => is_within_window(now, open, close),
            (None, Some(close)) => self.sun_is_up() && is_before(now, close),
            (Some(open), None) => is_after(now, open) && self.sun_is_up(),
        }
    }

    fn fire_all(&mut self, trigger: BlindsTrigger) {
        for unit in self.units.values_mut() {
            unit.fire(trigger);
        }
    }

    fn broadcast(&mut self, trigger: BlindsTrigger) {
        if !self.enabled {
            debug!(trigger = ?trigger, "Automation disabled, skipping broadcast");
            return;
        }
        info!(trigger = ?trigger, "Blinds broadcast");
        self.fire_all(trigger);
    }

    fn schedule_open(&mut self) {
        if let Some(at) = self.open_at {
            let delay = until_next(self.host.clock.now(), at);
            debug!(at = %at, delay = ?delay, "Scheduling daily open");
            self.open_timer
                .start(delay, self.mailbox.timer_callback(TimerTarget::DailyOpen));
        }
    }

    fn schedule_close(&mut self) {
        if let Some(at) = self.close_at {
            let delay = until_next(self.host.clock.now(), at);
            debug!(at = %at, delay = ?delay, "Scheduling daily close");
            self.close_timer
                .start(delay, self.mailbox.timer_callback(TimerTarget::DailyClose));
        }
    }

    fn on_sun(&mut self, event: &StateChanged) {
        if !event.is_value_change() {
            return;
        }
        if self.open_at.is_none() && event.changed_to(states::ABOVE_HORIZON) {
            self.broadcast(BlindsTrigger::AllOpen);
        } else if self.close_at.is_none() && event.changed_to(states::BELOW_HORIZON) {
            self.broadcast(BlindsTrigger::AllClose);
        }
    }

    fn on_blind(&mut self, event: &StateChanged) {
        let Some(change) = classify(event, self.host.service_account()) else {
            return;
        };
        let open = match change.value {
            states::OPEN => true,
            states::CLOSED => false,
            _ => return,
        };
        let any_open = self.host.states.any_in_state(&self.blinds, states::OPEN);
        let Some(unit) = self.units.get_mut(change.entity_id) else {
            return;
        };
        unit.ctx.device_state = Some(change.value.to_string());

        match (change.initiator, open) {
            (Initiator::User, true) => unit.fire(BlindsTrigger::ManualOpen),
            (Initiator::User, false) if !any_open => {
                debug!("Last blind closed by hand, closing all");
                self.fire_all(BlindsTrigger::AllClose);
            }
            (Initiator::User, false) => unit.fire(BlindsTrigger::ManualClose),
            (Initiator::Automation, true) => unit.fire(BlindsTrigger::AutomationOpen),
            (Initiator::Automation, false) => unit.fire(BlindsTrigger::AutomationClose),
        }
    }
}

impl Automation for BlindsAutomation {
    fn kind(&self) -> AutomationKind {
        AutomationKind::Blinds
    }

    fn watches(&self, entity_id: &EntityId) -> bool {
        *entity_id == self.sun_entity || self.units.contains_key(entity_id)
    }

    fn start(&mut self) {
        let trigger = if self.is_open_time() {
            BlindsTrigger::AutomationOpen
        } else {
            BlindsTrigger::AutomationClose
        };
        for unit in self.units.values_mut() {
            unit.fire(trigger);
            unit.machine.activate(&mut unit.ctx);
        }
        self.schedule_open();
        self.schedule_close();
    }

    #[instrument(skip(self, event), fields(entity_id = %event.entity_id))]
    fn on_state_changed(&mut self, event: &StateChanged) {
        if event.entity_id == self.sun_entity {
            self.on_sun(event);
        } else {
            self.on_blind(event);
        }
    }

    fn on_timer(&mut self, target: TimerTarget, token: TimerToken) {
        match target {
            TimerTarget::DailyOpen if self.open_timer.is_current(token) => {
                self.schedule_open();
                self.broadcast(BlindsTrigger::AllOpen);
            }
            TimerTarget::DailyClose if self.close_timer.is_current(token) => {
                self.schedule_close();
                self.broadcast(BlindsTrigger::AllClose);
            }
            other => debug!(target = ?other, "Stale blinds timer"),
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        for unit in self.units.values_mut() {
            unit.ctx.enabled = enabled;
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn all_off(&mut self) {
        self.fire_all(BlindsTrigger::AllClose);
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
        self.open_timer.cancel();
        self.close_timer.cancel();
    }
}
