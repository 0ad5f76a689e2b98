//! Light state machine
//!
//! One machine per secondary light. Motion turns the light on and an idle
//! timer turns it off again; a manual switch takes precedence and holds its
//! state for `hold_on` before the automation takes over again.
//!
//! ```text
//!                 MotionOn (window, conditions, night filter)
//!        ┌─────┐ ───────────────────────────────► ┌────────────┐
//!        │ Off │ ◄──────── TimerElapsed ────────── │ OnByMotion │
//!        └─────┘                                   └────────────┘
//!           ▲ TimerElapsed        SwitchOn │            │ SwitchOn
//!           │                              ▼            ▼
//!   ┌─────────────┐  SwitchOff   ┌────────────┐  TimerElapsed  ┌──────────────────┐
//!   │ OffBySwitch │ ◄─────────── │ OnBySwitch │ ─────────────► │ WaitingForMotion │
//!   └─────────────┘              └────────────┘ ◄───────────── └──────────────────┘
//!                                                  MotionOn
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ra_core::EntityId;
use ra_fsm::{FsmStorage, SharedClock, StateMachine, Timer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commands::{DeviceCommand, SharedCommands};
use crate::condition::ConditionSet;
use crate::config::{FsmConfig, LightParameters};
use crate::runtime::{Mailbox, TimerTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    Off,
    OnByMotion,
    OnBySwitch,
    OffBySwitch,
    WaitingForMotion,
}

impl LightState {
    pub const ALL: [LightState; 5] = [
        LightState::Off,
        LightState::OnByMotion,
        LightState::OnBySwitch,
        LightState::OffBySwitch,
        LightState::WaitingForMotion,
    ];

    /// States in which the light is meant to be lit
    pub fn is_on(&self) -> bool {
        matches!(
            self,
            LightState::OnByMotion | LightState::OnBySwitch | LightState::WaitingForMotion
        )
    }

    /// States whose timer is extended while motion is still present
    pub fn is_motion_held(&self) -> bool {
        matches!(self, LightState::OnByMotion | LightState::WaitingForMotion)
    }

    /// The timer a state runs, if any
    pub fn timer_duration(&self, config: &FsmConfig) -> Option<Duration> {
        match self {
            LightState::Off => None,
            LightState::OnByMotion | LightState::WaitingForMotion => Some(config.wait_for_off),
            LightState::OnBySwitch | LightState::OffBySwitch => Some(config.hold_on),
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightTrigger {
    MotionOn,
    MotionOff,
    SwitchOn,
    SwitchOff,
    TimerElapsed,
    AllOff,
}

impl LightTrigger {
    pub const ALL: [LightTrigger; 6] = [
        LightTrigger::MotionOn,
        LightTrigger::MotionOff,
        LightTrigger::SwitchOn,
        LightTrigger::SwitchOff,
        LightTrigger::TimerElapsed,
        LightTrigger::AllOff,
    ];
}

pub type LightMachine = StateMachine<LightState, LightTrigger, LightContext>;

/// Everything the light machine's actions and guards operate on
pub struct LightContext {
    pub entity_id: EntityId,
    pub timer: Timer,
    commands: SharedCommands,
    mailbox: Mailbox,
    config: Arc<FsmConfig>,
    conditions: Arc<ConditionSet>,
    clock: SharedClock,

    /// Attributes captured when the light last went off outside night mode
    pub last_params: Option<LightParameters>,

    /// Last known device state, updated from events and sent commands
    pub device_on: bool,

    /// When false, actions neither send commands nor start timers
    pub enabled: bool,
}

impl LightContext {
    pub fn new(
        entity_id: EntityId,
        commands: SharedCommands,
        mailbox: Mailbox,
        config: Arc<FsmConfig>,
        conditions: Arc<ConditionSet>,
        clock: SharedClock,
    ) -> Self {
        Self {
            entity_id,
            timer: Timer::new(),
            commands,
            mailbox,
            config,
            conditions,
            clock,
            last_params: None,
            device_on: false,
            enabled: true,
        }
    }

    pub fn config(&self) -> &FsmConfig {
        &self.config
    }

    /// Inside working hours (always, when no window is configured)
    pub fn in_window(&self) -> bool {
        self.config
            .schedule_window
            .as_ref()
            .map(|w| w.contains(self.clock.time_of_day()))
            .unwrap_or(true)
    }

    pub fn night_mode_active(&self) -> bool {
        self.config.night_mode.is_active(self.clock.time_of_day())
    }

    /// Guard for turning the light on by motion
    pub fn motion_may_turn_on(&self) -> bool {
        if !self.in_window() {
            debug!(entity_id = %self.entity_id, "Outside working hours");
            return false;
        }
        if self.night_mode_active() && !self.config.night_mode.applies_to(&self.entity_id) {
            debug!(entity_id = %self.entity_id, "Night mode excludes this light");
            return false;
        }
        self.conditions.all_met()
    }

    /// Parameters for the next automatic turn-on
    pub fn on_parameters(&self) -> LightParameters {
        let night = &self.config.night_mode;
        if self.night_mode_active() && night.applies_to(&self.entity_id) {
            return night.on_parameters.clone();
        }
        self.last_params
            .clone()
            .unwrap_or_else(|| LightParameters::brightness(255))
    }

    pub fn turn_on(&mut self) {
        if self.device_on || !self.enabled {
            return;
        }
        let params = self.on_parameters();
        let data = serde_json::Value::Object(params.to_service_data());
        self.commands
            .send_command(&self.entity_id, DeviceCommand::TurnOn, Some(data));
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

    pub fn start_timer(&mut self, duration: Duration) {
        if !self.enabled {
            return;
        }
        let callback = self
            .mailbox
            .timer_callback(TimerTarget::Entity(self.entity_id.clone()));
        self.timer.start(duration, callback);
    }

    pub fn cancel_timer(&mut self) {
        self.timer.cancel();
    }
}

/// Build the machine for one light, restoring its state from `storage`
pub fn build(storage: &FsmStorage, entity_id: &EntityId, initial: LightState) -> LightMachine {
    let (loader, persister) = storage.bind(&entity_id.to_string(), initial);
    let mut machine = StateMachine::with_storage(loader, persister).named(entity_id.to_string());
    configure(&mut machine);
    machine
}

/// Install the light transition table on `machine`
pub fn configure(machine: &mut LightMachine) {
    use LightState::*;
    use LightTrigger::*;

    machine
        .configure(Off)
        .on_activate(|c: &mut LightContext| {
            c.cancel_timer();
            c.turn_off();
        })
        .permit_if(MotionOn, OnByMotion, LightContext::motion_may_turn_on)
        .permit_reentry(MotionOff)
        .permit(SwitchOn, OnBySwitch)
        .permit_reentry(SwitchOff)
        .ignore(TimerElapsed)
        .permit_reentry(AllOff);

    machine
        .configure(OnByMotion)
        .on_activate(|c: &mut LightContext| {
            c.turn_on();
            let wait = c.config.wait_for_off;
            c.start_timer(wait);
        })
        .on_exit(LightContext::cancel_timer)
        .permit_reentry(MotionOn)
        .permit_if(MotionOff, Off, LightContext::in_window)
        .permit(SwitchOn, OnBySwitch)
        .permit(SwitchOff, OffBySwitch)
        .permit(TimerElapsed, Off)
        .permit(AllOff, Off);

    machine
        .configure(OnBySwitch)
        .on_activate(|c: &mut LightContext| {
            c.turn_on();
            let hold = c.config.hold_on;
            c.start_timer(hold);
        })
        .on_exit(LightContext::cancel_timer)
        .permit_reentry(MotionOn)
        .ignore(MotionOff)
        .permit_reentry(SwitchOn)
        .permit(SwitchOff, OffBySwitch)
        .permit_if(TimerElapsed, WaitingForMotion, LightContext::in_window)
        .permit_if(TimerElapsed, Off, |c: &LightContext| !c.in_window())
        .permit(AllOff, Off);

    machine
        .configure(WaitingForMotion)
        .on_activate(|c: &mut LightContext| {
            c.turn_on();
            let wait = c.config.wait_for_off;
            c.start_timer(wait);
        })
        .on_exit(LightContext::cancel_timer)
        .permit_if(MotionOn, OnBySwitch, |c: &LightContext| c.conditions.all_met())
        .ignore(MotionOff)
        .permit(SwitchOn, OnBySwitch)
        .permit(SwitchOff, OffBySwitch)
        .permit(TimerElapsed, Off)
        .permit(AllOff, Off);

    machine
        .configure(OffBySwitch)
        .on_activate(|c: &mut LightContext| {
            c.turn_off();
            let hold = c.config.hold_on;
            c.start_timer(hold);
        })
        .on_exit(LightContext::cancel_timer)
        .ignore(MotionOn)
        .ignore(MotionOff)
        .permit(SwitchOn, OnBySwitch)
        .permit_reentry(SwitchOff)
        .permit(TimerElapsed, Off)
        .permit(AllOff, Off);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::RecordingCommands;
    use ra_fsm::{FireOutcome, MockClock, ScheduleWindow};
    use chrono::NaiveTime;
    use tempfile::TempDir;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        storage: FsmStorage,
        commands: Arc<RecordingCommands>,
        clock: Arc<MockClock>,
        id: EntityId,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                storage: FsmStorage::new(dir.path()).child("light"),
                _dir: dir,
                commands: Arc::new(RecordingCommands::new()),
                clock: Arc::new(MockClock::at(20, 0)),
                id: "light.desk".parse().unwrap(),
            }
        }

        fn context(&self, config: FsmConfig) -> LightContext {
            let (mailbox, _inbox) = Mailbox::channel();
            LightContext::new(
                self.id.clone(),
                self.commands.clone(),
                mailbox,
                Arc::new(config),
                Arc::new(ConditionSet::empty()),
                self.clock.clone(),
            )
        }

        fn machine(&self) -> LightMachine {
            build(&self.storage, &self.id, LightState::Off)
        }

        fn persisted(&self) -> String {
            std::fs::read_to_string(self.storage.path_for(&self.id.to_string())).unwrap()
        }
    }

    fn evening_window() -> FsmConfig {
        FsmConfig {
            schedule_window: Some(ScheduleWindow::new(t(18, 0), t(6, 0))),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_motion_scenario_in_window() {
        let fx = Fixture::new();
        let mut machine = fx.machine();
        let mut ctx = fx.context(evening_window());

        let outcome = machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap();
        assert_eq!(
            outcome,
            FireOutcome::Transitioned {
                from: LightState::Off,
                to: LightState::OnByMotion
            }
        );
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOn), 1);
        assert_eq!(fx.persisted(), r#"{"State":"OnByMotion"}"#);
        assert!(ctx.timer.is_pending());

        machine.fire(LightTrigger::MotionOff, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::Off);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOff), 1);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOn), 1);
        assert_eq!(fx.persisted(), r#"{"State":"Off"}"#);
        assert!(!ctx.timer.is_pending());
    }

    #[tokio::test]
    async fn test_motion_outside_window_is_rejected() {
        let fx = Fixture::new();
        fx.clock.set_time(12, 0);
        let mut machine = fx.machine();
        let mut ctx = fx.context(evening_window());

        assert_eq!(
            machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap(),
            FireOutcome::Rejected
        );
        assert_eq!(machine.state(), LightState::Off);
        assert!(fx.commands.sent().is_empty());
    }

    #[tokio::test]
    async fn test_manual_on_ignores_motion_off() {
        let fx = Fixture::new();
        let mut machine = fx.machine();
        let mut ctx = fx.context(FsmConfig::default());

        machine.fire(LightTrigger::SwitchOn, &mut ctx).unwrap();
        assert_eq!(
            machine.fire(LightTrigger::MotionOff, &mut ctx).unwrap(),
            FireOutcome::Ignored
        );
        assert_eq!(machine.state(), LightState::OnBySwitch);
    }

    #[tokio::test]
    async fn test_manual_off_blocks_motion() {
        let fx = Fixture::new();
        let mut machine = fx.machine();
        let mut ctx = fx.context(FsmConfig::default());

        machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap();
        machine.fire(LightTrigger::SwitchOff, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::OffBySwitch);
        assert!(ctx.timer.is_pending());

        assert_eq!(
            machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap(),
            FireOutcome::Ignored
        );
        machine.fire(LightTrigger::TimerElapsed, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::Off);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOff), 1);
    }

    #[tokio::test]
    async fn test_hold_decays_through_waiting_inside_window() {
        let fx = Fixture::new();
        let mut machine = fx.machine();
        let mut ctx = fx.context(evening_window());
        ctx.device_on = true;

        machine.fire(LightTrigger::SwitchOn, &mut ctx).unwrap();
        machine.fire(LightTrigger::TimerElapsed, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::WaitingForMotion);

        machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::OnBySwitch);

        machine.fire(LightTrigger::TimerElapsed, &mut ctx).unwrap();
        machine.fire(LightTrigger::TimerElapsed, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::Off);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOff), 1);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOn), 0);
    }

    #[tokio::test]
    async fn test_hold_decays_straight_to_off_outside_window() {
        let fx = Fixture::new();
        fx.clock.set_time(9, 0);
        let mut machine = fx.machine();
        let mut ctx = fx.context(evening_window());
        ctx.device_on = true;

        machine.fire(LightTrigger::SwitchOn, &mut ctx).unwrap();
        machine.fire(LightTrigger::TimerElapsed, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::Off);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOff), 1);
    }

    #[tokio::test]
    async fn test_night_mode_parameters_and_memento() {
        let fx = Fixture::new();
        let mut config = FsmConfig::default();
        config.night_mode.enabled = true;
        let mut machine = fx.machine();
        let mut ctx = fx.context(config);
        ctx.last_params = Some(LightParameters::brightness(90));

        // 20:00: outside night mode, the memento is used
        machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap();
        machine.fire(LightTrigger::AllOff, &mut ctx).unwrap();

        // 23:45: night parameters
        fx.clock.set_time(23, 45);
        machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap();

        let on: Vec<_> = fx
            .commands
            .sent()
            .into_iter()
            .filter(|c| c.command == DeviceCommand::TurnOn)
            .collect();
        assert_eq!(on.len(), 2);
        assert_eq!(on[0].parameters, Some(serde_json::json!({"brightness": 90})));
        assert_eq!(
            on[1].parameters,
            Some(serde_json::json!({"brightness_pct": 40, "transition": 2.0}))
        );
    }

    #[tokio::test]
    async fn test_night_mode_device_filter() {
        let fx = Fixture::new();
        fx.clock.set_time(0, 30);
        let mut config = FsmConfig::default();
        config.night_mode.enabled = true;
        config.night_mode.devices = Some(vec!["light.hall".parse().unwrap()]);
        let mut machine = fx.machine();
        let mut ctx = fx.context(config);

        assert_eq!(
            machine.fire(LightTrigger::MotionOn, &mut ctx).unwrap(),
            FireOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn test_disabled_context_sends_nothing() {
        let fx = Fixture::new();
        let mut machine = fx.machine();
        let mut ctx = fx.context(FsmConfig::default());
        ctx.enabled = false;

        machine.fire(LightTrigger::SwitchOn, &mut ctx).unwrap();
        assert_eq!(machine.state(), LightState::OnBySwitch);
        assert!(fx.commands.sent().is_empty());
        assert!(!ctx.timer.is_pending());
    }

    #[tokio::test]
    async fn test_every_trigger_is_declared_in_every_state() {
        let fx = Fixture::new();
        let machine = fx.machine();
        for state in LightState::ALL {
            for trigger in LightTrigger::ALL {
                assert!(
                    machine.is_declared(state, trigger),
                    "{:?} + {:?} is undeclared",
                    state,
                    trigger
                );
            }
        }
    }

    #[tokio::test]
    async fn test_every_pair_lands_in_a_declared_state() {
        let fx = Fixture::new();
        for state in LightState::ALL {
            for trigger in LightTrigger::ALL {
                let mut machine = LightMachine::new(state);
                configure(&mut machine);
                let mut ctx = fx.context(evening_window());
                let result = machine.fire(trigger, &mut ctx);
                assert!(result.is_ok(), "{:?} + {:?}: {:?}", state, trigger, result);
                assert!(LightState::ALL.contains(&machine.state()));
            }
        }
    }

    #[tokio::test]
    async fn test_activate_reconciles_device() {
        let fx = Fixture::new();
        let path = fx.storage.path_for(&fx.id.to_string());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"State":"OnBySwitch"}"#).unwrap();
        let mut machine = fx.machine();
        let mut ctx = fx.context(FsmConfig::default());

        assert_eq!(machine.state(), LightState::OnBySwitch);
        machine.activate(&mut ctx);
        assert_eq!(fx.commands.count(&fx.id, DeviceCommand::TurnOn), 1);
        assert!(ctx.timer.is_pending());
    }
}
