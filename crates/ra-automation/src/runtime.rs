//! Automation actor runtime
//!
//! Every automation runs as one tokio task that owns its state machines.
//! The task serialises everything that can touch them:
//!
//! ```text
//!   event bus ──► StateChanged ──┐
//!   timers ─────► TimerElapsed ──┼──► select! loop ──► Automation (FSMs)
//!   room/admin ─► SetEnabled ────┘
//! ```
//!
//! Timer callbacks never touch a machine; they post into the mailbox and the
//! loop checks the token against the timer before acting.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ra_core::{EntityId, StateChanged};
use ra_fsm::TimerToken;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AutomationError;

/// The kinds of automation a room can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationKind {
    SecondaryLight,
    MainLight,
    Blinds,
}

impl AutomationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationKind::SecondaryLight => "secondary_light",
            AutomationKind::MainLight => "main_light",
            AutomationKind::Blinds => "blinds",
        }
    }
}

impl fmt::Display for AutomationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationKind {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secondary_light" => Ok(AutomationKind::SecondaryLight),
            "main_light" => Ok(AutomationKind::MainLight),
            "blinds" => Ok(AutomationKind::Blinds),
            other => Err(AutomationError::UnknownKind(other.to_string())),
        }
    }
}

/// What a timer belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTarget {
    /// The per-entity timer of one state machine
    Entity(EntityId),
    /// The daily open time of a blinds schedule
    DailyOpen,
    /// The daily close time of a blinds schedule
    DailyClose,
}

/// Messages accepted by an automation task
#[derive(Debug)]
pub enum AutomationMessage {
    TimerElapsed {
        target: TimerTarget,
        token: TimerToken,
    },
    SetEnabled(bool),
    AllOff,
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Sender side of an automation's mailbox, handed to timer callbacks
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: mpsc::UnboundedSender<AutomationMessage>,
}

impl Mailbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AutomationMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn post(&self, message: AutomationMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Resolves once the automation task has dropped its receiver
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    /// Callback for [`Timer::start`](ra_fsm::Timer::start) that reports back to this mailbox
    pub fn timer_callback(&self, target: TimerTarget) -> impl FnOnce(TimerToken) + Send + 'static {
        let mailbox = self.clone();
        move |token| {
            // A closed mailbox means the automation has stopped
            mailbox.post(AutomationMessage::TimerElapsed { target, token });
        }
    }
}

/// Point-in-time view of an automation, for tests and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub kind: AutomationKind,
    pub enabled: bool,
    /// Current state name of every machine
    pub states: BTreeMap<EntityId, String>,
}

impl Snapshot {
    pub fn state_of(&self, entity_id: &EntityId) -> Option<&str> {
        self.states.get(entity_id).map(String::as_str)
    }
}

/// Behaviour driven by the actor loop
pub trait Automation: Send + 'static {
    fn kind(&self) -> AutomationKind;

    /// Entities whose state changes this automation consumes
    fn watches(&self, entity_id: &EntityId) -> bool;

    /// Called once in the task before the first event
    fn start(&mut self);

    fn on_state_changed(&mut self, event: &StateChanged);

    fn on_timer(&mut self, target: TimerTarget, token: TimerToken);

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn all_off(&mut self);

    fn snapshot(&self) -> Snapshot;

    /// Called once when the task ends
    fn stop(&mut self);
}

/// Handle to a running automation task
pub struct AutomationHandle {
    kind: AutomationKind,
    mailbox: Mailbox,
    enabled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AutomationHandle {
    pub fn kind(&self) -> AutomationKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.mailbox.post(AutomationMessage::SetEnabled(enabled));
    }

    /// Flip the enabled flag, returning the new value
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::SeqCst);
        self.mailbox.post(AutomationMessage::SetEnabled(enabled));
        enabled
    }

    pub fn all_off(&self) {
        self.mailbox.post(AutomationMessage::AllOff);
    }

    /// Ask the task for a snapshot; `None` if it has stopped
    pub async fn snapshot(&self) -> Option<Snapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.mailbox.post(AutomationMessage::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(&self) {
        self.mailbox.post(AutomationMessage::Shutdown);
        self.mailbox.closed().await;
    }
}

/// Spawn the actor loop for `automation`
///
/// `events` must be subscribed before any state the automation depends on
/// can change, so nothing is missed between construction and the first poll.
pub fn spawn<A: Automation>(
    mut automation: A,
    mut events: broadcast::Receiver<StateChanged>,
    mailbox: Mailbox,
    mut inbox: mpsc::UnboundedReceiver<AutomationMessage>,
) -> AutomationHandle {
    let kind = automation.kind();
    let enabled = Arc::new(AtomicBool::new(automation.is_enabled()));

    let task = tokio::spawn(async move {
        automation.start();
        info!(kind = %kind, "Automation started");

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    None | Some(AutomationMessage::Shutdown) => break,
                    Some(AutomationMessage::TimerElapsed { target, token }) => {
                        automation.on_timer(target, token);
                    }
                    Some(AutomationMessage::SetEnabled(enabled)) => {
                        if enabled != automation.is_enabled() {
                            info!(kind = %kind, enabled, "Automation toggled");
                            automation.set_enabled(enabled);
                        }
                    }
                    Some(AutomationMessage::AllOff) => automation.all_off(),
                    Some(AutomationMessage::Snapshot(reply)) => {
                        let _ = reply.send(automation.snapshot());
                    }
                },
                event = events.recv() => match event {
                    Ok(event) => {
                        if automation.watches(&event.entity_id) {
                            automation.on_state_changed(&event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(kind = %kind, skipped, "Automation lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        automation.stop();
        debug!(kind = %kind, "Automation stopped");
    });

    AutomationHandle {
        kind,
        mailbox,
        enabled,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in [
            AutomationKind::SecondaryLight,
            AutomationKind::MainLight,
            AutomationKind::Blinds,
        ] {
            assert_eq!(kind.as_str().parse::<AutomationKind>().unwrap(), kind);
        }
        assert!(matches!(
            "garage".parse::<AutomationKind>(),
            Err(AutomationError::UnknownKind(_))
        ));
    }

    #[tokio::test]
    async fn test_mailbox_closed_when_receiver_dropped() {
        let (mailbox, inbox) = Mailbox::channel();
        drop(inbox);
        tokio::time::timeout(std::time::Duration::from_secs(1), mailbox.closed())
            .await
            .unwrap();
        assert!(!mailbox.post(AutomationMessage::AllOff));
    }

    #[test]
    fn test_timer_callback_posts_to_mailbox() {
        let (mailbox, mut inbox) = Mailbox::channel();
        let target = TimerTarget::Entity("light.desk".parse().unwrap());

        let mut timer_tokens = Vec::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let mut timer = ra_fsm::Timer::new();
            timer_tokens.push(timer.start(
                std::time::Duration::from_secs(1),
                mailbox.timer_callback(target.clone()),
            ));
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        });

        match inbox.try_recv().unwrap() {
            AutomationMessage::TimerElapsed { target: t, token } => {
                assert_eq!(t, target);
                assert_eq!(token, timer_tokens[0]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
