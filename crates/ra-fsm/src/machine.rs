//! Generic state machine with guarded transitions
//!
//! A [`StateMachine`] is parameterised by a state enum `S`, a trigger enum
//! `T` and a context `C` that actions and guards operate on. The machine
//! owns only the current state and the transition table; everything the
//! actions touch (timers, command sinks, configuration) lives in the context
//! and is passed to [`StateMachine::fire`] by the owner.
//!
//! ```text
//! fire(trigger)
//!   ├─ no rule for (state, trigger)      → Err(InvalidTransition)
//!   ├─ rules exist, every guard false    → Ok(Rejected)
//!   ├─ ignore rule                       → Ok(Ignored)
//!   └─ transition / reentry
//!        exit(source) → state = dest → entry(dest) → activate(dest)
//!        → completion hooks              → Ok(Transitioned | Reentered)
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, trace, warn};

/// Action run on entry, activation or exit of a state
pub type Action<C> = Box<dyn Fn(&mut C) + Send>;

/// Guard evaluated at fire time
pub type Guard<C> = Box<dyn Fn(&C) -> bool + Send>;

type CompletionHook<S, T> = Box<dyn Fn(&Transition<S, T>) + Send>;

/// Errors returned by [`StateMachine::fire`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError<S: Debug, T: Debug> {
    #[error("trigger {trigger:?} is not permitted in state {state:?}")]
    InvalidTransition { state: S, trigger: T },
}

/// A completed transition, passed to completion hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S, T> {
    pub source: S,
    pub destination: S,
    pub trigger: T,
}

impl<S: PartialEq, T> Transition<S, T> {
    pub fn is_reentry(&self) -> bool {
        self.source == self.destination
    }
}

/// Result of firing a trigger that was declared for the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome<S> {
    /// The machine moved from one state to another
    Transitioned { from: S, to: S },
    /// The state was exited and entered again
    Reentered(S),
    /// The trigger is explicitly ignored in this state
    Ignored,
    /// Every guard declared for the trigger evaluated to false
    Rejected,
}

impl<S> FireOutcome<S> {
    /// True for outcomes that ran actions and completion hooks
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            FireOutcome::Transitioned { .. } | FireOutcome::Reentered(_)
        )
    }
}

#[derive(Clone, Copy)]
enum Behaviour<S> {
    Transition(S),
    Reentry,
    Ignore,
}

struct Rule<S, T, C> {
    trigger: T,
    behaviour: Behaviour<S>,
    guard: Option<Guard<C>>,
}

struct StateConfig<S, T, C> {
    rules: Vec<Rule<S, T, C>>,
    entry: Vec<Action<C>>,
    activate: Vec<Action<C>>,
    exit: Vec<Action<C>>,
}

impl<S, T, C> Default for StateConfig<S, T, C> {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            entry: Vec::new(),
            activate: Vec::new(),
            exit: Vec::new(),
        }
    }
}

/// Builder returned by [`StateMachine::configure`]
pub struct StateConfigurator<'a, S, T, C> {
    config: &'a mut StateConfig<S, T, C>,
}

impl<'a, S, T, C> StateConfigurator<'a, S, T, C> {
    /// Run `action` every time the state is entered, including reentry
    pub fn on_entry(self, action: impl Fn(&mut C) + Send + 'static) -> Self {
        self.config.entry.push(Box::new(action));
        self
    }

    /// Run `action` on entry (after entry actions) and on [`StateMachine::activate`]
    pub fn on_activate(self, action: impl Fn(&mut C) + Send + 'static) -> Self {
        self.config.activate.push(Box::new(action));
        self
    }

    /// Run `action` when leaving the state, including reentry
    pub fn on_exit(self, action: impl Fn(&mut C) + Send + 'static) -> Self {
        self.config.exit.push(Box::new(action));
        self
    }

    pub fn permit(mut self, trigger: T, destination: S) -> Self {
        self.push(trigger, Behaviour::Transition(destination), None);
        self
    }

    /// Permit the transition only while `guard` holds
    ///
    /// Several guarded rules may share a trigger; the first one whose guard
    /// passes is taken, in declaration order.
    pub fn permit_if(
        mut self,
        trigger: T,
        destination: S,
        guard: impl Fn(&C) -> bool + Send + 'static,
    ) -> Self {
        self.push(
            trigger,
            Behaviour::Transition(destination),
            Some(Box::new(guard)),
        );
        self
    }

    pub fn permit_reentry(mut self, trigger: T) -> Self {
        self.push(trigger, Behaviour::Reentry, None);
        self
    }

    pub fn permit_reentry_if(
        mut self,
        trigger: T,
        guard: impl Fn(&C) -> bool + Send + 'static,
    ) -> Self {
        self.push(trigger, Behaviour::Reentry, Some(Box::new(guard)));
        self
    }

    /// Accept `trigger` without running any action or hook
    pub fn ignore(mut self, trigger: T) -> Self {
        self.push(trigger, Behaviour::Ignore, None);
        self
    }

    fn push(&mut self, trigger: T, behaviour: Behaviour<S>, guard: Option<Guard<C>>) {
        self.config.rules.push(Rule {
            trigger,
            behaviour,
            guard,
        });
    }
}

/// A finite state machine over states `S`, triggers `T` and context `C`
pub struct StateMachine<S, T, C> {
    name: String,
    state: S,
    states: HashMap<S, StateConfig<S, T, C>>,
    completed: Vec<CompletionHook<S, T>>,
}

impl<S, T, C> StateMachine<S, T, C>
where
    S: Copy + Eq + Hash + Debug + Send + 'static,
    T: Copy + Eq + Debug,
{
    /// Create a machine starting in `initial`, with no persistence
    pub fn new(initial: S) -> Self {
        Self {
            name: String::new(),
            state: initial,
            states: HashMap::new(),
            completed: Vec::new(),
        }
    }

    /// Create a machine whose state comes from `loader` and is handed to
    /// `persister` after every completed transition
    pub fn with_storage(
        loader: impl FnOnce() -> S,
        persister: impl Fn(S) + Send + 'static,
    ) -> Self {
        let mut machine = Self::new(loader());
        machine.on_transition_completed(move |t| persister(t.destination));
        machine
    }

    /// Name used in log output, usually the owning entity id
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start (or continue) configuring `state`
    pub fn configure(&mut self, state: S) -> StateConfigurator<'_, S, T, C> {
        StateConfigurator {
            config: self.states.entry(state).or_default(),
        }
    }

    /// Register a hook run once per completed transition or reentry
    pub fn on_transition_completed(
        &mut self,
        hook: impl Fn(&Transition<S, T>) + Send + 'static,
    ) {
        self.completed.push(Box::new(hook));
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn is_in_state(&self, state: S) -> bool {
        self.state == state
    }

    /// Run the activation actions of the current state
    ///
    /// Used once after construction so the device matches the restored state.
    pub fn activate(&mut self, ctx: &mut C) {
        debug!(machine = %self.name, state = ?self.state, "Activating state machine");
        self.run_activate(self.state, ctx);
    }

    /// Fire `trigger` against the current state
    pub fn fire(&mut self, trigger: T, ctx: &mut C) -> Result<FireOutcome<S>, FsmError<S, T>> {
        let source = self.state;

        let mut declared = false;
        let mut chosen = None;
        if let Some(config) = self.states.get(&source) {
            for rule in config.rules.iter().filter(|r| r.trigger == trigger) {
                declared = true;
                if guard_passes(&self.name, rule.guard.as_ref(), ctx) {
                    chosen = Some(rule.behaviour);
                    break;
                }
            }
        }

        let behaviour = match chosen {
            Some(behaviour) => behaviour,
            None if declared => {
                debug!(machine = %self.name, state = ?source, trigger = ?trigger, "Trigger rejected by guard");
                return Ok(FireOutcome::Rejected);
            }
            None => {
                return Err(FsmError::InvalidTransition {
                    state: source,
                    trigger,
                })
            }
        };

        let destination = match behaviour {
            Behaviour::Ignore => {
                trace!(machine = %self.name, state = ?source, trigger = ?trigger, "Trigger ignored");
                return Ok(FireOutcome::Ignored);
            }
            Behaviour::Reentry => source,
            Behaviour::Transition(destination) => destination,
        };

        if let Some(config) = self.states.get(&source) {
            for action in &config.exit {
                action(ctx);
            }
        }

        self.state = destination;

        if let Some(config) = self.states.get(&destination) {
            for action in &config.entry {
                action(ctx);
            }
        }
        self.run_activate(destination, ctx);

        let transition = Transition {
            source,
            destination,
            trigger,
        };
        for hook in &self.completed {
            hook(&transition);
        }

        debug!(
            machine = %self.name,
            from = ?source,
            to = ?destination,
            trigger = ?trigger,
            "Transition completed"
        );

        Ok(match behaviour {
            Behaviour::Reentry => FireOutcome::Reentered(source),
            _ => FireOutcome::Transitioned {
                from: source,
                to: destination,
            },
        })
    }

    /// True if firing `trigger` now would not be rejected or invalid
    pub fn can_fire(&self, trigger: T, ctx: &C) -> bool {
        self.states
            .get(&self.state)
            .map(|config| {
                config
                    .rules
                    .iter()
                    .filter(|r| r.trigger == trigger)
                    .any(|r| guard_passes(&self.name, r.guard.as_ref(), ctx))
            })
            .unwrap_or(false)
    }

    /// Triggers that [`can_fire`](Self::can_fire) in the current state, in declaration order
    pub fn permitted_triggers(&self, ctx: &C) -> Vec<T> {
        let mut triggers: Vec<T> = Vec::new();
        if let Some(config) = self.states.get(&self.state) {
            for rule in &config.rules {
                if !triggers.contains(&rule.trigger)
                    && guard_passes(&self.name, rule.guard.as_ref(), ctx)
                {
                    triggers.push(rule.trigger);
                }
            }
        }
        triggers
    }

    /// True if any rule exists for `trigger` in `state`, regardless of guards
    pub fn is_declared(&self, state: S, trigger: T) -> bool {
        self.states
            .get(&state)
            .map(|config| config.rules.iter().any(|r| r.trigger == trigger))
            .unwrap_or(false)
    }

    fn run_activate(&self, state: S, ctx: &mut C) {
        if let Some(config) = self.states.get(&state) {
            for action in &config.activate {
                action(ctx);
            }
        }
    }
}

fn guard_passes<C>(machine: &str, guard: Option<&Guard<C>>, ctx: &C) -> bool {
    let Some(guard) = guard else {
        return true;
    };

    match catch_unwind(AssertUnwindSafe(|| guard(ctx))) {
        Ok(passed) => passed,
        Err(_) => {
            warn!(machine = %machine, "Guard panicked, treating as false");
            false
        }
    }
}
