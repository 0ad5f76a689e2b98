//! Generic finite state machine engine
//!
//! The pieces every device automation is built from:
//!
//! - [`StateMachine`]: states, triggers, guarded transitions, entry/exit and
//!   activation actions, and completion hooks (used to persist state)
//! - [`Timer`]: single-shot cancellable delay with generation tokens
//! - [`FsmStorage`]: `{"State": ...}` records, one JSON file per machine
//! - [`schedule`]: time-of-day windows that wrap past midnight, and clocks

pub mod machine;
pub mod schedule;
pub mod storage;
pub mod timer;

pub use machine::{FireOutcome, FsmError, StateConfigurator, StateMachine, Transition};
pub use schedule::{
    is_after, is_before, is_within_window, Clock, MockClock, ScheduleWindow, SharedClock,
    SystemClock, TimeOfDay,
};
pub use storage::{FsmStorage, PersistedRecord, StorageError, StorageResult};
pub use timer::{Timer, TimerToken};
