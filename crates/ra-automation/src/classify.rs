//! User vs automation classification of state changes

use ra_core::{Context, EntityId, EntityState, StateChanged};

/// Who caused a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    /// A person, or a device reporting on its own (no acting identity)
    User,
    /// The service account the automations run under
    Automation,
}

impl Initiator {
    /// Classify a context against the configured service account
    pub fn of(context: &Context, service_account_id: Option<&str>) -> Self {
        match service_account_id {
            Some(account) if context.is_user(account) => Initiator::Automation,
            _ => Initiator::User,
        }
    }
}

/// A state-value change with its initiator
#[derive(Debug, Clone, Copy)]
pub struct Classified<'a> {
    pub entity_id: &'a EntityId,
    pub initiator: Initiator,
    pub value: &'a str,
    pub old_state: Option<&'a EntityState>,
}

/// Classify `event`, or `None` when the state value did not change
///
/// Attribute-only updates are dropped here. This is also what keeps the
/// echo of an automation's own command from re-triggering it forever: a
/// repeated "on" is not a change.
pub fn classify<'a>(
    event: &'a StateChanged,
    service_account_id: Option<&str>,
) -> Option<Classified<'a>> {
    if !event.is_value_change() {
        return None;
    }

    Some(Classified {
        entity_id: &event.entity_id,
        initiator: Initiator::of(&event.context, service_account_id),
        value: event.new_value()?,
        old_state: event.old_state.as_ref(),
    })
}
