//! Event bus for entity state changes
//!
//! The EventBus is the single fan-out point for `StateChanged` events. The
//! state store fires into it and every automation task holds its own
//! receiver, so a slow consumer only ever lags itself.

use ra_core::{Context, EntityId, EntityState, StateChanged};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to state changes
pub struct EventBus {
    sender: broadcast::Sender<StateChanged>,
    /// Number of events fired since creation
    fired: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            fired: AtomicU64::new(0),
        }
    }

    /// Subscribe to every state change
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        trace!(receivers = self.sender.receiver_count() + 1, "Subscribing to state changes");
        self.sender.subscribe()
    }

    /// Subscribe to changes of a fixed set of entities
    pub fn subscribe_entities(&self, entity_ids: Vec<EntityId>) -> EntityFilteredReceiver {
        EntityFilteredReceiver {
            rx: self.subscribe(),
            entity_ids,
        }
    }

    /// Fire a state change to all subscribers
    pub fn fire(&self, event: StateChanged) {
        debug!(
            entity_id = %event.entity_id,
            old = ?event.old_value(),
            new = ?event.new_value(),
            user_id = ?event.context.user_id,
            "Firing state_changed"
        );
        self.fired.fetch_add(1, Ordering::Relaxed);

        // No active receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Build and fire a state change
    pub fn fire_state_changed(
        &self,
        entity_id: EntityId,
        old_state: Option<EntityState>,
        new_state: Option<EntityState>,
        context: Context,
    ) {
        self.fire(StateChanged::new(entity_id, old_state, new_state, context));
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver that only yields events for a set of entities
pub struct EntityFilteredReceiver {
    rx: broadcast::Receiver<StateChanged>,
    entity_ids: Vec<EntityId>,
}

impl EntityFilteredReceiver {
    /// Receive the next event for one of the watched entities
    pub async fn recv(&mut self) -> Result<StateChanged, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.entity_ids.contains(&event.entity_id) {
                return Ok(event);
            }
        }
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
