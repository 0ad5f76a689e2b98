//! Context type recording who caused a change

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Origin of a state change or service call
///
/// Every state change carries the context of the call that produced it. The
/// `user_id` is the acting identity: a person using a wall switch or the UI,
/// or the service account the automation itself runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Acting identity, absent for changes reported by the device itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Context this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a context with a fresh ULID and no acting identity
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: None,
            parent_id: None,
        }
    }

    /// Create a context acting on behalf of `user_id`
    pub fn with_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::new()
        }
    }

    /// Derive a child context that keeps the acting identity
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: self.user_id.clone(),
            parent_id: Some(self.id.clone()),
        }
    }

    /// True when the acting identity is exactly `user_id`
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
