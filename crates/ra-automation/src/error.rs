//! Automation errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Invalid automation configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown automation kind: {0}")]
    UnknownKind(String),

    #[error("Automation {0} is not part of this room")]
    NotInRoom(String),
}

/// Result type for automation operations
pub type AutomationResult<T> = Result<T, AutomationError>;
