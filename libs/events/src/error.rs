//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when encoding or decoding events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// A container status string is not one of `new`, `assigned`, `shipped`.
    #[error("unknown container status: {0}")]
    UnknownStatus(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
