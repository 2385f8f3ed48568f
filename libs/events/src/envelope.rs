//! The event enum and the envelope it travels in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yard_id::ContainerId;

use crate::{event_types, ContainerPayload, ContainerShippedPayload, EventError};

/// A committed change to a container, ready to be broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    Added(ContainerPayload),
    Updated(ContainerPayload),
    Assigned(ContainerPayload),
    Shipped(ContainerShippedPayload),
}

impl ContainerEvent {
    /// The wire name of this event (e.g. `containerAssigned`).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => event_types::CONTAINER_ADDED,
            Self::Updated(_) => event_types::CONTAINER_UPDATED,
            Self::Assigned(_) => event_types::CONTAINER_ASSIGNED,
            Self::Shipped(_) => event_types::CONTAINER_SHIPPED,
        }
    }

    /// The container the event is about.
    pub fn container_id(&self) -> ContainerId {
        match self {
            Self::Added(p) | Self::Updated(p) | Self::Assigned(p) => p.id,
            Self::Shipped(p) => p.id,
        }
    }

    /// Wraps the event for delivery, stamping it with the current time.
    pub fn to_envelope(&self) -> Result<EventEnvelope, EventError> {
        let data = match self {
            Self::Added(p) | Self::Updated(p) | Self::Assigned(p) => serde_json::to_value(p)?,
            Self::Shipped(p) => serde_json::to_value(p)?,
        };

        Ok(EventEnvelope {
            event: self.event_type().to_string(),
            data,
            occurred_at: Utc::now(),
        })
    }
}

/// What subscribers receive: `{"event": ..., "data": ..., "occurred_at": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event name, one of [`event_types`].
    pub event: String,

    /// Event payload.
    pub data: serde_json::Value,

    /// When the envelope was produced (after commit).
    pub occurred_at: DateTime<Utc>,
}
