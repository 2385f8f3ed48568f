//! Event names, the container status enum, and event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yard_id::{ContainerId, ZoneId};

use crate::EventError;

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event names as constants.
pub mod event_types {
    pub const CONTAINER_ADDED: &str = "containerAdded";
    pub const CONTAINER_UPDATED: &str = "containerUpdated";
    pub const CONTAINER_ASSIGNED: &str = "containerAssigned";
    pub const CONTAINER_SHIPPED: &str = "containerShipped";
}

// =============================================================================
// Status Enums
// =============================================================================

/// Container lifecycle status.
///
/// The normal path only ever moves forward: `new -> assigned -> shipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    New,
    Assigned,
    Shipped,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Assigned => "assigned",
            Self::Shipped => "shipped",
        }
    }

    /// Whether the status admits no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Shipped)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "assigned" => Ok(Self::Assigned),
            "shipped" => Ok(Self::Shipped),
            other => Err(EventError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Full container record carried by `containerAdded`, `containerUpdated` and
/// `containerAssigned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPayload {
    pub id: ContainerId,
    pub number: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ContainerStatus,
    pub zone_id: Option<ZoneId>,
    pub arrival_time: DateTime<Utc>,
}

/// Payload of `containerShipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerShippedPayload {
    pub id: ContainerId,
}
