//! Container and zone records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yard_events::ContainerPayload;
use yard_id::{ContainerId, ZoneId};

pub use yard_events::ContainerStatus;

/// Classification given to containers registered without one.
pub const DEFAULT_CONTAINER_TYPE: &str = "type 1";

/// A tracked physical container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub number: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ContainerStatus,
    pub zone_id: Option<ZoneId>,
    pub arrival_time: DateTime<Utc>,
}

impl Container {
    /// Builds the record for a newly arriving container.
    pub fn arrive(new: NewContainer, arrival_time: DateTime<Utc>) -> Self {
        let id = ContainerId::new();
        let number = new.number.unwrap_or_else(|| generate_number(&id));
        Self {
            id,
            number,
            kind: new
                .kind
                .unwrap_or_else(|| DEFAULT_CONTAINER_TYPE.to_string()),
            status: new.status.unwrap_or(ContainerStatus::New),
            zone_id: None,
            arrival_time,
        }
    }
}

impl From<&Container> for ContainerPayload {
    fn from(c: &Container) -> Self {
        Self {
            id: c.id,
            number: c.number.clone(),
            kind: c.kind.clone(),
            status: c.status,
            zone_id: c.zone_id,
            arrival_time: c.arrival_time,
        }
    }
}

/// Input for registering a container.
#[derive(Debug, Clone, Default)]
pub struct NewContainer {
    pub number: Option<String>,
    pub kind: Option<String>,
    pub status: Option<ContainerStatus>,
}

impl NewContainer {
    /// Blank labels count as absent.
    pub fn new(number: Option<String>, kind: Option<String>) -> Self {
        Self {
            number: non_blank(number),
            kind: non_blank(kind),
            status: None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `C-<unix millis>-<last four ULID chars>`; the suffix keeps labels minted in
/// the same millisecond apart.
fn generate_number(id: &ContainerId) -> String {
    let ulid = id.ulid().to_string();
    let suffix = &ulid[ulid.len() - 4..];
    format!("C-{}-{suffix}", id.timestamp_ms())
}

/// A bounded-capacity storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub capacity: i32,
    pub current_load: i32,
}

impl Zone {
    pub fn create(new: NewZone) -> Self {
        Self {
            id: ZoneId::new(),
            name: new.name,
            kind: new.kind,
            capacity: new.capacity,
            current_load: 0,
        }
    }

    pub fn free_slots(&self) -> i32 {
        (self.capacity - self.current_load).max(0)
    }
}

/// Input for creating a zone.
#[derive(Debug, Clone)]
pub struct NewZone {
    pub name: String,
    pub kind: String,
    pub capacity: i32,
}
