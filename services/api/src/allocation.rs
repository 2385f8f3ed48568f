//! Allocation engine.
//!
//! The only component that touches containers and zones together. Every
//! public operation runs in one [`UnitOfWork`], so after each commit:
//!
//! - `0 <= current_load <= capacity` for every zone
//! - a zone's `current_load` equals the number of `assigned` containers bound
//!   to it
//! - a container has a zone exactly when it is `assigned`
//! - `shipped` is final
//!
//! [`AllocationEngine::update_status_raw`] is the one exception: it rewrites a
//! status without touching zones, for operators repairing data by hand.
//!
//! Lock order is always the container first, then zones by ascending id.
//! Notifications go out only after a successful commit.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use yard_events::{ContainerEvent, ContainerShippedPayload};
use yard_id::{ContainerId, ZoneId};

use crate::model::{Container, ContainerStatus, NewContainer, NewZone, Zone};
use crate::notify::EventPublisher;
use crate::store::{Store, StoreError, UnitOfWork};

/// Errors returned by the allocation engine.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("container {0} not found")]
    ContainerNotFound(ContainerId),

    #[error("zone {0} not found")]
    ZoneNotFound(ZoneId),

    /// The operation is not legal from the container's current status.
    #[error("cannot {operation} container {container_id} in status {status}")]
    InvalidTransition {
        container_id: ContainerId,
        status: ContainerStatus,
        operation: &'static str,
    },

    /// Accepting the container would push the zone past its capacity.
    #[error("zone {zone_id} is overloaded (capacity {capacity})")]
    ZoneOverloaded { zone_id: ZoneId, capacity: i32 },

    #[error("invalid zone capacity {0}: must be positive")]
    InvalidCapacity(i32),

    /// Locks could not be taken in time. Nothing was changed; retry.
    #[error("contention: {0}")]
    Contention(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl AllocationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::Contention(_))
    }
}

impl From<StoreError> for AllocationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ContainerNotFound(id) => Self::ContainerNotFound(id),
            StoreError::ZoneNotFound(id) => Self::ZoneNotFound(id),
            StoreError::CapacityExceeded { zone_id, capacity } => {
                Self::ZoneOverloaded { zone_id, capacity }
            }
            StoreError::Contention(msg) => Self::Contention(msg),
            StoreError::Storage(msg) => Self::StorageFailure(msg),
        }
    }
}

/// Outcome of [`AllocationEngine::assign`].
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResult {
    pub container: Container,
    /// The target zone after the assignment.
    pub zone: Zone,
    /// The zone the container was moved out of, after releasing it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_zone: Option<Zone>,
}

/// Outcome of [`AllocationEngine::ship`].
#[derive(Debug, Clone, Serialize)]
pub struct ShipResult {
    pub container_id: ContainerId,
    pub container: Container,
    /// The zone the container left, after releasing it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_zone: Option<Zone>,
    /// True when the container had already shipped and nothing changed.
    pub already_shipped: bool,
}

/// Coordinates the container registry and zone ledger.
#[derive(Clone)]
pub struct AllocationEngine {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Registers a container in status `new`.
    pub async fn register(
        &self,
        number: Option<String>,
        kind: Option<String>,
    ) -> Result<Container, AllocationError> {
        let mut uow = self.store.begin().await?;
        let container = uow.create_container(NewContainer::new(number, kind)).await?;
        uow.commit().await?;

        info!(
            container_id = %container.id,
            number = %container.number,
            "Container registered"
        );
        self.publisher
            .publish(ContainerEvent::Added((&container).into()));

        Ok(container)
    }

    /// Creates an empty zone. Administrative; emits no notification.
    pub async fn create_zone(
        &self,
        name: String,
        kind: String,
        capacity: i32,
    ) -> Result<Zone, AllocationError> {
        if capacity <= 0 {
            return Err(AllocationError::InvalidCapacity(capacity));
        }

        let mut uow = self.store.begin().await?;
        let zone = uow
            .create_zone(NewZone {
                name,
                kind,
                capacity,
            })
            .await?;
        uow.commit().await?;

        info!(zone_id = %zone.id, name = %zone.name, capacity, "Zone created");
        Ok(zone)
    }

    /// Places a container into a zone, moving it out of its current zone if
    /// it has one.
    ///
    /// The capacity check and the increment are one step against the store,
    /// so when several requests race for a zone's last slot exactly one wins
    /// and the rest get [`AllocationError::ZoneOverloaded`]. A failed
    /// assignment leaves the container in the zone it started in.
    pub async fn assign(
        &self,
        container_id: ContainerId,
        zone_id: ZoneId,
    ) -> Result<AssignmentResult, AllocationError> {
        let mut uow = self.store.begin().await?;

        let container = uow.container(container_id).await?;
        let previous = container.zone_id.filter(|id| *id != zone_id);

        let mut target = None;
        let mut source = None;
        for id in lock_order(zone_id, previous) {
            match uow.zone(id).await {
                Ok(zone) if id == zone_id => target = Some(zone),
                Ok(zone) => source = Some(zone),
                Err(StoreError::ZoneNotFound(missing)) if missing != zone_id => {
                    warn!(
                        container_id = %container_id,
                        zone_id = %missing,
                        "Container bound to a zone that no longer exists"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        let Some(target) = target else {
            return Err(AllocationError::ZoneNotFound(zone_id));
        };

        if container.status.is_terminal() {
            uow.rollback().await?;
            return Err(AllocationError::InvalidTransition {
                container_id,
                status: container.status,
                operation: "assign",
            });
        }

        if container.zone_id == Some(zone_id) {
            return self.confirm_assignment(uow, container, target).await;
        }

        let released_zone = match source {
            Some(zone) => Some(uow.decrement_load(zone.id).await?),
            None => None,
        };

        let zone = match uow.increment_load(zone_id).await {
            Ok(zone) => zone,
            Err(StoreError::CapacityExceeded { zone_id, capacity }) => {
                uow.rollback().await?;
                info!(
                    container_id = %container_id,
                    zone_id = %zone_id,
                    capacity,
                    "Zone overloaded, assignment refused"
                );
                return Err(AllocationError::ZoneOverloaded { zone_id, capacity });
            }
            Err(e) => return Err(e.into()),
        };

        uow.set_status(container_id, ContainerStatus::Assigned)
            .await?;
        let container = uow.bind_zone(container_id, Some(zone_id)).await?;
        uow.commit().await?;

        info!(
            container_id = %container_id,
            zone_id = %zone_id,
            released_from = ?released_zone.as_ref().map(|z| z.id.to_string()),
            load = zone.current_load,
            capacity = zone.capacity,
            free_slots = zone.free_slots(),
            "Container assigned"
        );
        self.publisher
            .publish(ContainerEvent::Assigned((&container).into()));

        Ok(AssignmentResult {
            container,
            zone,
            released_zone,
        })
    }

    /// The container is already bound to the target zone, so its slot is
    /// already counted. Only the status may need repairing.
    async fn confirm_assignment(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        container: Container,
        zone: Zone,
    ) -> Result<AssignmentResult, AllocationError> {
        if container.status == ContainerStatus::Assigned {
            uow.rollback().await?;
            return Ok(AssignmentResult {
                container,
                zone,
                released_zone: None,
            });
        }

        let container = uow
            .set_status(container.id, ContainerStatus::Assigned)
            .await?;
        uow.commit().await?;

        info!(
            container_id = %container.id,
            zone_id = %zone.id,
            "Container status restored to assigned"
        );
        self.publisher
            .publish(ContainerEvent::Assigned((&container).into()));

        Ok(AssignmentResult {
            container,
            zone,
            released_zone: None,
        })
    }

    /// Marks a container shipped and frees its slot. Shipping twice is a
    /// no-op.
    pub async fn ship(&self, container_id: ContainerId) -> Result<ShipResult, AllocationError> {
        let mut uow = self.store.begin().await?;

        let container = uow.container(container_id).await?;
        if container.status == ContainerStatus::Shipped {
            uow.rollback().await?;
            return Ok(ShipResult {
                container_id,
                container,
                released_zone: None,
                already_shipped: true,
            });
        }

        let released_zone = match container.zone_id {
            Some(zone_id) => match uow.decrement_load(zone_id).await {
                Ok(zone) => Some(zone),
                Err(StoreError::ZoneNotFound(_)) => {
                    warn!(
                        container_id = %container_id,
                        zone_id = %zone_id,
                        "Shipping container bound to a zone that no longer exists"
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        uow.set_status(container_id, ContainerStatus::Shipped)
            .await?;
        let container = uow.bind_zone(container_id, None).await?;
        uow.commit().await?;

        info!(
            container_id = %container_id,
            released_from = ?released_zone.as_ref().map(|z| z.id.to_string()),
            "Container shipped"
        );
        self.publisher
            .publish(ContainerEvent::Shipped(ContainerShippedPayload {
                id: container_id,
            }));

        Ok(ShipResult {
            container_id,
            container,
            released_zone,
            already_shipped: false,
        })
    }

    /// Operator override: overwrites the status and nothing else.
    ///
    /// This bypasses zone bookkeeping. Marking an `assigned` container
    /// `shipped` here leaves its zone's load counting it, and marking a `new`
    /// container `assigned` leaves it without a zone. Use [`Self::assign`] and
    /// [`Self::ship`] for anything but repairs.
    pub async fn update_status_raw(
        &self,
        container_id: ContainerId,
        status: ContainerStatus,
    ) -> Result<Container, AllocationError> {
        let mut uow = self.store.begin().await?;
        let before = uow.container(container_id).await?;
        let container = uow.set_status(container_id, status).await?;
        uow.commit().await?;

        warn!(
            container_id = %container_id,
            from = %before.status,
            to = %status,
            zone_id = ?container.zone_id.map(|z| z.to_string()),
            "Container status overridden without zone bookkeeping"
        );
        self.publisher
            .publish(ContainerEvent::Updated((&container).into()));

        Ok(container)
    }

    /// Last committed state of a container. Does not wait on in-flight
    /// assignments.
    pub async fn container(&self, id: ContainerId) -> Result<Container, AllocationError> {
        Ok(self.store.find_container(id).await?)
    }

    /// Last committed state of a zone. Does not wait on in-flight
    /// assignments.
    pub async fn zone(&self, id: ZoneId) -> Result<Zone, AllocationError> {
        Ok(self.store.find_zone(id).await?)
    }

    pub async fn list_containers(&self) -> Result<Vec<Container>, AllocationError> {
        Ok(self.store.list_containers().await?)
    }

    pub async fn list_zones(&self) -> Result<Vec<Zone>, AllocationError> {
        Ok(self.store.list_zones().await?)
    }
}

/// Zones are always locked in ascending id order so two crossing
/// reassignments cannot deadlock.
fn lock_order(target: ZoneId, previous: Option<ZoneId>) -> Vec<ZoneId> {
    let mut ids: Vec<ZoneId> = std::iter::once(target).chain(previous).collect();
    ids.sort();
    ids
}
