//! In-process store.
//!
//! Units of work are serialized by a single writer mutex held from `begin`
//! until commit or drop. That is coarser than row locking but gives the same
//! guarantees: units never interleave, and an abandoned unit leaves the
//! tables untouched.
//!
//! A unit copies a row into its change set the first time it touches it and
//! writes only the change set back on commit, so its cost follows the rows it
//! touches rather than the size of the tables. Committed tables sit behind a
//! separate `RwLock` that plain reads take briefly, so lookups never wait for
//! an open unit of work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use yard_id::{ContainerId, ZoneId};

use super::{ContainerRegistry, Store, StoreError, StoreResult, UnitOfWork, ZoneLedger};
use crate::model::{Container, ContainerStatus, NewContainer, NewZone, Zone};

#[derive(Debug, Default)]
struct Tables {
    containers: HashMap<ContainerId, Container>,
    zones: HashMap<ZoneId, Zone>,
}

/// Store backed by process memory. State is lost on restart.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            writer: Arc::new(Mutex::new(())),
            lock_timeout,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let writer = tokio::time::timeout(self.lock_timeout, self.writer.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::Contention(format!(
                    "store busy for longer than {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;

        Ok(Box::new(MemoryUnitOfWork {
            _writer: writer,
            tables: self.tables.clone(),
            containers: HashMap::new(),
            zones: HashMap::new(),
        }))
    }

    async fn find_container(&self, id: ContainerId) -> StoreResult<Container> {
        self.tables
            .read()
            .await
            .containers
            .get(&id)
            .cloned()
            .ok_or(StoreError::ContainerNotFound(id))
    }

    async fn find_zone(&self, id: ZoneId) -> StoreResult<Zone> {
        self.tables
            .read()
            .await
            .zones
            .get(&id)
            .cloned()
            .ok_or(StoreError::ZoneNotFound(id))
    }

    async fn list_containers(&self) -> StoreResult<Vec<Container>> {
        let mut containers: Vec<_> = self.tables.read().await.containers.values().cloned().collect();
        containers.sort_by(|a, b| a.arrival_time.cmp(&b.arrival_time).then(a.id.cmp(&b.id)));
        Ok(containers)
    }

    async fn list_zones(&self) -> StoreResult<Vec<Zone>> {
        let mut zones: Vec<_> = self.tables.read().await.zones.values().cloned().collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(zones)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct MemoryUnitOfWork {
    _writer: OwnedMutexGuard<()>,
    tables: Arc<RwLock<Tables>>,
    // Rows this unit has read or written.
    containers: HashMap<ContainerId, Container>,
    zones: HashMap<ZoneId, Zone>,
}

impl MemoryUnitOfWork {
    async fn container_mut(&mut self, id: ContainerId) -> StoreResult<&mut Container> {
        if !self.containers.contains_key(&id) {
            let committed = self.tables.read().await.containers.get(&id).cloned();
            let container = committed.ok_or(StoreError::ContainerNotFound(id))?;
            self.containers.insert(id, container);
        }
        self.containers
            .get_mut(&id)
            .ok_or(StoreError::ContainerNotFound(id))
    }

    async fn zone_mut(&mut self, id: ZoneId) -> StoreResult<&mut Zone> {
        if !self.zones.contains_key(&id) {
            let committed = self.tables.read().await.zones.get(&id).cloned();
            let zone = committed.ok_or(StoreError::ZoneNotFound(id))?;
            self.zones.insert(id, zone);
        }
        self.zones.get_mut(&id).ok_or(StoreError::ZoneNotFound(id))
    }
}

#[async_trait]
impl ContainerRegistry for MemoryUnitOfWork {
    async fn create_container(&mut self, new: NewContainer) -> StoreResult<Container> {
        let container = Container::arrive(new, Utc::now());
        self.containers.insert(container.id, container.clone());
        Ok(container)
    }

    async fn container(&mut self, id: ContainerId) -> StoreResult<Container> {
        self.container_mut(id).await.map(|c| c.clone())
    }

    async fn set_status(
        &mut self,
        id: ContainerId,
        status: ContainerStatus,
    ) -> StoreResult<Container> {
        let container = self.container_mut(id).await?;
        container.status = status;
        Ok(container.clone())
    }

    async fn bind_zone(
        &mut self,
        id: ContainerId,
        zone_id: Option<ZoneId>,
    ) -> StoreResult<Container> {
        if let Some(zone_id) = zone_id {
            if self.zone_mut(zone_id).await.is_err() {
                return Err(StoreError::Storage(format!(
                    "container {id} cannot reference unknown zone {zone_id}"
                )));
            }
        }
        let container = self.container_mut(id).await?;
        container.zone_id = zone_id;
        Ok(container.clone())
    }
}

#[async_trait]
impl ZoneLedger for MemoryUnitOfWork {
    async fn create_zone(&mut self, new: NewZone) -> StoreResult<Zone> {
        if new.capacity <= 0 {
            return Err(StoreError::Storage(format!(
                "zone capacity must be positive, got {}",
                new.capacity
            )));
        }
        let zone = Zone::create(new);
        self.zones.insert(zone.id, zone.clone());
        Ok(zone)
    }

    async fn zone(&mut self, id: ZoneId) -> StoreResult<Zone> {
        self.zone_mut(id).await.map(|z| z.clone())
    }

    async fn increment_load(&mut self, id: ZoneId) -> StoreResult<Zone> {
        let zone = self.zone_mut(id).await?;
        if zone.current_load >= zone.capacity {
            return Err(StoreError::CapacityExceeded {
                zone_id: id,
                capacity: zone.capacity,
            });
        }
        zone.current_load += 1;
        Ok(zone.clone())
    }

    async fn decrement_load(&mut self, id: ZoneId) -> StoreResult<Zone> {
        let zone = self.zone_mut(id).await?;
        zone.current_load = (zone.current_load - 1).max(0);
        Ok(zone.clone())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork {
            _writer,
            tables,
            containers,
            zones,
        } = *self;

        let mut tables = tables.write().await;
        tables.containers.extend(containers);
        tables.zones.extend(zones);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
