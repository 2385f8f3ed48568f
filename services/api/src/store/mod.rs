//! Storage for containers and zones.
//!
//! All mutation happens inside a [`UnitOfWork`]: an isolated transaction that
//! holds exclusive locks on every container and zone it reads until it is
//! committed or dropped. Dropping a unit of work without committing discards
//! every write it staged, so a cancelled request leaves no trace.
//!
//! Two backends implement the contract:
//! - [`PgStore`] - Postgres transactions with `SELECT ... FOR UPDATE` row locks
//! - [`MemoryStore`] - one async mutex over the tables (dev mode and tests)
//!
//! Plain reads (`find_*`, `list_*`) go around units of work and see the last
//! committed state.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use yard_id::{ContainerId, ZoneId};

use crate::model::{Container, ContainerStatus, NewContainer, NewZone, Zone};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by store primitives.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container {0} not found")]
    ContainerNotFound(ContainerId),

    #[error("zone {0} not found")]
    ZoneNotFound(ZoneId),

    /// The increment would push the zone past its capacity; nothing changed.
    #[error("zone {zone_id} is at capacity ({capacity})")]
    CapacityExceeded { zone_id: ZoneId, capacity: i32 },

    /// Locks could not be acquired in time, or the backend aborted the
    /// transaction to resolve a conflict. Retrying is safe.
    #[error("contention: {0}")]
    Contention(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Owns container records.
///
/// Reads lock the row for the rest of the unit of work. None of these
/// primitives look at zone occupancy; keeping a container's zone binding and
/// its status consistent is the caller's job.
#[async_trait]
pub trait ContainerRegistry: Send {
    /// Inserts a new container, generating its id, number and arrival time.
    async fn create_container(&mut self, new: NewContainer) -> StoreResult<Container>;

    /// Loads and locks a container.
    async fn container(&mut self, id: ContainerId) -> StoreResult<Container>;

    async fn set_status(
        &mut self,
        id: ContainerId,
        status: ContainerStatus,
    ) -> StoreResult<Container>;

    async fn bind_zone(&mut self, id: ContainerId, zone_id: Option<ZoneId>)
        -> StoreResult<Container>;
}

/// Owns zone capacity and occupancy counters.
#[async_trait]
pub trait ZoneLedger: Send {
    async fn create_zone(&mut self, new: NewZone) -> StoreResult<Zone>;

    /// Loads and locks a zone.
    async fn zone(&mut self, id: ZoneId) -> StoreResult<Zone>;

    /// Adds one to `current_load` only if the result stays within `capacity`,
    /// failing with [`StoreError::CapacityExceeded`] otherwise. Check and
    /// increment are a single step.
    async fn increment_load(&mut self, id: ZoneId) -> StoreResult<Zone>;

    /// Subtracts one from `current_load`, never going below zero.
    async fn decrement_load(&mut self, id: ZoneId) -> StoreResult<Zone>;
}

/// An isolated, all-or-nothing transaction over both registries.
#[async_trait]
pub trait UnitOfWork: ContainerRegistry + ZoneLedger {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Entry point to a storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a unit of work. Lock waits inside it are bounded by the store's
    /// lock timeout and surface as [`StoreError::Contention`].
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Reads one committed container without locking it.
    async fn find_container(&self, id: ContainerId) -> StoreResult<Container>;

    /// Reads one committed zone without locking it.
    async fn find_zone(&self, id: ZoneId) -> StoreResult<Zone>;

    /// Every container, oldest arrival first. Takes no locks.
    async fn list_containers(&self) -> StoreResult<Vec<Container>>;

    /// Every zone, by name. Takes no locks.
    async fn list_zones(&self) -> StoreResult<Vec<Zone>>;

    async fn health_check(&self) -> StoreResult<()>;
}
