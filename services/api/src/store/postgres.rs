//! Postgres store.
//!
//! Each unit of work is one transaction at the default READ COMMITTED level.
//! Every row the allocation path reads is taken with `FOR UPDATE`, so a second
//! transaction touching the same container or zone waits until the first
//! commits and then sees its writes. `lock_timeout` bounds those waits.
//! Plain lookups run on the pool outside any unit of work and never lock.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    migrate::Migrator,
    postgres::{PgPool, PgPoolOptions, PgRow},
    Postgres, Row, Transaction,
};
use tracing::info;
use yard_id::{ContainerId, ZoneId};

use super::{ContainerRegistry, Store, StoreError, StoreResult, UnitOfWork, ZoneLedger};
use crate::config::PostgresConfig;
use crate::model::{Container, ContainerStatus, NewContainer, NewZone, Zone};

const CONTAINER_COLUMNS: &str = "id, number, type, status, zone_id, arrival_time";
const ZONE_COLUMNS: &str = "id, name, type, capacity, current_load";

// SQLSTATE codes that mean "try again".
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Store backed by the `containers` and `zones` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Opens a connection pool sized by `config`.
    pub async fn connect(config: &PostgresConfig, lock_timeout: Duration) -> StoreResult<Self> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Storage(format!("failed to connect to database: {e}")))?;

        info!("Database connection pool established");
        Ok(Self::new(pool, lock_timeout))
    }

    /// Applies pending migrations from `dir`.
    pub async fn migrate(&self, dir: &Path) -> StoreResult<()> {
        let migrator = Migrator::new(dir).await.map_err(|e| {
            StoreError::Storage(format!("cannot load migrations from {}: {e}", dir.display()))
        })?;

        info!(migrations_dir = %dir.display(), "Running database migrations");
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))?;
        info!("Database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // SET does not take bind parameters; the value is an integer we format.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_container(&self, id: ContainerId) -> StoreResult<Container> {
        sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::ContainerNotFound(id))?
        .try_into()
    }

    async fn find_zone(&self, id: ZoneId) -> StoreResult<Zone> {
        sqlx::query_as::<_, ZoneRow>(&format!("SELECT {ZONE_COLUMNS} FROM zones WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::ZoneNotFound(id))?
            .try_into()
    }

    async fn list_containers(&self) -> StoreResult<Vec<Container>> {
        let rows = sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers ORDER BY arrival_time, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(Container::try_from).collect()
    }

    async fn list_zones(&self) -> StoreResult<Vec<Zone>> {
        let rows = sqlx::query_as::<_, ZoneRow>(&format!(
            "SELECT {ZONE_COLUMNS} FROM zones ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(Zone::try_from).collect()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ContainerRegistry for PgUnitOfWork {
    async fn create_container(&mut self, new: NewContainer) -> StoreResult<Container> {
        let container = Container::arrive(new, Utc::now());

        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            r#"
            INSERT INTO containers (id, number, type, status, zone_id, arrival_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CONTAINER_COLUMNS}
            "#
        ))
        .bind(container.id.to_string())
        .bind(&container.number)
        .bind(&container.kind)
        .bind(container.status.as_str())
        .bind(container.zone_id.map(|z| z.to_string()))
        .bind(container.arrival_time)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        row.try_into()
    }

    async fn container(&mut self, id: ContainerId) -> StoreResult<Container> {
        sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::ContainerNotFound(id))?
        .try_into()
    }

    async fn set_status(
        &mut self,
        id: ContainerId,
        status: ContainerStatus,
    ) -> StoreResult<Container> {
        sqlx::query_as::<_, ContainerRow>(&format!(
            "UPDATE containers SET status = $2 WHERE id = $1 RETURNING {CONTAINER_COLUMNS}"
        ))
        .bind(id.to_string())
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::ContainerNotFound(id))?
        .try_into()
    }

    async fn bind_zone(
        &mut self,
        id: ContainerId,
        zone_id: Option<ZoneId>,
    ) -> StoreResult<Container> {
        sqlx::query_as::<_, ContainerRow>(&format!(
            "UPDATE containers SET zone_id = $2 WHERE id = $1 RETURNING {CONTAINER_COLUMNS}"
        ))
        .bind(id.to_string())
        .bind(zone_id.map(|z| z.to_string()))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::ContainerNotFound(id))?
        .try_into()
    }
}

#[async_trait]
impl ZoneLedger for PgUnitOfWork {
    async fn create_zone(&mut self, new: NewZone) -> StoreResult<Zone> {
        let zone = Zone::create(new);

        sqlx::query_as::<_, ZoneRow>(&format!(
            r#"
            INSERT INTO zones (id, name, type, capacity, current_load)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING {ZONE_COLUMNS}
            "#
        ))
        .bind(zone.id.to_string())
        .bind(&zone.name)
        .bind(&zone.kind)
        .bind(zone.capacity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .try_into()
    }

    async fn zone(&mut self, id: ZoneId) -> StoreResult<Zone> {
        sqlx::query_as::<_, ZoneRow>(&format!(
            "SELECT {ZONE_COLUMNS} FROM zones WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::ZoneNotFound(id))?
        .try_into()
    }

    async fn increment_load(&mut self, id: ZoneId) -> StoreResult<Zone> {
        let updated = sqlx::query_as::<_, ZoneRow>(&format!(
            r#"
            UPDATE zones
            SET current_load = current_load + 1
            WHERE id = $1 AND current_load < capacity
            RETURNING {ZONE_COLUMNS}
            "#
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = updated {
            return row.try_into();
        }

        // Nothing updated: either the zone is full or it does not exist.
        let capacity: Option<i32> = sqlx::query_scalar("SELECT capacity FROM zones WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        match capacity {
            Some(capacity) => Err(StoreError::CapacityExceeded {
                zone_id: id,
                capacity,
            }),
            None => Err(StoreError::ZoneNotFound(id)),
        }
    }

    async fn decrement_load(&mut self, id: ZoneId) -> StoreResult<Zone> {
        sqlx::query_as::<_, ZoneRow>(&format!(
            r#"
            UPDATE zones
            SET current_load = GREATEST(current_load - 1, 0)
            WHERE id = $1
            RETURNING {ZONE_COLUMNS}
            "#
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::ZoneNotFound(id))?
        .try_into()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(map_sqlx)
    }
}

// =============================================================================
// Rows
// =============================================================================

struct ContainerRow {
    id: String,
    number: String,
    kind: String,
    status: String,
    zone_id: Option<String>,
    arrival_time: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ContainerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            number: row.try_get("number")?,
            kind: row.try_get("type")?,
            status: row.try_get("status")?,
            zone_id: row.try_get("zone_id")?,
            arrival_time: row.try_get("arrival_time")?,
        })
    }
}

impl TryFrom<ContainerRow> for Container {
    type Error = StoreError;

    fn try_from(row: ContainerRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            StoreError::Storage(format!("container {}: bad {field}: {e}", row.id))
        };

        Ok(Self {
            id: row
                .id
                .parse::<ContainerId>()
                .map_err(|e| corrupt("id", &e))?,
            status: row
                .status
                .parse::<ContainerStatus>()
                .map_err(|e| corrupt("status", &e))?,
            zone_id: row
                .zone_id
                .as_deref()
                .map(str::parse::<ZoneId>)
                .transpose()
                .map_err(|e| corrupt("zone_id", &e))?,
            number: row.number,
            kind: row.kind,
            arrival_time: row.arrival_time,
        })
    }
}

struct ZoneRow {
    id: String,
    name: String,
    kind: String,
    capacity: i32,
    current_load: i32,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ZoneRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: row.try_get("type")?,
            capacity: row.try_get("capacity")?,
            current_load: row.try_get("current_load")?,
        })
    }
}

impl TryFrom<ZoneRow> for Zone {
    type Error = StoreError;

    fn try_from(row: ZoneRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .parse::<ZoneId>()
            .map_err(|e| StoreError::Storage(format!("zone {}: bad id: {e}", row.id)))?;

        Ok(Self {
            id,
            name: row.name,
            kind: row.kind,
            capacity: row.capacity,
            current_load: row.current_load,
        })
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Contention("timed out waiting for a database connection".to_string())
        }
        sqlx::Error::Database(db)
            if matches!(
                db.code().as_deref(),
                Some(LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
            ) =>
        {
            StoreError::Contention(db.message().to_string())
        }
        _ => StoreError::Storage(err.to_string()),
    }
}
