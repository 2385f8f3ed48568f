use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Which backend holds containers and zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => bail!("unknown store kind {other:?} (expected postgres or memory)"),
        }
    }
}

/// Connection pool and schema settings for the Postgres store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Directory holding the sqlx migration files.
    pub migrations_dir: PathBuf,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/yard".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            migrations_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations")),
        }
    }
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(v) => v.parse().context("DB_MAX_CONNECTIONS")?,
            Err(_) => defaults.max_connections,
        };

        let min_connections = match std::env::var("DB_MIN_CONNECTIONS") {
            Ok(v) => v.parse().context("DB_MIN_CONNECTIONS")?,
            Err(_) => defaults.min_connections,
        };

        let migrations_dir = std::env::var("YARD_MIGRATIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.migrations_dir);

        Ok(Self {
            database_url,
            max_connections,
            min_connections,
            migrations_dir,
            ..defaults
        })
    }
}

/// Parses `YARD_LOCK_TIMEOUT_MS`. Zero is refused because Postgres reads a
/// zero `lock_timeout` as "wait forever".
fn parse_lock_timeout(raw: &str) -> Result<Duration> {
    let ms: u64 = raw.trim().parse().context("YARD_LOCK_TIMEOUT_MS")?;
    if ms == 0 {
        bail!("YARD_LOCK_TIMEOUT_MS must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub store: StoreKind,
    pub lock_timeout: Duration,
    pub event_buffer: usize,
    pub database: PostgresConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("YARD_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .context("YARD_LISTEN_ADDR")?;

        let log_level = std::env::var("YARD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("YARD_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let store = match std::env::var("YARD_STORE") {
            Ok(v) => v.parse()?,
            Err(_) => StoreKind::Postgres,
        };

        let lock_timeout = match std::env::var("YARD_LOCK_TIMEOUT_MS") {
            Ok(v) => parse_lock_timeout(&v)?,
            Err(_) => Duration::from_millis(5_000),
        };

        let event_buffer = match std::env::var("YARD_EVENT_BUFFER") {
            Ok(v) => v.parse().context("YARD_EVENT_BUFFER")?,
            Err(_) => 256,
        };

        let database = PostgresConfig::from_env()?;

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            store,
            lock_timeout,
            event_buffer,
            database,
        })
    }
}
