//! yard API server
//!
//! Tracks containers and the storage zones that hold them, and serves the
//! REST API and live notification feed.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yard_api::{
    api,
    config::{self, StoreKind},
    notify::BroadcastNotifier,
    state::AppState,
    store::{MemoryStore, PgStore, Store},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to YARD_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting yard API");
    info!(
        listen_addr = %config.listen_addr,
        store = ?config.store,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Memory => {
            warn!("Using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new(config.lock_timeout))
        }
        StoreKind::Postgres => {
            let store = match PgStore::connect(&config.database, config.lock_timeout).await {
                Ok(store) => store,
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };

            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                if let Err(e) = store.migrate(&config.database.migrations_dir).await {
                    error!(error = %e, "Failed to run migrations");
                    return Err(e.into());
                }
            }

            Arc::new(store)
        }
    };

    let state = AppState::new(store, BroadcastNotifier::new(config.event_buffer));
    let app = api::create_router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });
    tokio::pin!(server_handle);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if tokio::time::timeout(shutdown_timeout, server_handle)
        .await
        .is_err()
    {
        warn!("HTTP server did not shut down in time");
    }

    info!("yard API shutdown complete");
    Ok(())
}
