//! Health check endpoints.
//!
//! These endpoints are used by load balancers and orchestration systems
//! to determine if the service is healthy and ready to receive traffic.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    pub service: String,

    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentHealth>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ComponentHealth {
    /// Container and zone store.
    pub store: ComponentStatus,

    /// Live notification feed.
    pub notifications: ComponentStatus,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ComponentStatus {
    /// Status: "ok" or "unavailable".
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

fn response(status: &str, components: Option<ComponentHealth>) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        service: "yard-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        components,
    }
}

/// Basic health check: 200 whenever the server is up. Dependencies are not
/// checked.
async fn healthz() -> impl IntoResponse {
    Json(response("ok", None))
}

/// Readiness check. Returns 503 while the store cannot be reached.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let store_result = state.store().health_check().await;
    let store_ok = store_result.is_ok();

    let components = ComponentHealth {
        store: ComponentStatus {
            status: if store_ok { "ok" } else { "unavailable" }.to_string(),
            message: store_result.err().map(|e| e.to_string()),
        },
        notifications: ComponentStatus {
            status: "ok".to_string(),
            message: Some(format!(
                "{} subscriber(s)",
                state.notifier().subscriber_count()
            )),
        },
    };

    let body = response(if store_ok { "ok" } else { "degraded" }, Some(components));

    if store_ok {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// Liveness check with an empty body.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
