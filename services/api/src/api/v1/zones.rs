//! Zone API endpoints.
//!
//! Zones are created administratively; their load only changes through
//! `POST /v1/zones/{zone_id}/assign` and container shipping.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use yard_id::{ContainerId, ZoneId};

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::model::Zone;
use crate::state::AppState;

/// Classification given to zones created without one.
const DEFAULT_ZONE_TYPE: &str = "general";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_zones).post(create_zone))
        .route("/{zone_id}", get(get_zone))
        .route("/{zone_id}/assign", post(assign_container))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Maximum simultaneous containers; must be positive.
    pub capacity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub container_id: String,
}

#[derive(Debug, Serialize)]
pub struct ListZonesResponse {
    pub items: Vec<Zone>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /v1/zones
async fn list_zones(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .engine()
        .list_zones()
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(ListZonesResponse { items }))
}

/// GET /v1/zones/{zone_id}
async fn get_zone(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(zone_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let zone_id: ZoneId = parse_id(&zone_id, "invalid_zone_id", "zone", &ctx.request_id)?;

    let zone = state
        .engine()
        .zone(zone_id)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(zone))
}

/// POST /v1/zones
async fn create_zone(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<CreateZoneRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|e| {
        ApiError::bad_request("invalid_body", e.body_text()).with_request_id(&ctx.request_id)
    })?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(
            ApiError::bad_request("invalid_name", "Zone name cannot be empty")
                .with_request_id(&ctx.request_id),
        );
    }

    let kind = req
        .kind
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| DEFAULT_ZONE_TYPE.to_string());

    let zone = state
        .engine()
        .create_zone(name, kind, req.capacity)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok((StatusCode::CREATED, Json(zone)))
}

/// Places a container into this zone, moving it out of its current one.
///
/// POST /v1/zones/{zone_id}/assign
async fn assign_container(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(zone_id): Path<String>,
    body: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let zone_id: ZoneId = parse_id(&zone_id, "invalid_zone_id", "zone", &ctx.request_id)?;

    let Json(req) = body.map_err(|e| {
        ApiError::bad_request("invalid_body", e.body_text()).with_request_id(&ctx.request_id)
    })?;

    let container_id: ContainerId = parse_id(
        &req.container_id,
        "invalid_container_id",
        "container",
        &ctx.request_id,
    )?;

    let result = state
        .engine()
        .assign(container_id, zone_id)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(result))
}
