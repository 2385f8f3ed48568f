//! Container API endpoints.
//!
//! Registration, lookup, shipping and the raw status override.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use yard_id::ContainerId;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::model::{Container, ContainerStatus};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_containers).post(create_container))
        .route("/{container_id}", get(get_container).patch(update_status))
        .route("/{container_id}/ship", post(ship_container))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateContainerRequest {
    /// External label; generated when absent.
    pub number: Option<String>,

    /// Classification; defaults to `type 1`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ListContainersResponse {
    pub items: Vec<Container>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /v1/containers
async fn list_containers(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .engine()
        .list_containers()
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(ListContainersResponse { items }))
}

/// GET /v1/containers/{container_id}
async fn get_container(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(container_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let container_id: ContainerId = parse_id(
        &container_id,
        "invalid_container_id",
        "container",
        &ctx.request_id,
    )?;

    let container = state
        .engine()
        .container(container_id)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(container))
}

/// Registers a container in status `new`. A request without a JSON content
/// type is treated as an empty body; a JSON body that does not parse is
/// refused.
///
/// POST /v1/containers
async fn create_container(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Option<Json<CreateContainerRequest>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body
        .map_err(|e| {
            ApiError::bad_request("invalid_body", e.body_text()).with_request_id(&ctx.request_id)
        })?
        .map(|Json(req)| req)
        .unwrap_or_default();

    let container = state
        .engine()
        .register(req.number, req.kind)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok((StatusCode::CREATED, Json(container)))
}

/// Overwrites the status without releasing or taking zone capacity.
///
/// PATCH /v1/containers/{container_id}
async fn update_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(container_id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let container_id: ContainerId = parse_id(
        &container_id,
        "invalid_container_id",
        "container",
        &ctx.request_id,
    )?;

    let Json(req) = body.map_err(|e| {
        ApiError::bad_request("invalid_body", e.body_text()).with_request_id(&ctx.request_id)
    })?;

    let status: ContainerStatus = req.status.parse().map_err(|_| {
        ApiError::bad_request(
            "invalid_status",
            format!("Unknown status {:?}; expected new, assigned or shipped", req.status),
        )
        .with_request_id(&ctx.request_id)
    })?;

    let container = state
        .engine()
        .update_status_raw(container_id, status)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(container))
}

/// POST /v1/containers/{container_id}/ship
async fn ship_container(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(container_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let container_id: ContainerId = parse_id(
        &container_id,
        "invalid_container_id",
        "container",
        &ctx.request_id,
    )?;

    let result = state
        .engine()
        .ship(container_id)
        .await
        .map_err(|e| ApiError::from_allocation(e, &ctx.request_id))?;

    Ok(Json(result))
}
