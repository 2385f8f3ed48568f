//! HTTP API handlers and routing.

pub mod error;
mod health;
pub mod request_context;
mod v1;

use axum::{
    http::{header, HeaderName, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::state::AppState;
use request_context::{MakeYardRequestId, REQUEST_ID_HEADER};

/// Hand-maintained OpenAPI description of every route below.
pub const OPENAPI_YAML: &str = include_str!("../../openapi.yaml");

async fn openapi() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/yaml")], OPENAPI_YAML)
}

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(health::routes())
        .route("/openapi.yaml", get(openapi))
        .nest("/v1", v1::routes())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeYardRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(cors)
        .with_state(state)
}
