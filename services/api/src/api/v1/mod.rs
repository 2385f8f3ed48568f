//! API v1 routes.

mod containers;
mod events;
mod zones;

use axum::Router;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/containers", containers::routes())
        .nest("/zones", zones::routes())
        .nest("/events", events::routes())
}

/// Parses a typed id from a path segment, answering 400 on failure.
fn parse_id<T: std::str::FromStr>(
    raw: &str,
    code: &'static str,
    what: &str,
    request_id: &str,
) -> Result<T, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::bad_request(code, format!("Invalid {what} ID format"))
            .with_request_id(request_id)
    })
}
