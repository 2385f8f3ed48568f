//! Request-scoped context extracted from HTTP requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId as HeaderRequestId};
use yard_id::RequestId;

use crate::api::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, REQUEST_ID_HEADER)
            .unwrap_or_else(|| RequestId::new().to_string());

        Ok(Self { request_id })
    }
}

/// Mints `req_<ulid>` ids for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeYardRequestId;

impl MakeRequestId for MakeYardRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<HeaderRequestId> {
        HeaderValue::from_str(&RequestId::new().to_string())
            .ok()
            .map(HeaderRequestId::new)
    }
}
