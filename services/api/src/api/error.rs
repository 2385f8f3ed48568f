use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::allocation::AllocationError;

/// RFC 7807 error body.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
    pub retry_after_seconds: u32,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://yard.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
            retry_after_seconds: 0,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }

    fn set_retry_after_seconds(&mut self, seconds: u32) {
        self.retry_after_seconds = seconds;
        if seconds > 0 {
            self.retryable = true;
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }

    pub fn with_retry_after_seconds(mut self, seconds: u32) -> Self {
        self.problem.set_retry_after_seconds(seconds);
        self
    }

    /// Maps an engine failure to its HTTP shape. Storage failures are logged
    /// here and reported without their internals. Retryable failures carry a
    /// one second `retry_after_seconds` hint.
    pub fn from_allocation(err: AllocationError, request_id: &str) -> Self {
        let retryable = err.is_retryable();
        let mut api_error = match &err {
            AllocationError::ContainerNotFound(_) => {
                Self::not_found("container_not_found", err.to_string())
            }
            AllocationError::ZoneNotFound(_) => Self::not_found("zone_not_found", err.to_string()),
            AllocationError::ZoneOverloaded { .. } => {
                Self::bad_request("zone_overloaded", err.to_string())
            }
            AllocationError::InvalidTransition { .. } => {
                Self::conflict("invalid_transition", err.to_string())
            }
            AllocationError::InvalidCapacity(_) => {
                Self::bad_request("invalid_capacity", err.to_string())
            }
            AllocationError::Contention(_) => {
                Self::service_unavailable("contention", "The resource is busy; retry shortly")
            }
            AllocationError::StorageFailure(_) => {
                tracing::error!(error = %err, request_id = %request_id, "Storage failure");
                Self::internal("internal_error", "Internal server error")
            }
        };
        if retryable {
            api_error = api_error.with_retry_after_seconds(1);
        }
        api_error.with_request_id(request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use yard_id::{ContainerId, ZoneId};

    use crate::model::ContainerStatus;

    #[rstest]
    #[case(AllocationError::ContainerNotFound(ContainerId::new()), 404, "container_not_found")]
    #[case(AllocationError::ZoneNotFound(ZoneId::new()), 404, "zone_not_found")]
    #[case(
        AllocationError::ZoneOverloaded { zone_id: ZoneId::new(), capacity: 1 },
        400,
        "zone_overloaded"
    )]
    #[case(
        AllocationError::InvalidTransition {
            container_id: ContainerId::new(),
            status: ContainerStatus::Shipped,
            operation: "assign",
        },
        409,
        "invalid_transition"
    )]
    #[case(AllocationError::InvalidCapacity(0), 400, "invalid_capacity")]
    #[case(AllocationError::Contention("busy".into()), 503, "contention")]
    #[case(AllocationError::StorageFailure("disk".into()), 500, "internal_error")]
    fn test_allocation_error_mapping(
        #[case] err: AllocationError,
        #[case] status: u16,
        #[case] code: &str,
    ) {
        let api = ApiError::from_allocation(err, "req_1");
        assert_eq!(api.status.as_u16(), status);
        assert_eq!(api.problem.code, code);
        assert_eq!(api.problem.request_id, "req_1");
    }

    #[test]
    fn test_contention_is_retryable() {
        let api = ApiError::from_allocation(AllocationError::Contention("busy".into()), "r");
        assert!(api.problem.retryable);
        assert_eq!(api.problem.retry_after_seconds, 1);
    }

    #[test]
    fn test_storage_failure_hides_internals() {
        let api = ApiError::from_allocation(
            AllocationError::StorageFailure("password=hunter2".into()),
            "r",
        );
        assert!(!api.problem.detail.contains("hunter2"));
        assert!(!api.problem.retryable);
    }

    #[tokio::test]
    async fn test_problem_content_type() {
        let response = ApiError::not_found("zone_not_found", "nope").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
