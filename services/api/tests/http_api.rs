//! HTTP gateway tests.
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` over the
//! in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rstest::rstest;
use serde_json::{json, Value};
use tower::ServiceExt;
use yard_api::{api, notify::BroadcastNotifier, state::AppState, store::MemoryStore};

fn app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();

    let state = AppState::new(Arc::new(MemoryStore::default()), BroadcastNotifier::new(64));
    api::create_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, _headers, body) = send_raw(app, method, uri, body, None).await;
    (status, body)
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    request_id: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = request_id {
        builder = builder.header("x-request-id", id);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

/// Sends `body` verbatim and returns the undecoded response.
async fn send_bytes(
    app: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: &'static str,
) -> (StatusCode, axum::http::HeaderMap, axum::body::Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    let request = builder.body(Body::from(body)).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes)
}

async fn create_zone(app: &Router, name: &str, capacity: i32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/v1/zones",
        Some(json!({ "name": name, "type": "dry", "capacity": capacity })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_container(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/v1/containers", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn assign(app: &Router, zone_id: &str, container_id: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/v1/zones/{zone_id}/assign"),
        Some(json!({ "containerId": container_id })),
    )
    .await
}

#[tokio::test]
async fn create_container_defaults() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/v1/containers", None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "new");
    assert_eq!(body["type"], "type 1");
    assert!(body["zone_id"].is_null());
    assert!(body["id"].as_str().unwrap().starts_with("ctr_"));
    assert!(body["number"].as_str().unwrap().starts_with("C-"));
}

#[tokio::test]
async fn capacity_one_walkthrough() {
    let app = app();
    let z1 = create_zone(&app, "Z1", 1).await;
    let c5 = create_container(&app).await;
    let c7 = create_container(&app).await;

    let (status, body) = assign(&app, &z1, &c5).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["zone"]["current_load"], 1);
    assert_eq!(body["container"]["status"], "assigned");

    let (status, body) = assign(&app, &z1, &c7).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "zone_overloaded");

    let (status, body) = send(&app, Method::GET, &format!("/v1/zones/{z1}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_load"], 1);

    let (status, body) = send(&app, Method::POST, &format!("/v1/containers/{c5}/ship"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released_zone"]["current_load"], 0);
    assert_eq!(body["already_shipped"], false);

    let (status, _) = assign(&app, &z1, &c7).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn shipped_container_cannot_be_assigned() {
    let app = app();
    let zone = create_zone(&app, "A", 2).await;
    let c = create_container(&app).await;
    send(&app, Method::POST, &format!("/v1/containers/{c}/ship"), None).await;

    let (status, body) = assign(&app, &zone, &c).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn raw_status_patch() {
    let app = app();
    let c = create_container(&app).await;

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/v1/containers/{c}"),
        Some(json!({ "status": "shipped" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "shipped");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/v1/containers/{c}"),
        Some(json!({ "status": "lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_status");
}

#[rstest]
#[case::bad_container_id(Method::GET, "/v1/containers/not-an-id", StatusCode::BAD_REQUEST, "invalid_container_id")]
#[case::wrong_prefix(Method::GET, "/v1/containers/zone_01ARZ3NDEKTSV4RRFFQ69G5FAV", StatusCode::BAD_REQUEST, "invalid_container_id")]
#[case::missing_container(Method::GET, "/v1/containers/ctr_01ARZ3NDEKTSV4RRFFQ69G5FAV", StatusCode::NOT_FOUND, "container_not_found")]
#[case::missing_zone(Method::GET, "/v1/zones/zone_01ARZ3NDEKTSV4RRFFQ69G5FAV", StatusCode::NOT_FOUND, "zone_not_found")]
#[case::ship_missing(Method::POST, "/v1/containers/ctr_01ARZ3NDEKTSV4RRFFQ69G5FAV/ship", StatusCode::NOT_FOUND, "container_not_found")]
#[tokio::test]
async fn lookup_errors(
    #[case] method: Method,
    #[case] uri: &str,
    #[case] expected: StatusCode,
    #[case] code: &str,
) {
    let app = app();
    let (status, body) = send(&app, method, uri, None).await;
    assert_eq!(status, expected);
    assert_eq!(body["code"], code);
}

#[rstest]
#[case::zero_capacity(json!({ "name": "A", "capacity": 0 }), "invalid_capacity")]
#[case::negative_capacity(json!({ "name": "A", "capacity": -2 }), "invalid_capacity")]
#[case::blank_name(json!({ "name": "  ", "capacity": 2 }), "invalid_name")]
#[case::missing_capacity(json!({ "name": "A" }), "invalid_body")]
#[tokio::test]
async fn create_zone_validation(#[case] body: Value, #[case] code: &str) {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/v1/zones", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], code);
}

#[tokio::test]
async fn assign_to_missing_zone_and_container() {
    let app = app();
    let zone = create_zone(&app, "A", 1).await;
    let c = create_container(&app).await;

    let (status, body) = assign(&app, "zone_01ARZ3NDEKTSV4RRFFQ69G5FAV", &c).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "zone_not_found");

    let (status, body) = assign(&app, &zone, "ctr_01ARZ3NDEKTSV4RRFFQ69G5FAV").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "container_not_found");
}

#[tokio::test]
async fn lists_return_items() {
    let app = app();
    create_zone(&app, "B", 1).await;
    create_zone(&app, "A", 1).await;
    create_container(&app).await;

    let (status, body) = send(&app, Method::GET, "/v1/zones", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|z| z["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["A", "B"]);

    let (status, body) = send(&app, Method::GET, "/v1/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn request_id_is_propagated() {
    let app = app();

    let (_, headers, _) = send_raw(&app, Method::GET, "/healthz", None, Some("req_given")).await;
    assert_eq!(headers.get("x-request-id").unwrap(), "req_given");

    let (_, headers, body) = send_raw(
        &app,
        Method::GET,
        "/v1/zones/zone_01ARZ3NDEKTSV4RRFFQ69G5FAV",
        None,
        None,
    )
    .await;
    let generated = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(generated.starts_with("req_"));
    assert_eq!(body["request_id"], generated);
}

#[tokio::test]
async fn health_endpoints() {
    let app = app();
    for path in ["/healthz", "/readyz", "/livez"] {
        let (status, _) = send(&app, Method::GET, path, None).await;
        assert_eq!(status, StatusCode::OK, "{path}");
    }
}

#[rstest]
#[case::truncated("{not json")]
#[case::wrong_field_type(r#"{"number": 7}"#)]
#[case::empty_json_body("")]
#[tokio::test]
async fn create_container_rejects_malformed_json(#[case] raw: &'static str) {
    let app = app();
    let (status, headers, bytes) = send_bytes(
        &app,
        Method::POST,
        "/v1/containers",
        Some("application/json"),
        raw,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "invalid_body");
    assert!(body["request_id"].as_str().unwrap().starts_with("req_"));

    let (_, listed) = send(&app, Method::GET, "/v1/containers", None).await;
    assert!(listed["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn openapi_document_lists_served_routes() {
    let app = app();
    let (status, headers, bytes) =
        send_bytes(&app, Method::GET, "/openapi.yaml", None, "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/yaml");

    let doc: serde_yaml::Value = serde_yaml::from_slice(&bytes).unwrap();
    for path in [
        "/v1/containers",
        "/v1/containers/{container_id}",
        "/v1/containers/{container_id}/ship",
        "/v1/zones",
        "/v1/zones/{zone_id}",
        "/v1/zones/{zone_id}/assign",
        "/v1/events/ws",
        "/healthz",
        "/readyz",
        "/livez",
    ] {
        assert!(doc["paths"][path].is_mapping(), "{path} missing from openapi.yaml");
    }
    assert!(doc["components"]["schemas"]["ProblemDetails"].is_mapping());
}
