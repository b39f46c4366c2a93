//! Lightspeed HTTP client tests
//!
//! Runs `LightspeedClient` against a throwaway axum server on a local port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use transfer_manager::config::LightspeedConfig;
use transfer_manager::external::{ConsignmentGateway, LightspeedClient};

#[derive(Clone, Default)]
struct Stub {
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<HeaderMap>>>,
}

fn config(retries: u32) -> LightspeedConfig {
    LightspeedConfig {
        api_token: "secret-token".to_string(),
        domain_prefix: "teststore".to_string(),
        base_url: None,
        timeout_secs: 5,
        connect_timeout_secs: 2,
        retries,
        user_agent: "transfer-manager-tests".to_string(),
    }
}

/// First call is throttled, later calls create a consignment
async fn create_after_throttle(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    stub.seen.lock().unwrap().push(headers);
    let n = stub.hits.fetch_add(1, Ordering::SeqCst);
    if n == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "0")],
            Json(json!({ "message": "slow down" })),
        )
            .into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "data": { "id": "cons-42", "reference": "R42", "name": body["name"] } })),
    )
        .into_response()
}

async fn always_broken(State(stub): State<Stub>) -> impl IntoResponse {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::SERVICE_UNAVAILABLE, "upstream down")
}

async fn not_found(State(stub): State<Stub>) -> impl IntoResponse {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, Json(json!({ "message": "missing" })))
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/consignments", post(create_after_throttle))
        .route("/consignments/broken", get(always_broken))
        .route("/consignments/missing", get(not_found))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;
    let client = LightspeedClient::with_base_url(&config(2), base).unwrap();

    let (resp, created) = client
        .create_consignment(json!({ "name": "Transfer TR-abcdefabcdef" }))
        .await
        .unwrap();

    assert!(resp.ok);
    assert_eq!(resp.status, 201);
    let created = created.unwrap();
    assert_eq!(created.id, "cons-42");
    assert_eq!(created.reference.as_deref(), Some("R42"));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_requests_carry_auth_and_json_headers() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;
    let client = LightspeedClient::with_base_url(&config(1), base).unwrap();

    client
        .create_consignment(json!({ "name": "x" }))
        .await
        .unwrap();

    let seen = stub.seen.lock().unwrap();
    let headers = seen.last().unwrap();
    assert_eq!(headers[header::AUTHORIZATION], "Bearer secret-token");
    assert_eq!(headers[header::ACCEPT], "application/json");
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(headers[header::USER_AGENT], "transfer-manager-tests");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;
    let client = LightspeedClient::with_base_url(&config(1), base).unwrap();

    let resp = client.get_consignment("broken").await.unwrap();
    assert!(!resp.ok);
    assert_eq!(resp.status, 503);
    assert_eq!(resp.body, json!("upstream down"));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;
    let client = LightspeedClient::with_base_url(&config(3), base).unwrap();

    let resp = client.get_consignment("missing").await.unwrap();
    assert_eq!(resp.status, 404);
    assert_eq!(resp.message("fallback"), "missing");
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    // Nothing listens on port 9 locally
    let client =
        LightspeedClient::with_base_url(&config(0), "http://127.0.0.1:9".to_string()).unwrap();
    let resp = client.get_consignment("any").await.unwrap();
    assert!(!resp.ok);
    assert_eq!(resp.status, 0);
    assert!(resp.error.is_some());
}

#[tokio::test]
async fn test_missing_token_is_configuration_error() {
    let mut cfg = config(0);
    cfg.api_token = "  ".to_string();
    let client = LightspeedClient::with_base_url(&cfg, "http://127.0.0.1:9".to_string()).unwrap();

    let err = client.get_consignment("any").await.unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION_ERROR");
}
