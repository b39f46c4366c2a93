//! Action router tests
//!
//! Exercises the request guards (method, `api=1`, bearer auth, CSRF) through
//! the full router. The database pool points at a closed port, so only paths
//! that stop before SQL succeed; the rest check the error envelope.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use transfer_manager::config::{
    Config, DatabaseConfig, LightspeedConfig, OutboxConfig, SecurityConfig, ServerConfig,
    SyncConfig,
};
use transfer_manager::external::LightspeedClient;
use transfer_manager::middleware::auth::Claims;
use transfer_manager::services::{CsrfTokens, Diagnostics, SyncFlag};
use transfer_manager::{create_app, AppState};

const JWT_SECRET: &str = "jwt-test-secret";
const CSRF_SECRET: &str = "csrf-test-secret";
const SUBJECT: &str = "17";

struct Harness {
    app: Router,
    csrf: CsrfTokens,
    flag_file: std::path::PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.flag_file);
    }
}

fn test_config(flag_file: &str, allow_testing_bypass: bool, error_diagnostics: bool) -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://tm:tm@127.0.0.1:1/tm".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        lightspeed: LightspeedConfig {
            api_token: String::new(),
            domain_prefix: "teststore".to_string(),
            base_url: None,
            timeout_secs: 1,
            connect_timeout_secs: 1,
            retries: 0,
            user_agent: "transfer-manager-tests".to_string(),
        },
        sync: SyncConfig {
            flag_file: flag_file.to_string(),
        },
        security: SecurityConfig {
            jwt_secret: JWT_SECRET.to_string(),
            csrf_secret: CSRF_SECRET.to_string(),
            allow_testing_bypass,
        },
        outbox: OutboxConfig {
            poll_interval_secs: 5,
            batch_size: 10,
            max_attempts: 3,
        },
        debug: false,
        error_diagnostics,
    }
}

fn harness(allow_testing_bypass: bool, error_diagnostics: bool) -> Harness {
    let flag_file = std::env::temp_dir().join(format!("tm-sync-{}", uuid::Uuid::new_v4()));
    let config = test_config(&flag_file.display().to_string(), allow_testing_bypass, error_diagnostics);

    let db = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(1))
        .connect_lazy(&config.database.url)
        .unwrap();
    let csrf = CsrfTokens::new(CSRF_SECRET).unwrap();
    let state = AppState {
        db,
        gateway: Arc::new(LightspeedClient::new(&config.lightspeed).unwrap()),
        sync: SyncFlag::new(&flag_file),
        diagnostics: Diagnostics::new(),
        csrf: csrf.clone(),
        config: Arc::new(config),
    };

    Harness {
        app: create_app(state),
        csrf,
        flag_file,
    }
}

fn bearer() -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: SUBJECT.to_string(),
        name: Some("Test Operator".to_string()),
        exp: now + 600,
        iat: now,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

async fn send(app: &Router, method: Method, uri: &str, auth: bool, body: Value) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if auth {
        request = request.header(header::AUTHORIZATION, bearer());
    }
    let request = request.body(Body::from(body.to_string())).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ============================================================================
// Guards
// ============================================================================

#[tokio::test]
async fn test_missing_bearer_is_401() {
    let h = harness(false, false);
    let (status, body) = send(&h.app, Method::POST, "/backend.php?api=1", false, json!({"action": "init"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_legacy_path_requires_api_flag() {
    let h = harness(false, false);
    let (status, body) = send(&h.app, Method::POST, "/backend.php", true, json!({"action": "init"})).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "METHOD");
}

#[tokio::test]
async fn test_get_is_method_not_allowed() {
    let h = harness(false, false);
    let (status, body) = send(&h.app, Method::GET, "/api/v1/transfers", true, json!({})).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "METHOD");
}

#[tokio::test]
async fn test_unknown_action_names_the_action() {
    let h = harness(false, false);
    let (status, body) = send(&h.app, Method::POST, "/api/v1/transfers", true, json!({"action": "drop_tables"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "UNKNOWN_ACTION");
    assert_eq!(body["detail"], "drop_tables");
    assert!(body["ts"].is_string());
}

#[tokio::test]
async fn test_missing_csrf_is_419() {
    let h = harness(false, false);
    let (status, body) = send(&h.app, Method::POST, "/backend.php?api=1", true, json!({"action": "toggle_sync", "enabled": 0})).await;
    assert_eq!(status.as_u16(), 419);
    assert_eq!(body["error"], "CSRF_INVALID");
}

#[tokio::test]
async fn test_testing_flag_ignored_unless_configured() {
    let h = harness(false, false);
    let (status, _) = send(
        &h.app,
        Method::POST,
        "/backend.php?api=1",
        true,
        json!({"action": "toggle_sync", "enabled": 0, "testing": true}),
    )
    .await;
    assert_eq!(status.as_u16(), 419);
}

// ============================================================================
// Actions that stop before the database
// ============================================================================

#[tokio::test]
async fn test_toggle_sync_with_valid_csrf() {
    let h = harness(false, false);
    let token = h.csrf.issue(SUBJECT);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/backend.php?api=1",
        true,
        json!({"action": "toggle_sync", "enabled": "0", "csrf": token}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["sync"], false);
    assert_eq!(body["data"]["persisted"], true);
    assert_eq!(body["data"]["file"], h.flag_file.display().to_string());
    assert_eq!(std::fs::read_to_string(&h.flag_file).unwrap(), "0");
}

#[tokio::test]
async fn test_testing_bypass_when_configured() {
    let h = harness(true, false);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "toggle_sync", "enabled": true, "testing": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sync"], true);
}

#[tokio::test]
async fn test_invalid_id_is_rejected_before_lookup() {
    let h = harness(true, false);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "mark_sent", "id": 0, "testing": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_ID");
}

#[tokio::test]
async fn test_create_transfer_requires_fields() {
    let h = harness(true, false);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "create_transfer", "consignment_category": "STOCK", "outlet_from": "a", "testing": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "REQUIRED_FIELDS_MISSING");

    let (_, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "create_transfer", "consignment_category": "GIFT", "outlet_from": "a", "outlet_to": "b", "testing": true}),
    )
    .await;
    assert_eq!(body["error"], "INVALID_CATEGORY");
}

#[tokio::test]
async fn test_invalid_quantity_field() {
    let h = harness(true, false);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "update_transfer_item_qty", "id": 1, "item_id": 2, "field": "lost", "value": 3, "testing": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_FIELD");
}

#[tokio::test]
async fn test_add_products_needs_product_ids() {
    let h = harness(true, false);
    let (_, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "add_products_to_consignment", "id": 5, "product_ids": [], "testing": true}),
    )
    .await;
    assert_eq!(body["error"], "NO_PRODUCTS");
}

// ============================================================================
// Error diagnostics
// ============================================================================

#[tokio::test]
async fn test_database_failure_carries_diagnostics() {
    let h = harness(true, true);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "list_transfers", "testing": true}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "DATABASE_ERROR");
    assert!(body["system"].is_object());
    assert!(body["system"]["uptime_secs"].is_u64());
}

#[tokio::test]
async fn test_client_errors_carry_diagnostics() {
    let h = harness(false, true);

    let (status, body) = send(&h.app, Method::POST, "/api/v1/transfers", true, json!({"action": "drop_tables"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "UNKNOWN_ACTION");
    assert!(body["system"].is_object());

    let (status, body) = send(&h.app, Method::POST, "/backend.php?api=1", true, json!({"action": "toggle_sync", "enabled": 0})).await;
    assert_eq!(status.as_u16(), 419);
    assert_eq!(body["error"], "CSRF_INVALID");
    assert!(body["system"]["uptime_secs"].is_u64());

    let (status, body) = send(&h.app, Method::POST, "/backend.php?api=1", false, json!({"action": "init"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["system"].is_object());
}

#[tokio::test]
async fn test_diagnostics_switched_off() {
    let h = harness(true, false);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "list_transfers", "testing": true}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "DATABASE_ERROR");
    assert!(body.get("system").is_none());

    let (status, body) = send(&h.app, Method::POST, "/api/v1/transfers", true, json!({"action": "drop_tables"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("system").is_none());
}

#[tokio::test]
async fn test_success_bodies_have_no_diagnostics() {
    let h = harness(true, true);
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/transfers",
        true,
        json!({"action": "toggle_sync", "enabled": true, "testing": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("system").is_none());
}

#[tokio::test]
async fn test_health_reports_disconnected_database() {
    let h = harness(false, false);
    let (status, body) = send(&h.app, Method::GET, "/health", false, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["sync_enabled"], true);
}
