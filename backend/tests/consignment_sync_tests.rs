//! Consignment mirroring tests
//!
//! Drives `ConsignmentSync` against an in-memory Lightspeed double that keeps
//! consignment lines and outlet stock, and records every request it sees.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{Call, FakeLightspeed};
use reqwest::Method;
use serde_json::{json, Value};
use shared::{ConsignmentLine, ConsignmentStatus, StockOperation};
use transfer_manager::error::AppResult;
use transfer_manager::external::lightspeed::{
    ConsignmentGateway, CreatedConsignment, GatewayResponse,
};
use transfer_manager::services::consignment::{ConsignmentLink, ConsignmentSync};

// ============================================================================
// Test doubles
// ============================================================================

/// Consignment id slot held in memory
#[derive(Default)]
struct MemoryLink {
    id: Option<String>,
    raced_by: Option<String>,
}

#[axum::async_trait]
impl ConsignmentLink for MemoryLink {
    fn linked_id(&self) -> Option<String> {
        self.id.clone()
    }

    async fn claim(&mut self, created: &CreatedConsignment) -> AppResult<Option<String>> {
        if let Some(existing) = &self.raced_by {
            self.id = Some(existing.clone());
            return Ok(Some(existing.clone()));
        }
        self.id = Some(created.id.clone());
        Ok(None)
    }
}

fn sync_with(fake: &Arc<FakeLightspeed>, enabled: bool) -> ConsignmentSync {
    ConsignmentSync::new(fake.clone(), enabled, "/tmp/sync.flag".to_string())
}

fn line(pid: &str, count: i64) -> ConsignmentLine {
    ConsignmentLine {
        product_id: pid.to_string(),
        count,
        cost: None,
    }
}

fn payload() -> Value {
    json!({ "name": "Transfer TR-000000000001", "type": "STOCK", "status": "OPEN" })
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_ensure_consignment_creates_once() {
    let fake = FakeLightspeed::new();
    let sync = sync_with(&fake, true);
    let mut link = MemoryLink::default();

    let first = sync.ensure_consignment(&mut link, payload()).await.unwrap();
    assert!(first.created);
    assert_eq!(first.id, "cons-1");
    assert_eq!(first.reference.as_deref(), Some("REF-1"));

    let second = sync.ensure_consignment(&mut link, payload()).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.id, "cons-1");

    assert_eq!(fake.count(Method::POST, "consignments"), 1);
}

#[tokio::test]
async fn test_lost_claim_deletes_orphan() {
    let fake = FakeLightspeed::new();
    let sync = sync_with(&fake, true);
    let mut link = MemoryLink {
        id: None,
        raced_by: Some("cons-winner".to_string()),
    };

    let ensured = sync.ensure_consignment(&mut link, payload()).await.unwrap();
    assert_eq!(ensured.id, "cons-winner");
    assert!(!ensured.created);

    let deletes: Vec<Call> = fake
        .calls()
        .into_iter()
        .filter(|c| c.method == Method::DELETE)
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].path, "consignments/cons-1");
}

#[tokio::test]
async fn test_create_without_id_is_upstream_error() {
    struct Silent;

    #[axum::async_trait]
    impl ConsignmentGateway for Silent {
        async fn request(
            &self,
            _method: Method,
            _path: &str,
            _body: Option<Value>,
        ) -> AppResult<GatewayResponse> {
            Ok(GatewayResponse {
                ok: true,
                status: 200,
                headers: HashMap::new(),
                body: json!({ "data": {} }),
                error: None,
            })
        }
    }

    let sync = ConsignmentSync::new(Arc::new(Silent), true, "flag".to_string());
    let err = sync.create_remote(payload()).await.unwrap_err();
    assert_eq!(err.code(), "LS_CREATE_FAILED");
    assert_eq!(err.status().as_u16(), 502);
}

// ============================================================================
// Lines
// ============================================================================

#[tokio::test]
async fn test_sync_lines_adds_updates_and_skips() {
    let fake = FakeLightspeed::new().with_lines(&[("A", 5), ("B", 2)]);
    let sync = sync_with(&fake, true);

    let desired = vec![line("A", 5), line("B", 3), line("C", 1)];
    let summary = sync.sync_lines("cons-1", &desired).await.unwrap();

    assert_eq!(summary.added, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(fake.count(Method::POST, "consignments/cons-1/products"), 1);
    assert_eq!(fake.count(Method::PUT, "consignments/cons-1/products/B"), 1);

    let lines = fake.lines.lock().unwrap().clone();
    assert_eq!(lines.get("B"), Some(&3));
    assert_eq!(lines.get("C"), Some(&1));
}

#[tokio::test]
async fn test_add_products_updates_existing_lines() {
    let fake = FakeLightspeed::new().with_lines(&[("A", 1)]);
    let sync = sync_with(&fake, true);

    let summary = sync
        .add_products("cons-1", &[line("A", 4), line("Z", 2)])
        .await
        .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.added, 1);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_line_costs_are_sent_as_numbers() {
    let fake = FakeLightspeed::new();
    let sync = sync_with(&fake, true);

    let priced = ConsignmentLine {
        product_id: "P".to_string(),
        count: 2,
        cost: Some(rust_decimal::Decimal::new(1250, 2)),
    };
    sync.sync_lines("cons-1", &[priced]).await.unwrap();

    let add = fake
        .calls()
        .into_iter()
        .find(|c| c.method == Method::POST && c.path == "consignments/cons-1/products")
        .unwrap();
    assert_eq!(add.body.unwrap()["cost"], json!(12.5));
}

// ============================================================================
// Sync disabled
// ============================================================================

#[tokio::test]
async fn test_disabled_sync_makes_no_calls() {
    let fake = FakeLightspeed::new();
    let sync = sync_with(&fake, false);
    let mut link = MemoryLink::default();

    let err = sync.ensure_consignment(&mut link, payload()).await.unwrap_err();
    assert_eq!(err.code(), "SYNC_DISABLED");
    assert_eq!(
        sync.sync_lines("cons-1", &[line("A", 1)]).await.unwrap_err().code(),
        "SYNC_DISABLED"
    );
    assert!(sync
        .adjust_stock("out", vec![("A", 3)], StockOperation::Add)
        .await
        .is_err());
    assert!(sync.cancel("cons-1").await.is_err());
    assert!(sync
        .set_status("cons-1", ConsignmentStatus::Sent)
        .await
        .is_err());

    assert!(fake.calls().is_empty());
    assert!(link.linked_id().is_none());
}

// ============================================================================
// Stock and receiving
// ============================================================================

#[tokio::test]
async fn test_adjust_stock_skips_empty_lines_and_saturates() {
    let fake = FakeLightspeed::new();
    fake.set_stock("src", "A", 1);
    fake.set_stock("src", "C", 10);
    let sync = sync_with(&fake, true);

    let adjustments = sync
        .adjust_stock(
            "src",
            vec![("A", 3), ("B", 0), ("C", 2)],
            StockOperation::Subtract,
        )
        .await
        .unwrap();

    assert_eq!(adjustments.len(), 2);
    assert_eq!(fake.count(Method::PATCH, "products/"), 2);
    assert_eq!(fake.stock("src", "A"), 0);
    assert_eq!(fake.stock("src", "C"), 8);
    assert_eq!(adjustments[0].previous_stock, Some(1));
    assert_eq!(adjustments[0].new_stock, Some(0));
    assert!(adjustments.iter().all(|a| a.success));
}

#[tokio::test]
async fn test_receive_lines_receives_and_restocks() {
    let fake = FakeLightspeed::new().with_lines(&[("A", 4), ("B", 2)]);
    fake.set_stock("dest", "A", 1);
    let sync = sync_with(&fake, true);

    let report = sync.receive_lines("cons-1", "dest").await.unwrap();

    assert_eq!(report.stock_updates.len(), 2);
    assert_eq!(fake.stock("dest", "A"), 5);
    assert_eq!(fake.stock("dest", "B"), 2);
    // two product updates plus the final status step
    assert_eq!(report.steps.len(), 3);

    let status_put = fake
        .calls()
        .into_iter()
        .filter(|c| c.method == Method::PUT && c.path == "consignments/cons-1")
        .last()
        .unwrap();
    assert_eq!(status_put.body.unwrap()["status"], "RECEIVED");
}

#[tokio::test]
async fn test_prepare_receiving_dispatches_supplier_consignments() {
    let fake = FakeLightspeed::new();
    *fake.consignment_type.lock().unwrap() = "SUPPLIER".to_string();
    let sync = sync_with(&fake, true);

    let (consignment, totals) = sync.prepare_receiving("cons-1").await.unwrap();
    assert!(consignment.is_some());
    assert!(totals.is_some());

    let put = fake
        .calls()
        .into_iter()
        .find(|c| c.method == Method::PUT && c.path == "consignments/cons-1")
        .unwrap();
    assert_eq!(put.body.unwrap()["status"], "DISPATCHED");
}

#[tokio::test]
async fn test_prepare_receiving_leaves_stock_consignments_alone() {
    let fake = FakeLightspeed::new();
    let sync = sync_with(&fake, true);

    sync.prepare_receiving("cons-1").await.unwrap();
    assert_eq!(fake.count(Method::PUT, "consignments"), 0);
}

#[tokio::test]
async fn test_cancel_falls_back_to_delete() {
    let fake = FakeLightspeed::new();
    *fake.refuse_status_changes.lock().unwrap() = true;
    let sync = sync_with(&fake, true);

    let result = sync.cancel("cons-1").await.unwrap();
    assert_eq!(result["update"], 422);
    assert_eq!(result["delete"], 204);
}

#[tokio::test]
async fn test_require_status_failure_is_update_failed() {
    let fake = FakeLightspeed::new();
    *fake.refuse_status_changes.lock().unwrap() = true;
    let sync = sync_with(&fake, true);

    let err = sync
        .require_status("cons-1", ConsignmentStatus::Open)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LIGHTSPEED_UPDATE_FAILED");
}
