//! Consignment mirroring
//!
//! Everything that talks to Lightspeed on behalf of a transfer action lives
//! here. Nothing in this module touches the database; callers pass in the
//! lines and ids they have already loaded.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use shared::{
    consignment_name, ConsignmentLine, ConsignmentStatus, LineAction, LineError, LineSyncSummary,
    StockAdjustment, StockOperation, Transfer,
};

use crate::error::{AppError, AppResult};
use crate::external::lightspeed::{
    decimal_json, ConsignmentGateway, CreatedConsignment, GatewayResponse,
};

/// Where a transfer's consignment id is stored
#[axum::async_trait]
pub trait ConsignmentLink: Send {
    /// Consignment id already recorded for the transfer
    fn linked_id(&self) -> Option<String>;

    /// Record a freshly created consignment. Returns the id that was already
    /// stored if another writer got there first.
    async fn claim(&mut self, created: &CreatedConsignment) -> AppResult<Option<String>>;
}

/// Consignment id and reference after [`ConsignmentSync::ensure_consignment`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredConsignment {
    pub id: String,
    pub reference: Option<String>,
    pub created: bool,
}

/// Result of receiving every line on a consignment
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiveReport {
    pub steps: Vec<Value>,
    pub stock_updates: Vec<StockAdjustment>,
}

#[derive(Clone)]
pub struct ConsignmentSync {
    gateway: Arc<dyn ConsignmentGateway>,
    enabled: bool,
    flag_file: String,
}

impl ConsignmentSync {
    pub fn new(gateway: Arc<dyn ConsignmentGateway>, enabled: bool, flag_file: String) -> Self {
        Self {
            gateway,
            enabled,
            flag_file,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn require_enabled(&self) -> AppResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(AppError::SyncDisabled {
                flag_file: self.flag_file.clone(),
            })
        }
    }

    /// Creation body for a transfer's consignment
    pub fn creation_payload(transfer: &Transfer, source_outlet: &str, destination_outlet: &str) -> Value {
        json!({
            "name": consignment_name(&transfer.public_id),
            "type": transfer.consignment_category.consignment_type().as_str(),
            "status": ConsignmentStatus::Open.as_str(),
            "outlet_id": destination_outlet,
            "source_outlet_id": source_outlet,
        })
    }

    /// Create a consignment; anything but a usable id is `LS_CREATE_FAILED`
    pub async fn create_remote(&self, payload: Value) -> AppResult<CreatedConsignment> {
        self.require_enabled()?;
        let (resp, created) = self.gateway.create_consignment(payload.clone()).await?;
        match created {
            Some(created) => {
                tracing::info!(
                    consignment_id = %created.id,
                    reference = ?created.reference,
                    "Consignment created"
                );
                Ok(created)
            }
            None => {
                let message = if resp.ok {
                    "Lightspeed did not return a consignment ID".to_string()
                } else {
                    resp.message("Unknown LS error")
                };
                Err(AppError::upstream(
                    "LS_CREATE_FAILED",
                    resp.status,
                    message,
                    json!({ "body": resp.body, "payload": payload }),
                ))
            }
        }
    }

    /// Return the linked consignment, creating and claiming one if needed
    pub async fn ensure_consignment<L>(
        &self,
        link: &mut L,
        payload: Value,
    ) -> AppResult<EnsuredConsignment>
    where
        L: ConsignmentLink + ?Sized,
    {
        if let Some(id) = link.linked_id() {
            return Ok(EnsuredConsignment {
                id,
                reference: None,
                created: false,
            });
        }

        let created = self.create_remote(payload).await?;
        match link.claim(&created).await? {
            None => Ok(EnsuredConsignment {
                id: created.id,
                reference: created.reference,
                created: true,
            }),
            Some(existing) => {
                tracing::warn!(
                    orphan = %created.id,
                    existing = %existing,
                    "Lost consignment claim, deleting orphan"
                );
                let resp = self.gateway.delete_consignment(&created.id).await?;
                if !resp.ok {
                    tracing::error!(orphan = %created.id, status = resp.status, "Orphan consignment was not deleted");
                }
                Ok(EnsuredConsignment {
                    id: existing,
                    reference: None,
                    created: false,
                })
            }
        }
    }

    /// Bring consignment lines in line with `desired`: add missing products,
    /// update differing counts, skip equal ones.
    pub async fn sync_lines(
        &self,
        consignment_id: &str,
        desired: &[ConsignmentLine],
    ) -> AppResult<LineSyncSummary> {
        self.require_enabled()?;
        let existing = self.gateway.list_products(consignment_id).await?;
        if !existing.response.ok {
            tracing::warn!(
                consignment_id,
                status = existing.response.status,
                "Could not list consignment lines, treating as empty"
            );
        }

        let mut summary = LineSyncSummary::default();
        for action in shared::plan_line_sync(desired, &existing.counts()) {
            match action {
                LineAction::Add(line) => {
                    let resp = self
                        .gateway
                        .add_product(consignment_id, &line.product_id, line.count, line.cost, None)
                        .await?;
                    record(&mut summary.added, &mut summary.errors, &line.product_id, "add", &resp);
                }
                LineAction::Update(line) => {
                    let resp = self
                        .gateway
                        .update_product(consignment_id, &line.product_id, line_fields(&line))
                        .await?;
                    record(&mut summary.updated, &mut summary.errors, &line.product_id, "update", &resp);
                }
                LineAction::Skip { .. } => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Put specific products on a consignment. Products already present are
    /// updated to the given count, others added.
    pub async fn add_products(
        &self,
        consignment_id: &str,
        lines: &[ConsignmentLine],
    ) -> AppResult<LineSyncSummary> {
        self.require_enabled()?;
        let existing = self.gateway.list_products(consignment_id).await?.counts();

        let mut summary = LineSyncSummary::default();
        for line in lines {
            if existing.contains_key(&line.product_id) {
                let resp = self
                    .gateway
                    .update_product(consignment_id, &line.product_id, line_fields(line))
                    .await?;
                record(&mut summary.updated, &mut summary.errors, &line.product_id, "update", &resp);
            } else {
                let resp = self
                    .gateway
                    .add_product(consignment_id, &line.product_id, line.count, line.cost, None)
                    .await?;
                record(&mut summary.added, &mut summary.errors, &line.product_id, "add", &resp);
            }
        }
        Ok(summary)
    }

    /// Change status, reporting failure in the response
    pub async fn set_status(
        &self,
        consignment_id: &str,
        status: ConsignmentStatus,
    ) -> AppResult<GatewayResponse> {
        self.require_enabled()?;
        self.gateway
            .update_consignment_status(consignment_id, status)
            .await
    }

    /// Change status; failure is `LIGHTSPEED_UPDATE_FAILED`
    pub async fn require_status(
        &self,
        consignment_id: &str,
        status: ConsignmentStatus,
    ) -> AppResult<GatewayResponse> {
        let resp = self.set_status(consignment_id, status).await?;
        if resp.ok {
            Ok(resp)
        } else {
            Err(AppError::upstream(
                "LIGHTSPEED_UPDATE_FAILED",
                resp.status,
                resp.message("Status change failed"),
                resp.body.clone(),
            ))
        }
    }

    /// Line error entry for a failed status change
    pub fn status_error(status: ConsignmentStatus, resp: &GatewayResponse) -> LineError {
        LineError {
            product_id: None,
            action: "status".to_string(),
            status: resp.status,
            message: format!("{}: {}", status, resp.message("Status change failed")),
            success: false,
        }
    }

    /// Fetch the consignment for receiving. Supplier consignments are moved to
    /// DISPATCHED first. Returns the consignment and its totals.
    pub async fn prepare_receiving(
        &self,
        consignment_id: &str,
    ) -> AppResult<(Option<Value>, Option<Value>)> {
        self.require_enabled()?;
        let current = self.gateway.get_consignment(consignment_id).await?;
        if !current.ok || !current.data().is_object() {
            return Ok((None, None));
        }

        let mut consignment = current.data().clone();
        let is_supplier = consignment.get("type").and_then(Value::as_str) == Some("SUPPLIER");
        let status = consignment
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("OPEN");
        if is_supplier && status != ConsignmentStatus::Dispatched.as_str() {
            let updated = self
                .gateway
                .update_consignment_status(consignment_id, ConsignmentStatus::Dispatched)
                .await?;
            if updated.ok && !updated.data().is_null() {
                consignment = updated.data().clone();
            }
        }

        let totals = self.gateway.consignment_totals(consignment_id).await?;
        let totals = totals.ok.then(|| totals.data().clone());
        Ok((Some(consignment), totals))
    }

    /// Mark every line received at its sent count, add that stock to the
    /// destination outlet, then set the consignment RECEIVED.
    pub async fn receive_lines(
        &self,
        consignment_id: &str,
        destination_outlet: &str,
    ) -> AppResult<ReceiveReport> {
        self.require_enabled()?;
        let list = self.gateway.list_products(consignment_id).await?;

        let mut report = ReceiveReport::default();
        for (product_id, count) in list.counts() {
            let resp = self
                .gateway
                .update_product(
                    consignment_id,
                    &product_id,
                    json!({ "count": count, "received": count }),
                )
                .await?;
            report.steps.push(json!({
                "product_id": product_id,
                "ok": resp.ok,
                "status": resp.status,
                "count": count,
                "received": count,
            }));

            if resp.ok && !destination_outlet.is_empty() && count > 0 {
                let adjustment = self
                    .gateway
                    .update_outlet_stock(destination_outlet, &product_id, count, StockOperation::Add)
                    .await?;
                report.stock_updates.push(adjustment);
            }
        }

        let last = self
            .gateway
            .update_consignment_status(consignment_id, ConsignmentStatus::Received)
            .await?;
        report.steps.push(json!({ "final": last.status, "ok": last.ok }));
        Ok(report)
    }

    /// Apply one stock adjustment per line with a positive quantity
    pub async fn adjust_stock<'a, I>(
        &self,
        outlet_id: &str,
        lines: I,
        operation: StockOperation,
    ) -> AppResult<Vec<StockAdjustment>>
    where
        I: IntoIterator<Item = (&'a str, i64)> + Send,
        I::IntoIter: Send,
    {
        self.require_enabled()?;
        let mut adjustments = Vec::new();
        for (product_id, quantity) in lines {
            if quantity <= 0 {
                continue;
            }
            let adjustment = self
                .gateway
                .update_outlet_stock(outlet_id, product_id, quantity, operation)
                .await?;
            if !adjustment.success {
                tracing::warn!(outlet_id, product_id, quantity, ?operation, "Stock adjustment failed");
            }
            adjustments.push(adjustment);
        }
        Ok(adjustments)
    }

    /// Cancel the consignment, deleting it when the status change is refused
    pub async fn cancel(&self, consignment_id: &str) -> AppResult<Value> {
        self.require_enabled()?;
        let update = self
            .gateway
            .update_consignment_status(consignment_id, ConsignmentStatus::Cancelled)
            .await?;
        if update.ok {
            return Ok(json!({ "update": update.status }));
        }
        let delete = self.gateway.delete_consignment(consignment_id).await?;
        Ok(json!({ "update": update.status, "delete": delete.status }))
    }

    /// Remote consignment and totals for a detail view; failures give `None`
    pub async fn snapshot(&self, consignment_id: &str) -> AppResult<(Option<Value>, Option<Value>)> {
        self.require_enabled()?;
        let consignment = self.gateway.get_consignment(consignment_id).await?;
        let totals = self.gateway.consignment_totals(consignment_id).await?;
        Ok((
            consignment.ok.then(|| consignment.data().clone()),
            totals.ok.then(|| totals.data().clone()),
        ))
    }
}

fn line_fields(line: &ConsignmentLine) -> Value {
    let mut fields = json!({ "count": line.count });
    if let Some(cost) = line.cost {
        fields["cost"] = decimal_json(cost);
    }
    fields
}

fn record(
    counter: &mut u32,
    errors: &mut Vec<LineError>,
    product_id: &str,
    action: &str,
    resp: &GatewayResponse,
) {
    if resp.ok {
        *counter += 1;
    } else {
        let fallback = if action == "add" { "Add failed" } else { "Update failed" };
        errors.push(LineError {
            product_id: Some(product_id.to_string()),
            action: action.to_string(),
            status: resp.status,
            message: resp.message(fallback),
            success: false,
        });
    }
}
