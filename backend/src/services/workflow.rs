//! Transfer actions
//!
//! Each mutating action locks the transfer row, checks the transition, writes
//! its changes and one audit event, and commits. Lightspeed calls made while
//! the row is locked are serialised per transfer.

use serde_json::{json, Value};
use shared::{
    aggregate_lines, copied_note_text, generate_public_id, merge_for_recreate,
    receiving_outcome, recreation_note_text, AuditEvent, AuditEventType, AuditSeverity,
    ConsignmentLine, ConsignmentStatus, CreationMethod, Pagination, QtyField, ReceivingOutcome,
    StockOperation, Transfer, TransferCategory, TransferEvent, TransferState,
};
use sqlx::PgConnection;

use crate::config::LightspeedConfig;
use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::consignment::{ConsignmentSync, EnsuredConsignment, ReceiveReport};
use crate::services::transfer::{quantities, ListFilter, NewTransfer, TransferLink, TransferService};

/// Fields for a new transfer
#[derive(Debug, Clone)]
pub struct CreateTransferInput {
    pub category: TransferCategory,
    pub outlet_from: String,
    pub outlet_to: String,
    pub supplier_id: Option<String>,
}

/// Options for `create_consignment`
#[derive(Debug, Clone)]
pub struct ConsignmentRequest {
    pub send: bool,
    pub source_outlet: Option<String>,
    pub destination_outlet: Option<String>,
}

pub struct TransferWorkflow {
    store: TransferService,
    consignments: ConsignmentSync,
    lightspeed: LightspeedConfig,
    actor: i64,
}

impl TransferWorkflow {
    pub fn new(
        store: TransferService,
        consignments: ConsignmentSync,
        lightspeed: LightspeedConfig,
        actor: i64,
    ) -> Self {
        Self {
            store,
            consignments,
            lightspeed,
            actor,
        }
    }

    fn sync(&self) -> bool {
        self.consignments.enabled()
    }

    /// Consignment id when sync is on and the transfer is linked
    fn mirrored<'t>(&self, transfer: &'t Transfer) -> Option<&'t str> {
        if self.sync() {
            transfer.vend_transfer_id.as_deref()
        } else {
            None
        }
    }

    fn event(&self, transfer_id: i64, event_type: AuditEventType, data: Value) -> AuditEvent {
        AuditEvent::new(transfer_id, event_type, data).actor(self.actor)
    }

    async fn ensure_linked(
        &self,
        conn: &mut PgConnection,
        transfer: &Transfer,
        source: &str,
        destination: &str,
    ) -> AppResult<EnsuredConsignment> {
        let payload = ConsignmentSync::creation_payload(transfer, source, destination);
        let mut link = TransferLink::new(conn, transfer);
        self.consignments.ensure_consignment(&mut link, payload).await
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn list(&self, filter: ListFilter, page: Pagination) -> AppResult<Value> {
        let page = self.store.list(&filter, page).await?;
        Ok(json!({ "rows": page.rows, "total": page.total, "sync": self.sync() }))
    }

    pub async fn detail(&self, id: i64) -> AppResult<Value> {
        let transfer = self
            .store
            .view(id)
            .await?
            .ok_or_else(|| AppError::NotFound("transfer".to_string()))?;
        let items = self.store.item_views(id).await?;
        let shipments = self.store.shipments(id).await?;
        let notes = self.store.notes(id).await?;

        let (ls, totals) = match (&transfer.vend_transfer_id, self.sync()) {
            (Some(cons_id), true) => self.consignments.snapshot(cons_id).await?,
            _ => (None, None),
        };

        Ok(json!({
            "source_outlet": { "id": transfer.outlet_from, "name": transfer.outlet_from_label },
            "dest_outlet": { "id": transfer.outlet_to, "name": transfer.outlet_to_label },
            "transfer": transfer,
            "items": items,
            "shipments": shipments,
            "notes": notes,
            "ls": ls,
            "totals": totals,
            "sync": self.sync(),
        }))
    }

    pub async fn search_products(&self, query: Option<String>, limit: i64) -> AppResult<Value> {
        let results = match query {
            Some(q) => self.store.search_products(&q, limit).await?,
            None => Vec::new(),
        };
        Ok(json!({ "results": results }))
    }

    // ------------------------------------------------------------------------
    // Header
    // ------------------------------------------------------------------------

    pub async fn create_transfer(&self, input: CreateTransferInput) -> AppResult<Value> {
        let supplier_id = match input.category {
            TransferCategory::PurchaseOrder => {
                input.supplier_id.or_else(|| Some(input.outlet_from.clone()))
            }
            _ => input.supplier_id,
        };
        let new = NewTransfer {
            public_id: generate_public_id(),
            category: input.category,
            creation_method: CreationMethod::Manual,
            outlet_from: input.outlet_from,
            outlet_to: input.outlet_to,
            supplier_id,
            created_by: self.actor,
            total_boxes: 0,
        };

        let mut tx = self.store.begin().await?;
        let transfer = TransferService::insert(&mut tx, &new).await?;

        let mut vend_transfer_id = None;
        let mut vend_number = None;
        if self.sync() {
            match self
                .ensure_linked(&mut tx, &transfer, &transfer.outlet_from, &transfer.outlet_to)
                .await
            {
                Ok(ensured) => {
                    vend_transfer_id = Some(ensured.id);
                    vend_number = ensured.reference;
                }
                // The transfer stays local; create_consignment can link it later
                Err(e @ (AppError::Upstream { .. } | AppError::Configuration(_))) => {
                    tracing::warn!(transfer_id = transfer.id, error = %e, "Consignment not created")
                }
                Err(e) => return Err(e),
            }
        }

        audit::enqueue(
            &mut tx,
            &self
                .event(
                    transfer.id,
                    AuditEventType::Create,
                    json!({
                        "category": transfer.consignment_category.as_str(),
                        "from": transfer.outlet_from,
                        "to": transfer.outlet_to,
                        "ls_id": vend_transfer_id,
                    }),
                )
                .after(json!({ "state": TransferState::Open.as_str(), "vend_transfer_id": vend_transfer_id })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(transfer_id = transfer.id, public_id = %transfer.public_id, "Transfer created");
        Ok(json!({
            "id": transfer.id,
            "public_id": transfer.public_id,
            "vend_transfer_id": vend_transfer_id,
            "vend_number": vend_number,
            "sync": self.sync(),
        }))
    }

    pub async fn store_vend_numbers(
        &self,
        id: i64,
        vend_number: Option<String>,
        vend_transfer_id: Option<String>,
    ) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;

        if let (Some(current), Some(requested)) = (&transfer.vend_transfer_id, &vend_transfer_id) {
            if current != requested {
                return Err(AppError::bad_request_with(
                    "VEND_ID_IMMUTABLE",
                    json!({ "current": current, "requested": requested }),
                ));
            }
        }

        TransferService::store_vend_numbers(
            &mut tx,
            id,
            vend_number.as_deref(),
            vend_transfer_id.as_deref(),
        )
        .await?;
        audit::enqueue(
            &mut tx,
            &self.event(
                id,
                AuditEventType::StoreVendNumbers,
                json!({ "vend_number": vend_number, "vend_transfer_id": vend_transfer_id }),
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({
            "id": id,
            "vend_number": vend_number.or(transfer.vend_number),
            "vend_transfer_id": transfer.vend_transfer_id.or(vend_transfer_id),
        }))
    }

    /// Move to PACKING and mirror every requested line onto the consignment,
    /// creating it first when needed. With `send`, also set SENT on both sides.
    pub async fn create_consignment(&self, id: i64, request: ConsignmentRequest) -> AppResult<Value> {
        let target = if request.send {
            ConsignmentStatus::Sent
        } else {
            ConsignmentStatus::Open
        };

        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        let category = transfer.consignment_category;
        let packing = transfer.state.apply(TransferEvent::StartPacking, category)?;

        let source = request
            .source_outlet
            .unwrap_or_else(|| transfer.outlet_from.clone());
        let destination = request
            .destination_outlet
            .unwrap_or_else(|| transfer.outlet_to.clone());
        if source.is_empty() || destination.is_empty() {
            return Err(AppError::bad_request("MISSING_OUTLETS"));
        }

        if !self.sync() {
            TransferService::set_state(&mut tx, id, packing).await?;
            audit::enqueue(
                &mut tx,
                &self
                    .event(
                        id,
                        AuditEventType::CreateConsignmentLocal,
                        json!({ "forced_include_all": true, "target_status": target, "sync": false }),
                    )
                    .after(json!({ "state": packing.as_str() })),
            )
            .await?;
            tx.commit().await?;
            return Ok(json!({
                "vend_transfer_id": Value::Null,
                "vend_number": Value::Null,
                "included_products": 0,
                "sync": false,
            }));
        }

        let ensured = self
            .ensure_linked(&mut tx, &transfer, &source, &destination)
            .await?;
        let vend_number = ensured.reference.clone().or(transfer.vend_number.clone());

        let desired = aggregate_lines(TransferService::consignment_lines(&mut tx, id, false).await?);
        let mut summary = self.consignments.sync_lines(&ensured.id, &desired).await?;

        let mut state = packing;
        if request.send {
            let resp = self
                .consignments
                .set_status(&ensured.id, ConsignmentStatus::Sent)
                .await?;
            if resp.ok {
                state = packing.apply(TransferEvent::MarkSent, category)?;
            } else {
                summary
                    .errors
                    .push(ConsignmentSync::status_error(ConsignmentStatus::Sent, &resp));
            }
        }

        TransferService::set_state(&mut tx, id, state).await?;
        audit::enqueue(
            &mut tx,
            &self
                .event(
                    id,
                    AuditEventType::CreateConsignment,
                    json!({
                        "vend_transfer_id": ensured.id,
                        "vend_number": vend_number,
                        "created": ensured.created,
                        "target_status": target,
                        "summary": summary,
                    }),
                )
                .after(json!({ "state": state.as_str(), "vend_transfer_id": ensured.id })),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({
            "vend_transfer_id": ensured.id,
            "vend_number": vend_number,
            "included_products": desired.len(),
            "summary": summary,
            "consignment_url": self.lightspeed.consignment_url(&ensured.id),
            "sync": true,
        }))
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    fn ensure_editable(transfer: &Transfer) -> AppResult<()> {
        if transfer.state.accepts_item_edits() {
            Ok(())
        } else {
            Err(AppError::bad_request_with(
                "TRANSFER_CLOSED",
                json!({ "state": transfer.state.as_str() }),
            ))
        }
    }

    pub async fn add_item(&self, id: i64, product_id: &str, qty: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        Self::ensure_editable(&transfer)?;

        let product = TransferService::product(&mut tx, product_id)
            .await?
            .ok_or_else(|| AppError::bad_request_with("PRODUCT_NOT_FOUND", product_id))?;
        let item = TransferService::upsert_item(&mut tx, id, product_id, qty).await?;

        audit::enqueue(
            &mut tx,
            &self
                .event(
                    id,
                    AuditEventType::AddItem,
                    json!({ "product_id": product_id, "qty": qty, "product_name": product.name }),
                )
                .item(item.id),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({ "added": true, "product": product, "quantity": qty }))
    }

    /// Set the requested quantity; zero removes the line
    pub async fn update_item(&self, id: i64, item_id: i64, qty: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        Self::ensure_editable(&transfer)?;
        let item = TransferService::lock_item(&mut tx, item_id, Some(id)).await?;

        let response = if qty == 0 {
            TransferService::delete_item(&mut tx, item_id).await?;
            audit::enqueue(
                &mut tx,
                &self
                    .event(id, AuditEventType::RemoveItem, json!({ "product_id": item.product_id }))
                    .item(item_id),
            )
            .await?;
            json!({ "removed": true })
        } else {
            let next = quantities(&item).with_field(QtyField::Req, qty)?;
            TransferService::set_item_qty(&mut tx, item_id, QtyField::Req, next.requested).await?;
            audit::enqueue(
                &mut tx,
                &self
                    .event(
                        id,
                        AuditEventType::UpdateItem,
                        json!({ "product_id": item.product_id, "qty_requested": qty }),
                    )
                    .item(item_id),
            )
            .await?;
            json!({ "updated": true })
        };
        tx.commit().await?;
        Ok(response)
    }

    pub async fn update_item_qty(
        &self,
        id: i64,
        item_id: i64,
        field: QtyField,
        value: i64,
    ) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        Self::ensure_editable(&transfer)?;
        let item = TransferService::lock_item(&mut tx, item_id, Some(id)).await?;

        let next = quantities(&item).with_field(field, value)?;
        TransferService::set_item_qty(&mut tx, item_id, field, value).await?;
        audit::enqueue(
            &mut tx,
            &self
                .event(
                    id,
                    AuditEventType::UpdateItemQty,
                    json!({ "field": field, "value": value, "product_id": item.product_id }),
                )
                .item(item_id)
                .after(json!({
                    "qty_requested": next.requested,
                    "qty_sent_total": next.sent,
                    "qty_received_total": next.received,
                })),
        )
        .await?;
        tx.commit().await?;
        Ok(json!({ "updated": true }))
    }

    pub async fn remove_item(&self, item_id: i64) -> AppResult<Value> {
        let id = self.store.item_owner(item_id).await?;

        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        Self::ensure_editable(&transfer)?;
        let item = TransferService::lock_item(&mut tx, item_id, Some(id)).await?;

        TransferService::delete_item(&mut tx, item_id).await?;
        audit::enqueue(
            &mut tx,
            &self
                .event(id, AuditEventType::RemoveItem, json!({ "product_id": item.product_id }))
                .item(item_id),
        )
        .await?;
        tx.commit().await?;
        Ok(json!({ "removed": true }))
    }

    // ------------------------------------------------------------------------
    // Consignment lines
    // ------------------------------------------------------------------------

    /// Resend every requested line, priced at supply cost
    pub async fn push_lines(&self, id: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        self.consignments.require_enabled()?;

        let ensured = self
            .ensure_linked(&mut tx, &transfer, &transfer.outlet_from, &transfer.outlet_to)
            .await?;
        let desired = aggregate_lines(TransferService::consignment_lines(&mut tx, id, true).await?);
        let summary = self.consignments.sync_lines(&ensured.id, &desired).await?;

        audit::enqueue(
            &mut tx,
            &self.event(
                id,
                AuditEventType::PushLines,
                json!({
                    "lines": desired.len(),
                    "pushed": summary.added,
                    "updated": summary.updated,
                    "skipped": summary.skipped,
                    "errors": summary.errors,
                }),
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({
            "pushed": summary.added,
            "updated": summary.updated,
            "skipped": summary.skipped,
            "errors": summary.errors,
            "vend_transfer_id": ensured.id,
            "consignment_url": self.lightspeed.consignment_url(&ensured.id),
        }))
    }

    /// Put specific products on the consignment. Missing or non-positive
    /// quantities count as one.
    pub async fn add_products(
        &self,
        id: i64,
        product_ids: Vec<String>,
        counts: Vec<i64>,
    ) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        self.consignments.require_enabled()?;

        let ensured = self
            .ensure_linked(&mut tx, &transfer, &transfer.outlet_from, &transfer.outlet_to)
            .await?;
        let prices = self.store.supply_prices(&product_ids).await?;
        let lines: Vec<ConsignmentLine> = product_ids
            .iter()
            .enumerate()
            .map(|(i, product_id)| ConsignmentLine {
                product_id: product_id.clone(),
                count: counts.get(i).copied().filter(|c| *c > 0).unwrap_or(1),
                cost: prices.get(product_id).copied(),
            })
            .collect();
        let summary = self.consignments.add_products(&ensured.id, &lines).await?;

        audit::enqueue(
            &mut tx,
            &self.event(
                id,
                AuditEventType::AddProductsToConsignment,
                json!({ "added": summary.added, "updated": summary.updated, "errors": summary.errors }),
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({
            "added": summary.added,
            "updated": summary.updated,
            "errors": summary.errors,
            "sync": true,
            "vend_transfer_id": ensured.id,
            "consignment_url": self.lightspeed.consignment_url(&ensured.id),
        }))
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub async fn mark_sent(&self, id: i64, total_boxes: i32) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        let next = transfer
            .state
            .apply(TransferEvent::MarkSent, transfer.consignment_category)?;

        let shipment_id = TransferService::insert_shipment(&mut tx, id, self.actor).await?;
        TransferService::set_sent(&mut tx, id, next, total_boxes).await?;

        let ls = match self.mirrored(&transfer) {
            Some(cons_id) => Some(
                self.consignments
                    .set_status(cons_id, ConsignmentStatus::Sent)
                    .await?,
            ),
            None => None,
        };

        audit::enqueue(
            &mut tx,
            &self
                .event(id, AuditEventType::MarkSent, json!({ "boxes": total_boxes, "ls": ls }))
                .shipment(shipment_id)
                .after(json!({ "state": next.as_str(), "total_boxes": total_boxes })),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({ "id": id, "shipment_id": shipment_id, "ls": ls, "sync": self.sync() }))
    }

    pub async fn mark_receiving(&self, id: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        let next = transfer
            .state
            .apply(TransferEvent::MarkReceiving, transfer.consignment_category)?;
        TransferService::set_state(&mut tx, id, next).await?;

        let (ls, totals) = match self.mirrored(&transfer) {
            Some(cons_id) => self.consignments.prepare_receiving(cons_id).await?,
            None => (None, None),
        };

        audit::enqueue(
            &mut tx,
            &self
                .event(id, AuditEventType::MarkReceiving, json!({ "ls": ls, "totals": totals }))
                .after(json!({ "state": next.as_str() })),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({ "id": id, "ls": ls, "totals": totals, "sync": self.sync() }))
    }

    /// Close receiving: RECEIVED when every line is in, PARTIAL otherwise
    pub async fn complete_receiving(&self, id: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        let items = TransferService::items(&mut tx, id).await?;

        let outcome = receiving_outcome(items.iter().map(quantities));
        let fully_received = outcome == ReceivingOutcome::Complete;
        let next = transfer.state.apply(
            TransferEvent::CompleteReceiving { fully_received },
            transfer.consignment_category,
        )?;
        if outcome == ReceivingOutcome::NothingReceived {
            return Err(AppError::bad_request("NOTHING_RECEIVED"));
        }
        TransferService::set_state(&mut tx, id, next).await?;

        let ls = match self.mirrored(&transfer) {
            Some(cons_id) if fully_received => Some(
                self.consignments
                    .set_status(cons_id, ConsignmentStatus::Received)
                    .await?,
            ),
            _ => None,
        };

        audit::enqueue(
            &mut tx,
            &self
                .event(
                    id,
                    AuditEventType::CompleteReceiving,
                    json!({ "fully_received": fully_received, "lines": items.len(), "ls": ls }),
                )
                .after(json!({ "state": next.as_str() })),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({ "id": id, "state": next.as_str(), "ls": ls, "sync": self.sync() }))
    }

    /// Receive every requested unit, then mirror the receipt and stock
    pub async fn receive_all(&self, id: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        let next = transfer
            .state
            .apply(TransferEvent::ReceiveAll, transfer.consignment_category)?;

        let mut lines_received = 0;
        for item in TransferService::items(&mut tx, id).await? {
            let current = quantities(&item);
            let received = current.received_in_full();
            if received != current {
                TransferService::set_item_qty(&mut tx, item.id, QtyField::Rec, received.received)
                    .await?;
                lines_received += 1;
            }
        }
        TransferService::set_state(&mut tx, id, next).await?;
        let receipt_id = TransferService::insert_receipt(&mut tx, id, self.actor).await?;

        let report = match self.mirrored(&transfer) {
            Some(cons_id) => {
                self.consignments
                    .receive_lines(cons_id, &transfer.outlet_to)
                    .await?
            }
            None => ReceiveReport::default(),
        };

        audit::enqueue(
            &mut tx,
            &self
                .event(
                    id,
                    AuditEventType::ReceiveAll,
                    json!({
                        "receipt_id": receipt_id,
                        "lines_received": lines_received,
                        "ls": report.steps,
                        "stock_updates": report.stock_updates,
                        "auto_fill": true,
                    }),
                )
                .after(json!({ "state": next.as_str() })),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({
            "id": id,
            "receipt_id": receipt_id,
            "ls": report.steps,
            "stock_updates": report.stock_updates,
            "sync": self.sync(),
        }))
    }

    pub async fn cancel(&self, id: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id).await?;
        let next = transfer
            .state
            .apply(TransferEvent::Cancel, transfer.consignment_category)?;
        TransferService::set_state(&mut tx, id, next).await?;

        let ls = match self.mirrored(&transfer) {
            Some(cons_id) => Some(self.consignments.cancel(cons_id).await?),
            None => None,
        };

        audit::enqueue(
            &mut tx,
            &self
                .event(id, AuditEventType::Cancel, json!({ "ls": ls }))
                .after(json!({ "state": next.as_str() })),
        )
        .await?;
        tx.commit().await?;

        Ok(json!({ "id": id, "ls": ls, "sync": self.sync() }))
    }

    // ------------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------------

    pub async fn add_note(&self, id: i64, text: &str) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        TransferService::lock(&mut tx, id).await?;
        let note_id = TransferService::insert_note(&mut tx, id, text, self.actor).await?;
        audit::enqueue(
            &mut tx,
            &self.event(id, AuditEventType::AddNote, json!({ "note_id": note_id, "text": text })),
        )
        .await?;
        tx.commit().await?;
        Ok(json!({ "id": id, "note_id": note_id }))
    }

    pub async fn delete_note(&self, id: i64, note_id: i64) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        TransferService::lock(&mut tx, id).await?;
        if !TransferService::delete_note(&mut tx, id, note_id).await? {
            return Err(AppError::NotFound("note".to_string()));
        }
        audit::enqueue(
            &mut tx,
            &self.event(id, AuditEventType::DeleteNote, json!({ "note_id": note_id })),
        )
        .await?;
        tx.commit().await?;
        Ok(json!({ "id": id, "note_id": note_id, "deleted": true }))
    }

    // ------------------------------------------------------------------------
    // Recreate
    // ------------------------------------------------------------------------

    /// Copy a finished transfer into a new OPEN one, carrying forward the
    /// best known quantity per product and every live note.
    pub async fn recreate(&self, id: i64, revert_stock: bool) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let original = TransferService::lock(&mut tx, id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::bad_request("TRANSFER_NOT_FOUND"),
                other => other,
            })?;
        if !original.state.can_recreate() {
            return Err(AppError::bad_request_with(
                "ONLY_COMPLETED_OR_CANCELLED_TRANSFERS_CAN_BE_RECREATED",
                json!({ "state": original.state.as_str() }),
            ));
        }

        let copy = TransferService::insert(
            &mut tx,
            &NewTransfer {
                public_id: generate_public_id(),
                category: original.consignment_category,
                creation_method: CreationMethod::Automated,
                outlet_from: original.outlet_from.clone(),
                outlet_to: original.outlet_to.clone(),
                supplier_id: original.supplier_id.clone(),
                created_by: self.actor,
                total_boxes: original.total_boxes,
            },
        )
        .await?;

        let items = TransferService::items(&mut tx, id).await?;
        let merged = merge_for_recreate(
            items
                .iter()
                .map(|item| (item.product_id.as_str(), quantities(item))),
        );
        for (product_id, qty) in &merged {
            TransferService::insert_item(&mut tx, copy.id, product_id, *qty).await?;
        }

        let notes = TransferService::note_texts(&mut tx, id).await?;
        for text in &notes {
            let copied = copied_note_text(&original.public_id, text);
            TransferService::insert_note(&mut tx, copy.id, &copied, self.actor).await?;
        }

        let user_name = TransferService::user_display_name(&mut tx, self.actor).await?;
        TransferService::insert_note(
            &mut tx,
            copy.id,
            &recreation_note_text(&original.public_id, &user_name),
            self.actor,
        )
        .await?;

        audit::enqueue(
            &mut tx,
            &self
                .event(
                    copy.id,
                    AuditEventType::RecreatedFrom(original.state),
                    json!({
                        "original_transfer_id": id,
                        "original_public_id": original.public_id,
                        "original_state": original.state.as_str(),
                        "items_copied": merged.len(),
                        "notes_copied": notes.len(),
                        "stock_reverted": revert_stock,
                    }),
                )
                .after(json!({ "state": TransferState::Open.as_str() })),
        )
        .await?;
        tx.commit().await?;

        let adjustments = if revert_stock && self.sync() {
            let sent = items
                .iter()
                .map(|item| (item.product_id.as_str(), item.qty_sent_total))
                .collect::<Vec<_>>();
            match self
                .consignments
                .adjust_stock(&original.outlet_from, sent, StockOperation::Add)
                .await
            {
                Ok(adjustments) => adjustments,
                Err(e) => {
                    tracing::warn!(transfer_id = id, error = %e, "Stock reversion skipped");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        tracing::info!(original_id = id, new_id = copy.id, "Transfer recreated");
        Ok(json!({
            "new_id": copy.id,
            "new_public_id": copy.public_id,
            "original_id": id,
            "items_copied": merged.len(),
            "notes_copied": notes.len(),
            "stock_reverted": revert_stock,
            "stock_adjustments_count": adjustments.len(),
            "message": format!("Transfer recreated successfully from {}", original.public_id),
        }))
    }

    // ------------------------------------------------------------------------
    // Reverts
    // ------------------------------------------------------------------------

    /// SENT back to OPEN; sent stock returns to the source outlet
    pub async fn revert_to_open(&self, id: i64) -> AppResult<Value> {
        self.revert(
            id,
            Revert {
                event: TransferEvent::RevertToOpen,
                external: |_| ConsignmentStatus::Open,
                restock: Restock::SentToSource,
                event_type: AuditEventType::RevertedToOpen,
                severity: AuditSeverity::Info,
                message: "Transfer reverted to OPEN. Inventory restored to source outlet.",
            },
        )
        .await
    }

    /// RECEIVING back to SENT; received stock leaves the destination
    pub async fn revert_to_sent(&self, id: i64) -> AppResult<Value> {
        self.revert(
            id,
            Revert {
                event: TransferEvent::RevertToSent,
                external: |category| match category {
                    TransferCategory::PurchaseOrder => ConsignmentStatus::StockOrder,
                    _ => ConsignmentStatus::Sent,
                },
                restock: Restock::ReceivedFromDestination,
                event_type: AuditEventType::RevertedToSent,
                severity: AuditSeverity::Info,
                message: "Transfer reverted. Receiving cancelled.",
            },
        )
        .await
    }

    /// PARTIAL back to RECEIVING; needs explicit confirmation because received
    /// stock is removed from the destination
    pub async fn revert_to_receiving(&self, id: i64, confirmed: bool) -> AppResult<Value> {
        if !confirmed {
            return Err(AppError::bad_request_with(
                "CONFIRMATION_REQUIRED",
                "confirm_inventory_removal must be true",
            ));
        }
        self.revert(
            id,
            Revert {
                event: TransferEvent::RevertToReceiving,
                external: |_| ConsignmentStatus::Receiving,
                restock: Restock::ReceivedFromDestination,
                event_type: AuditEventType::RevertedToReceiving,
                severity: AuditSeverity::Warning,
                message: "Transfer reverted to RECEIVING. Inventory removed from destination.",
            },
        )
        .await
    }

    async fn revert(&self, id: i64, revert: Revert) -> AppResult<Value> {
        let mut tx = self.store.begin().await?;
        let transfer = TransferService::lock(&mut tx, id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::bad_request("TRANSFER_NOT_FOUND"),
                other => other,
            })?;
        let next = transfer
            .state
            .apply(revert.event, transfer.consignment_category)?;
        let cons_id = transfer
            .vend_transfer_id
            .clone()
            .ok_or_else(|| AppError::bad_request("NO_LIGHTSPEED_CONSIGNMENT"))?;

        let external = (revert.external)(transfer.consignment_category);
        if self.sync() {
            self.consignments.require_status(&cons_id, external).await?;
        }

        let items = TransferService::items(&mut tx, id).await?;
        let adjustments = if self.sync() {
            let (outlet, operation) = match revert.restock {
                Restock::SentToSource => (&transfer.outlet_from, StockOperation::Add),
                Restock::ReceivedFromDestination => (&transfer.outlet_to, StockOperation::Subtract),
            };
            let lines = items.iter().map(|item| {
                let qty = match revert.restock {
                    Restock::SentToSource => item.qty_sent_total,
                    Restock::ReceivedFromDestination => item.qty_received_total,
                };
                (item.product_id.as_str(), qty)
            })
            .collect::<Vec<_>>();
            self.consignments.adjust_stock(outlet, lines, operation).await?
        } else {
            Vec::new()
        };

        if revert.restock == Restock::ReceivedFromDestination {
            TransferService::reset_received(&mut tx, id).await?;
        }
        TransferService::set_state(&mut tx, id, next).await?;

        let mut data = json!({ "adjustments": adjustments, "external_status": external });
        if revert.severity == AuditSeverity::Warning {
            data["warning"] = json!("INVENTORY_REMOVED");
        }
        audit::enqueue(
            &mut tx,
            &self
                .event(id, revert.event_type, data)
                .severity(revert.severity)
                .after(json!({ "state": next.as_str() })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(transfer_id = id, from = %transfer.state, to = %next, "Transfer reverted");
        Ok(json!({
            "id": id,
            "message": revert.message,
            "inventory_adjustments": adjustments,
            "new_status": next.as_str(),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restock {
    SentToSource,
    ReceivedFromDestination,
}

struct Revert {
    event: TransferEvent,
    external: fn(TransferCategory) -> ConsignmentStatus,
    restock: Restock,
    event_type: AuditEventType,
    severity: AuditSeverity,
    message: &'static str,
}
