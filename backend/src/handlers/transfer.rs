//! Transfer action handlers
//!
//! Each handler normalises its parameters from the action body and hands off
//! to [`TransferWorkflow`].

use serde_json::{json, Map, Value};
use shared::{
    as_flag, as_int, box_count, line_add_qty, line_edit_qty, positive_id, search_limit,
    search_query, value_str, Pagination, QtyField, TransferCategory,
};

use crate::error::{AppError, AppResult};
use crate::handlers::actions::RequestContext;
use crate::services::transfer::ListFilter;
use crate::services::workflow::{ConsignmentRequest, CreateTransferInput};
use crate::services::{ConsignmentSync, MirrorService, TransferService, TransferWorkflow};
use crate::AppState;

type Input = Map<String, Value>;

fn workflow(state: &AppState, ctx: &RequestContext) -> TransferWorkflow {
    TransferWorkflow::new(
        TransferService::new(state.db.clone()),
        ConsignmentSync::new(
            state.gateway.clone(),
            ctx.sync,
            state.sync.display_path(),
        ),
        state.config.lightspeed.clone(),
        ctx.user.user_id,
    )
}

fn text(input: &Input, key: &str) -> Option<String> {
    value_str(input.get(key))
}

/// `id` as a positive transfer id, or `code`
fn require_id(input: &Input, key: &str, code: &str) -> AppResult<i64> {
    positive_id(input.get(key)).ok_or_else(|| AppError::bad_request(code))
}

fn transfer_id(input: &Input) -> AppResult<i64> {
    require_id(input, "id", "INVALID_ID")
}

// ============================================================================
// Session and reads
// ============================================================================

pub async fn init(state: &AppState, ctx: &RequestContext) -> AppResult<Value> {
    let store = TransferService::new(state.db.clone());
    let outlet_map = store.outlet_map().await?;
    let supplier_map = store.supplier_map().await?;

    Ok(json!({
        "csrf_token": state.csrf.issue(&ctx.user.subject),
        "ls_consignment_base": format!("{}/consignments/", state.config.lightspeed.ui_base()),
        "outlet_map": outlet_map,
        "supplier_map": supplier_map,
        "sync_enabled": ctx.sync,
    }))
}

pub async fn toggle_sync(state: &AppState, input: &Input) -> AppResult<Value> {
    let enabled = as_flag(input.get("enabled"));
    state.sync.set_enabled(enabled).await?;
    Ok(json!({
        "sync": enabled,
        "persisted": true,
        "file": state.sync.display_path(),
    }))
}

/// Existence, columns and row counts of the mirrored Lightspeed tables
pub async fn verify_sync(state: &AppState, ctx: &RequestContext) -> AppResult<Value> {
    let report = MirrorService::new(state.db.clone()).verify(ctx.sync).await?;
    serde_json::to_value(report).map_err(|e| AppError::Internal(e.to_string()))
}

pub async fn list_transfers(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let page = Pagination::from_raw(
        input.get("page").map(|v| as_int(Some(v))),
        input.get("perPage").map(|v| as_int(Some(v))),
    );
    let filter = ListFilter {
        category: text(input, "type"),
        state: text(input, "state"),
        outlet: text(input, "outlet"),
        query: text(input, "q"),
    };
    workflow(state, ctx).list(filter, page).await
}

pub async fn get_transfer_detail(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).detail(id).await
}

pub async fn search_products(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let query = search_query(input.get("q"));
    let limit = search_limit(input.get("limit"));
    workflow(state, ctx).search_products(query, limit).await
}

// ============================================================================
// Header
// ============================================================================

pub async fn create_transfer(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let category = text(input, "consignment_category");
    let outlet_from = text(input, "outlet_from");
    let outlet_to = text(input, "outlet_to");

    let (Some(category), Some(outlet_from), Some(outlet_to)) = (category, outlet_from, outlet_to)
    else {
        return Err(AppError::bad_request("REQUIRED_FIELDS_MISSING"));
    };
    let category: TransferCategory = category
        .parse()
        .map_err(|e: String| AppError::bad_request_with("INVALID_CATEGORY", e))?;

    let input = CreateTransferInput {
        category,
        outlet_from,
        outlet_to,
        supplier_id: text(input, "supplier_id"),
    };
    workflow(state, ctx).create_transfer(input).await
}

pub async fn store_vend_numbers(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx)
        .store_vend_numbers(
            id,
            text(input, "vend_number"),
            text(input, "vend_transfer_id"),
        )
        .await
}

pub async fn create_consignment(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    let send = text(input, "status")
        .map(|s| s.eq_ignore_ascii_case("SENT"))
        .unwrap_or(false);
    let request = ConsignmentRequest {
        send,
        source_outlet: text(input, "source_outlet_id"),
        destination_outlet: text(input, "destination_outlet_id"),
    };
    workflow(state, ctx).create_consignment(id, request).await
}

// ============================================================================
// Items
// ============================================================================

pub async fn add_transfer_item(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = require_id(input, "id", "INVALID_TRANSFER_ID")?;
    let product_id =
        text(input, "product_id").ok_or_else(|| AppError::bad_request("INVALID_PRODUCT_ID"))?;
    let qty = line_add_qty(input.get("qty"));
    workflow(state, ctx).add_item(id, &product_id, qty).await
}

pub async fn update_transfer_item(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let (id, item_id) = item_target(input)?;
    let qty = line_edit_qty(input.get("qty_requested"));
    workflow(state, ctx).update_item(id, item_id, qty).await
}

pub async fn update_transfer_item_qty(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let (id, item_id) = item_target(input)?;
    let field: QtyField = input
        .get("field")
        .and_then(Value::as_str)
        .unwrap_or("")
        .parse()
        .map_err(|_| AppError::bad_request("INVALID_FIELD"))?;
    let value = line_edit_qty(input.get("value"));
    workflow(state, ctx)
        .update_item_qty(id, item_id, field, value)
        .await
}

pub async fn remove_transfer_item(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let item_id = require_id(input, "item_id", "INVALID_ITEM_ID")?;
    workflow(state, ctx).remove_item(item_id).await
}

fn item_target(input: &Input) -> AppResult<(i64, i64)> {
    match (positive_id(input.get("id")), positive_id(input.get("item_id"))) {
        (Some(id), Some(item_id)) => Ok((id, item_id)),
        _ => Err(AppError::bad_request("INVALID_INPUT")),
    }
}

// ============================================================================
// Consignment lines
// ============================================================================

pub async fn push_consignment_lines(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).push_lines(id).await
}

pub async fn add_products_to_consignment(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    let product_ids: Vec<String> = match input.get("product_ids") {
        Some(Value::Array(ids)) => ids.iter().filter_map(|v| value_str(Some(v))).collect(),
        _ => Vec::new(),
    };
    if product_ids.is_empty() {
        return Err(AppError::bad_request("NO_PRODUCTS"));
    }
    let counts: Vec<i64> = match input.get("quantities") {
        Some(Value::Array(qtys)) => qtys.iter().map(|v| as_int(Some(v))).collect(),
        _ => Vec::new(),
    };
    workflow(state, ctx).add_products(id, product_ids, counts).await
}

// ============================================================================
// Lifecycle
// ============================================================================

pub async fn mark_sent(state: &AppState, ctx: &RequestContext, input: &Input) -> AppResult<Value> {
    let id = transfer_id(input)?;
    let boxes = box_count(input.get("total_boxes")) as i32;
    workflow(state, ctx).mark_sent(id, boxes).await
}

pub async fn mark_receiving(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).mark_receiving(id).await
}

pub async fn complete_receiving(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).complete_receiving(id).await
}

pub async fn receive_all(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).receive_all(id).await
}

pub async fn cancel_transfer(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).cancel(id).await
}

// ============================================================================
// Notes
// ============================================================================

pub async fn add_note(state: &AppState, ctx: &RequestContext, input: &Input) -> AppResult<Value> {
    let id = positive_id(input.get("id"));
    let note = text(input, "note_text");
    let (Some(id), Some(note)) = (id, note) else {
        return Err(AppError::bad_request("INVALID_INPUT"));
    };
    workflow(state, ctx).add_note(id, &note).await
}

pub async fn delete_note(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = positive_id(input.get("id"));
    let note_id = positive_id(input.get("note_id"));
    let (Some(id), Some(note_id)) = (id, note_id) else {
        return Err(AppError::bad_request("INVALID_INPUT"));
    };
    workflow(state, ctx).delete_note(id, note_id).await
}

// ============================================================================
// Recreate and reverts
// ============================================================================

pub async fn recreate_transfer(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    let revert_stock = as_flag(input.get("revert_stock"));
    workflow(state, ctx).recreate(id, revert_stock).await
}

pub async fn revert_to_open(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).revert_to_open(id).await
}

pub async fn revert_to_sent(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    workflow(state, ctx).revert_to_sent(id).await
}

pub async fn revert_to_receiving(
    state: &AppState,
    ctx: &RequestContext,
    input: &Input,
) -> AppResult<Value> {
    let id = transfer_id(input)?;
    let confirmed = matches!(input.get("confirm_inventory_removal"), Some(Value::Bool(true)));
    workflow(state, ctx).revert_to_receiving(id, confirmed).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Input {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_transfer_id_rejects_non_positive() {
        assert_eq!(transfer_id(&body(json!({"id": "12"}))).unwrap(), 12);
        assert_eq!(
            transfer_id(&body(json!({"id": 0}))).unwrap_err().code(),
            "INVALID_ID"
        );
        assert_eq!(
            transfer_id(&body(json!({}))).unwrap_err().code(),
            "INVALID_ID"
        );
    }

    #[test]
    fn test_item_target_needs_both_ids() {
        assert_eq!(
            item_target(&body(json!({"id": 3, "item_id": 9}))).unwrap(),
            (3, 9)
        );
        assert_eq!(
            item_target(&body(json!({"id": 3}))).unwrap_err().code(),
            "INVALID_INPUT"
        );
    }

    #[test]
    fn test_text_trims_and_drops_blank() {
        let input = body(json!({"a": "  x ", "b": "   ", "c": 42}));
        assert_eq!(text(&input, "a").as_deref(), Some("x"));
        assert_eq!(text(&input, "b"), None);
        assert_eq!(text(&input, "c").as_deref(), Some("42"));
    }
}
