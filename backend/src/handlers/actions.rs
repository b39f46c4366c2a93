//! Single-endpoint action router
//!
//! Every transfer action is a POST whose JSON body names the `action`. The
//! legacy path also requires `?api=1`.

use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::handlers::transfer;
use crate::middleware::{AuthUser, CurrentUser};
use crate::response;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Init,
    ToggleSync,
    VerifySync,
    ListTransfers,
    GetTransferDetail,
    SearchProducts,
    CreateTransfer,
    StoreVendNumbers,
    CreateConsignment,
    AddTransferItem,
    UpdateTransferItem,
    UpdateTransferItemQty,
    RemoveTransferItem,
    PushConsignmentLines,
    AddProductsToConsignment,
    MarkSent,
    MarkReceiving,
    CompleteReceiving,
    ReceiveAll,
    CancelTransfer,
    AddNote,
    DeleteNote,
    RecreateTransfer,
    RevertToOpen,
    RevertToSent,
    RevertToReceiving,
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "init" => Action::Init,
            "toggle_sync" => Action::ToggleSync,
            "verify_sync" => Action::VerifySync,
            "list_transfers" => Action::ListTransfers,
            "get_transfer_detail" => Action::GetTransferDetail,
            "search_products" | "product_search" => Action::SearchProducts,
            "create_transfer" => Action::CreateTransfer,
            "store_vend_numbers" => Action::StoreVendNumbers,
            "create_consignment" => Action::CreateConsignment,
            "add_transfer_item" => Action::AddTransferItem,
            "update_transfer_item" => Action::UpdateTransferItem,
            "update_transfer_item_qty" => Action::UpdateTransferItemQty,
            "remove_transfer_item" => Action::RemoveTransferItem,
            "push_consignment_lines" => Action::PushConsignmentLines,
            "add_products_to_consignment" => Action::AddProductsToConsignment,
            "mark_sent" => Action::MarkSent,
            "mark_receiving" => Action::MarkReceiving,
            "complete_receiving" => Action::CompleteReceiving,
            "receive_all" => Action::ReceiveAll,
            "cancel_transfer" => Action::CancelTransfer,
            "add_note" => Action::AddNote,
            "delete_note" => Action::DeleteNote,
            "recreate_transfer" => Action::RecreateTransfer,
            "revert_to_open" => Action::RevertToOpen,
            "revert_to_sent" => Action::RevertToSent,
            "revert_to_receiving" => Action::RevertToReceiving,
            other => return Err(AppError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }
}

/// Per-request view of the caller and the sync switch
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub user: AuthUser,
    pub sync: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiQuery {
    pub api: Option<String>,
}

/// Parse the body as a JSON object. Anything else counts as an empty body.
pub fn parse_body(bytes: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// `POST /backend.php?api=1`
pub async fn legacy_dispatch(
    State(state): State<AppState>,
    Query(query): Query<ApiQuery>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Response {
    if query.api.as_deref() != Some("1") {
        return AppError::MethodNotAllowed("Use POST JSON to backend.php?api=1".to_string())
            .into_response();
    }
    into_response(run(state, user, &body).await)
}

/// `POST /api/v1/transfers`
pub async fn dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Response {
    into_response(run(state, user, &body).await)
}

/// Fallback for any non-POST method on the action endpoints
pub async fn method_not_allowed() -> Response {
    AppError::MethodNotAllowed("POST only".to_string()).into_response()
}

fn into_response(result: AppResult<Value>) -> Response {
    match result {
        Ok(data) => response::ok(data).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run(state: AppState, user: AuthUser, body: &[u8]) -> AppResult<Value> {
    let input = parse_body(body);
    let name = input
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    let action = Action::from_str(&name)?;

    if action != Action::Init {
        check_csrf(&state, &user, &input)?;
    }

    let ctx = RequestContext {
        sync: state.sync.is_enabled().await,
        user,
    };
    tracing::debug!(action = %name, user_id = ctx.user.user_id, sync = ctx.sync, "Dispatching action");

    match action {
        Action::Init => transfer::init(&state, &ctx).await,
        Action::ToggleSync => transfer::toggle_sync(&state, &input).await,
        Action::VerifySync => transfer::verify_sync(&state, &ctx).await,
        Action::ListTransfers => transfer::list_transfers(&state, &ctx, &input).await,
        Action::GetTransferDetail => transfer::get_transfer_detail(&state, &ctx, &input).await,
        Action::SearchProducts => transfer::search_products(&state, &ctx, &input).await,
        Action::CreateTransfer => transfer::create_transfer(&state, &ctx, &input).await,
        Action::StoreVendNumbers => transfer::store_vend_numbers(&state, &ctx, &input).await,
        Action::CreateConsignment => transfer::create_consignment(&state, &ctx, &input).await,
        Action::AddTransferItem => transfer::add_transfer_item(&state, &ctx, &input).await,
        Action::UpdateTransferItem => transfer::update_transfer_item(&state, &ctx, &input).await,
        Action::UpdateTransferItemQty => {
            transfer::update_transfer_item_qty(&state, &ctx, &input).await
        }
        Action::RemoveTransferItem => transfer::remove_transfer_item(&state, &ctx, &input).await,
        Action::PushConsignmentLines => {
            transfer::push_consignment_lines(&state, &ctx, &input).await
        }
        Action::AddProductsToConsignment => {
            transfer::add_products_to_consignment(&state, &ctx, &input).await
        }
        Action::MarkSent => transfer::mark_sent(&state, &ctx, &input).await,
        Action::MarkReceiving => transfer::mark_receiving(&state, &ctx, &input).await,
        Action::CompleteReceiving => transfer::complete_receiving(&state, &ctx, &input).await,
        Action::ReceiveAll => transfer::receive_all(&state, &ctx, &input).await,
        Action::CancelTransfer => transfer::cancel_transfer(&state, &ctx, &input).await,
        Action::AddNote => transfer::add_note(&state, &ctx, &input).await,
        Action::DeleteNote => transfer::delete_note(&state, &ctx, &input).await,
        Action::RecreateTransfer => transfer::recreate_transfer(&state, &ctx, &input).await,
        Action::RevertToOpen => transfer::revert_to_open(&state, &ctx, &input).await,
        Action::RevertToSent => transfer::revert_to_sent(&state, &ctx, &input).await,
        Action::RevertToReceiving => transfer::revert_to_receiving(&state, &ctx, &input).await,
    }
}

fn check_csrf(state: &AppState, user: &AuthUser, input: &Map<String, Value>) -> AppResult<()> {
    if state.config.security.allow_testing_bypass && shared::as_flag(input.get("testing")) {
        tracing::debug!(subject = %user.subject, "CSRF check bypassed for testing");
        return Ok(());
    }
    let token = input.get("csrf").and_then(Value::as_str).unwrap_or("");
    if state.csrf.verify(&user.subject, token) {
        Ok(())
    } else {
        Err(AppError::CsrfInvalid)
    }
}
