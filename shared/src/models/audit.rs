//! Audit events recorded for every transfer mutation

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TransferState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    Create,
    StoreVendNumbers,
    CreateConsignment,
    CreateConsignmentLocal,
    AddItem,
    UpdateItem,
    UpdateItemQty,
    RemoveItem,
    PushLines,
    AddProductsToConsignment,
    MarkSent,
    MarkReceiving,
    CompleteReceiving,
    ReceiveAll,
    Cancel,
    AddNote,
    DeleteNote,
    RecreatedFrom(TransferState),
    RevertedToOpen,
    RevertedToSent,
    RevertedToReceiving,
}

impl AuditEventType {
    pub fn as_string(&self) -> String {
        let name = match self {
            AuditEventType::Create => "CREATE",
            AuditEventType::StoreVendNumbers => "STORE_VEND_NUMBERS",
            AuditEventType::CreateConsignment => "CREATE_CONSIGNMENT",
            AuditEventType::CreateConsignmentLocal => "CREATE_CONSIGNMENT_LOCAL",
            AuditEventType::AddItem => "ADD_ITEM",
            AuditEventType::UpdateItem => "UPDATE_ITEM",
            AuditEventType::UpdateItemQty => "UPDATE_ITEM_QTY",
            AuditEventType::RemoveItem => "REMOVE_ITEM",
            AuditEventType::PushLines => "PUSH_LINES",
            AuditEventType::AddProductsToConsignment => "ADD_PRODUCTS_TO_CONSIGNMENT",
            AuditEventType::MarkSent => "MARK_SENT",
            AuditEventType::MarkReceiving => "MARK_RECEIVING",
            AuditEventType::CompleteReceiving => "COMPLETE_RECEIVING",
            AuditEventType::ReceiveAll => "RECEIVE_ALL",
            AuditEventType::Cancel => "CANCEL",
            AuditEventType::AddNote => "ADD_NOTE",
            AuditEventType::DeleteNote => "DELETE_NOTE",
            AuditEventType::RecreatedFrom(state) => {
                return format!("RECREATED_FROM_{}", state.as_str())
            }
            AuditEventType::RevertedToOpen => "REVERTED_TO_OPEN",
            AuditEventType::RevertedToSent => "REVERTED_TO_SENT",
            AuditEventType::RevertedToReceiving => "REVERTED_TO_RECEIVING",
        };
        name.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    #[default]
    Info,
    Warning,
    Error,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
        }
    }
}

/// One audit record, written to the outbox inside the mutating transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub consignment_id: i64,
    pub event_type: String,
    pub event_data: Value,
    /// Snapshot of the fields the mutation changed
    pub audit_after: Option<Value>,
    pub item_id: Option<i64>,
    pub shipment_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    pub severity: AuditSeverity,
}

impl AuditEvent {
    pub fn new(consignment_id: i64, event_type: AuditEventType, event_data: Value) -> Self {
        Self {
            consignment_id,
            event_type: event_type.as_string(),
            event_data,
            audit_after: None,
            item_id: None,
            shipment_id: None,
            actor_user_id: None,
            severity: AuditSeverity::Info,
        }
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.audit_after = Some(snapshot);
        self
    }

    pub fn item(mut self, item_id: i64) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn shipment(mut self, shipment_id: i64) -> Self {
        self.shipment_id = Some(shipment_id);
        self
    }

    pub fn actor(mut self, user_id: i64) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}
