//! Transfer lifecycle state machine
//!
//! Every state change a handler performs goes through [`TransferState::apply`],
//! so the set of allowed transitions lives in one table instead of being
//! re-decided by each action.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TransferCategory;

/// Local state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Open,
    Packing,
    Packaged,
    Sent,
    Receiving,
    Partial,
    Received,
    Closed,
    Cancelled,
}

/// Events that move a transfer between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    StartPacking,
    MarkSent,
    MarkReceiving,
    /// Receiving finished; `fully_received` picks RECEIVED over PARTIAL
    CompleteReceiving { fully_received: bool },
    ReceiveAll,
    Cancel,
    RevertToOpen,
    RevertToSent,
    RevertToReceiving,
}

/// A refused transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: cannot apply {event:?} to a transfer in state {from}")]
pub struct TransitionError {
    pub code: &'static str,
    pub from: TransferState,
    pub event: TransferEvent,
}

impl TransferState {
    pub const ALL: [TransferState; 9] = [
        TransferState::Open,
        TransferState::Packing,
        TransferState::Packaged,
        TransferState::Sent,
        TransferState::Receiving,
        TransferState::Partial,
        TransferState::Received,
        TransferState::Closed,
        TransferState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Open => "OPEN",
            TransferState::Packing => "PACKING",
            TransferState::Packaged => "PACKAGED",
            TransferState::Sent => "SENT",
            TransferState::Receiving => "RECEIVING",
            TransferState::Partial => "PARTIAL",
            TransferState::Received => "RECEIVED",
            TransferState::Closed => "CLOSED",
            TransferState::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states: no item edits, but the transfer may be recreated
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TransferState::Received | TransferState::Closed | TransferState::Cancelled
        )
    }

    pub fn accepts_item_edits(&self) -> bool {
        !self.is_closed()
    }

    pub fn can_recreate(&self) -> bool {
        self.is_closed()
    }

    /// Coarse status shown in transfer lists
    pub fn list_status(&self) -> &'static str {
        match self {
            TransferState::Received | TransferState::Closed => "received",
            TransferState::Sent => "sent",
            TransferState::Cancelled => "cancelled",
            _ => "open",
        }
    }

    /// Apply an event, honouring category-specific guards
    pub fn apply(
        self,
        event: TransferEvent,
        category: TransferCategory,
    ) -> Result<TransferState, TransitionError> {
        use TransferState::*;

        let refuse = |code: &'static str| TransitionError {
            code,
            from: self,
            event,
        };

        match event {
            TransferEvent::StartPacking => match self {
                Open | Packing => Ok(Packing),
                _ => Err(refuse("INVALID_STATE_TRANSITION")),
            },
            TransferEvent::MarkSent => match self {
                Open | Packing | Packaged => Ok(Sent),
                _ => Err(refuse("INVALID_STATE_TRANSITION")),
            },
            TransferEvent::MarkReceiving => match self {
                Sent => Ok(Receiving),
                _ => Err(refuse("INVALID_STATE_TRANSITION")),
            },
            TransferEvent::CompleteReceiving { fully_received } => match self {
                Receiving if fully_received => Ok(Received),
                Receiving => Ok(Partial),
                _ => Err(refuse("INVALID_STATE_TRANSITION")),
            },
            TransferEvent::ReceiveAll => match self {
                Sent | Receiving | Partial => Ok(Received),
                _ => Err(refuse("INVALID_STATE_TRANSITION")),
            },
            TransferEvent::Cancel => match self {
                Open | Packing | Packaged | Sent => Ok(Cancelled),
                _ => Err(refuse("INVALID_STATE_TRANSITION")),
            },
            TransferEvent::RevertToOpen => {
                if self != Sent {
                    return Err(refuse("CAN_ONLY_REVERT_FROM_SENT"));
                }
                if category == TransferCategory::PurchaseOrder {
                    return Err(refuse("CANNOT_REVERT_PURCHASE_ORDERS"));
                }
                Ok(Open)
            }
            TransferEvent::RevertToSent => match self {
                Receiving => Ok(Sent),
                _ => Err(refuse("CAN_ONLY_REVERT_FROM_RECEIVING")),
            },
            TransferEvent::RevertToReceiving => match self {
                Partial => Ok(Receiving),
                _ => Err(refuse("CAN_ONLY_REVERT_FROM_PARTIAL")),
            },
        }
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransferState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transfer state '{}'", s))
    }
}
