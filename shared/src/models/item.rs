//! Transfer line items and their quantity rules

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A product line on a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: i64,
    pub consignment_id: i64,
    pub product_id: String,
    pub qty_requested: i64,
    pub qty_sent_total: i64,
    pub qty_received_total: i64,
    pub confirmation_status: ConfirmationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    #[default]
    Pending,
    Confirmed,
    Discrepancy,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Pending => "pending",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::Discrepancy => "discrepancy",
        }
    }
}

/// Which quantity column an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QtyField {
    Req,
    Sent,
    Rec,
}

impl QtyField {
    /// Column backing this field
    pub fn column(&self) -> &'static str {
        match self {
            QtyField::Req => "qty_requested",
            QtyField::Sent => "qty_sent_total",
            QtyField::Rec => "qty_received_total",
        }
    }
}

impl std::str::FromStr for QtyField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "req" => Ok(QtyField::Req),
            "sent" => Ok(QtyField::Sent),
            "rec" => Ok(QtyField::Rec),
            other => Err(format!("unknown quantity field '{}'", other)),
        }
    }
}

/// The three quantity columns of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemQuantities {
    pub requested: i64,
    pub sent: i64,
    pub received: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QtyError {
    #[error("Received cannot exceed Sent/Requested ({value} > {cap})")]
    CapExceeded { value: i64, cap: i64 },
}

impl ItemQuantities {
    pub fn new(requested: i64, sent: i64, received: i64) -> Self {
        Self {
            requested,
            sent,
            received,
        }
    }

    /// Upper bound for the received quantity
    pub fn receive_cap(&self) -> i64 {
        self.sent.max(self.requested)
    }

    /// Set one column. Only an explicit received edit is checked against the
    /// cap; requested/sent edits may leave an older received value above it.
    pub fn with_field(self, field: QtyField, value: i64) -> Result<Self, QtyError> {
        let mut next = self;
        match field {
            QtyField::Req => next.requested = value,
            QtyField::Sent => next.sent = value,
            QtyField::Rec => {
                let cap = next.receive_cap();
                if value > cap {
                    return Err(QtyError::CapExceeded { value, cap });
                }
                next.received = value;
            }
        }
        Ok(next)
    }

    /// Quantities after a bulk "receive everything" on this line
    pub fn received_in_full(self) -> Self {
        if self.requested > 0 {
            Self {
                received: self.requested,
                ..self
            }
        } else {
            self
        }
    }

    /// Quantities a recreated transfer starts with. The best recorded figure
    /// wins: received, then sent, then requested. Nothing is received yet.
    pub fn carried_forward(self) -> Self {
        if self.received > 0 {
            Self::new(self.received, self.received, 0)
        } else if self.sent > 0 {
            Self::new(self.sent, self.sent, 0)
        } else {
            Self::new(self.requested, 0, 0)
        }
    }

    pub fn is_fully_received(&self) -> bool {
        self.received >= self.requested.max(self.sent)
    }
}

/// Result of closing out receiving for a whole transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivingOutcome {
    Complete,
    Partial,
    NothingReceived,
}

pub fn receiving_outcome<I>(lines: I) -> ReceivingOutcome
where
    I: IntoIterator<Item = ItemQuantities>,
{
    let mut any_received = false;
    let mut all_received = true;
    for line in lines {
        if line.received > 0 {
            any_received = true;
        }
        if !line.is_fully_received() {
            all_received = false;
        }
    }
    match (any_received, all_received) {
        (false, _) => ReceivingOutcome::NothingReceived,
        (true, true) => ReceivingOutcome::Complete,
        (true, false) => ReceivingOutcome::Partial,
    }
}

/// Merge lines per product for a recreated transfer, keeping first-seen order.
/// Duplicate product rows have their raw quantities summed before carry-forward.
pub fn merge_for_recreate<'a, I>(lines: I) -> Vec<(String, ItemQuantities)>
where
    I: IntoIterator<Item = (&'a str, ItemQuantities)>,
{
    let mut merged: Vec<(String, ItemQuantities)> = Vec::new();
    for (product_id, qty) in lines {
        match merged.iter_mut().find(|(pid, _)| pid == product_id) {
            Some((_, acc)) => {
                acc.requested += qty.requested;
                acc.sent += qty.sent;
                acc.received += qty.received;
            }
            None => merged.push((product_id.to_string(), qty)),
        }
    }
    merged
        .into_iter()
        .map(|(pid, qty)| (pid, qty.carried_forward()))
        .collect()
}
