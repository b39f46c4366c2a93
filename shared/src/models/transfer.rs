//! Transfer header, shipment, note and receipt models

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::TransferState;

/// Kind of stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferCategory {
    Stock,
    Juice,
    Staff,
    Return,
    PurchaseOrder,
}

impl TransferCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferCategory::Stock => "STOCK",
            TransferCategory::Juice => "JUICE",
            TransferCategory::Staff => "STAFF",
            TransferCategory::Return => "RETURN",
            TransferCategory::PurchaseOrder => "PURCHASE_ORDER",
        }
    }

    /// Consignment type used when mirroring this transfer
    pub fn consignment_type(&self) -> ConsignmentType {
        match self {
            TransferCategory::PurchaseOrder => ConsignmentType::Supplier,
            _ => ConsignmentType::Stock,
        }
    }
}

impl std::fmt::Display for TransferCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransferCategory {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" => Ok(TransferCategory::Stock),
            "JUICE" => Ok(TransferCategory::Juice),
            "STAFF" => Ok(TransferCategory::Staff),
            "RETURN" => Ok(TransferCategory::Return),
            "PURCHASE_ORDER" => Ok(TransferCategory::PurchaseOrder),
            other => Err(format!("unknown consignment category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreationMethod {
    Manual,
    Automated,
}

impl CreationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationMethod::Manual => "MANUAL",
            CreationMethod::Automated => "AUTOMATED",
        }
    }
}

/// Consignment type on the retail platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsignmentType {
    Supplier,
    Stock,
}

impl ConsignmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsignmentType::Supplier => "SUPPLIER",
            ConsignmentType::Stock => "STOCK",
        }
    }
}

/// A local transfer header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    /// Human-facing id, e.g. `TR-1a2b3c4d5e6f`
    pub public_id: String,
    pub consignment_category: TransferCategory,
    pub creation_method: CreationMethod,
    pub outlet_from: String,
    pub outlet_to: String,
    pub supplier_id: Option<String>,
    pub created_by: i64,
    /// Set once by the first successful external creation, then never changed
    pub vend_transfer_id: Option<String>,
    pub vend_number: Option<String>,
    pub state: TransferState,
    pub total_boxes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const PUBLIC_ID_PREFIX: &str = "TR-";

/// `TR-` followed by 12 lowercase hex characters
pub fn generate_public_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", PUBLIC_ID_PREFIX, hex)
}

pub fn is_valid_public_id(id: &str) -> bool {
    id.strip_prefix(PUBLIC_ID_PREFIX).map_or(false, |hex| {
        hex.len() == 12
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    })
}

/// Name given to the mirrored consignment
pub fn consignment_name(public_id: &str) -> String {
    format!("Transfer {}", public_id)
}

pub const SHIPMENT_STATUS_PACKED: &str = "packed";
pub const DELIVERY_MODE_AUTO: &str = "auto";

/// Text of a note carried over to a recreated transfer
pub fn copied_note_text(original_public_id: &str, text: &str) -> String {
    format!("[COPIED FROM {}] {}", original_public_id, text)
}

/// Automatic note added to every recreated transfer
pub fn recreation_note_text(original_public_id: &str, user_name: &str) -> String {
    format!(
        "Transfer manually recreated from {} by {}",
        original_public_id, user_name
    )
}

/// Display name for a user, falling back to `User #id` or `Unknown User`
pub fn display_user_name(user_id: i64, first: Option<&str>, last: Option<&str>) -> String {
    if user_id <= 0 {
        return "Unknown User".to_string();
    }
    let full = format!(
        "{} {}",
        first.unwrap_or("").trim(),
        last.unwrap_or("").trim()
    );
    let full = full.trim();
    if full.is_empty() {
        format!("User #{}", user_id)
    } else {
        full.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_id_format() {
        for _ in 0..50 {
            let id = generate_public_id();
            assert!(is_valid_public_id(&id), "bad id {}", id);
        }
        assert!(!is_valid_public_id("TR-ABCDEF123456"));
        assert!(!is_valid_public_id("T-240101-ABCDEF"));
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!(
            " purchase_order ".parse::<TransferCategory>().unwrap(),
            TransferCategory::PurchaseOrder
        );
        assert!("GIFT".parse::<TransferCategory>().is_err());
    }

    #[test]
    fn test_consignment_type() {
        assert_eq!(
            TransferCategory::PurchaseOrder.consignment_type(),
            ConsignmentType::Supplier
        );
        assert_eq!(
            TransferCategory::Juice.consignment_type(),
            ConsignmentType::Stock
        );
    }

    #[test]
    fn test_note_texts() {
        assert_eq!(
            copied_note_text("TR-000000000001", "fragile"),
            "[COPIED FROM TR-000000000001] fragile"
        );
        assert_eq!(
            recreation_note_text("TR-000000000001", "Ana Lee"),
            "Transfer manually recreated from TR-000000000001 by Ana Lee"
        );
    }

    #[test]
    fn test_display_user_name() {
        assert_eq!(display_user_name(0, None, None), "Unknown User");
        assert_eq!(display_user_name(7, Some(" "), None), "User #7");
        assert_eq!(display_user_name(7, Some("Ana"), Some("Lee")), "Ana Lee");
        assert_eq!(display_user_name(7, None, Some("Lee")), "Lee");
    }
}
