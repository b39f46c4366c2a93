//! External consignment vocabulary and line synchronisation planning

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Consignment status on the retail platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsignmentStatus {
    Open,
    Sent,
    Dispatched,
    Received,
    Cancelled,
    StockOrder,
    Receiving,
}

impl ConsignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsignmentStatus::Open => "OPEN",
            ConsignmentStatus::Sent => "SENT",
            ConsignmentStatus::Dispatched => "DISPATCHED",
            ConsignmentStatus::Received => "RECEIVED",
            ConsignmentStatus::Cancelled => "CANCELLED",
            ConsignmentStatus::StockOrder => "STOCK_ORDER",
            ConsignmentStatus::Receiving => "RECEIVING",
        }
    }
}

impl std::fmt::Display for ConsignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an outlet inventory adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockOperation {
    Add,
    Subtract,
}

impl StockOperation {
    /// New inventory count; subtraction never goes below zero
    pub fn apply(&self, current: i64, quantity: i64) -> i64 {
        match self {
            StockOperation::Add => current.saturating_add(quantity),
            StockOperation::Subtract => current.saturating_sub(quantity).max(0),
        }
    }
}

/// A line to be placed on a consignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsignmentLine {
    pub product_id: String,
    pub count: i64,
    pub cost: Option<Decimal>,
}

/// Sum requested quantities per product, dropping empty ids and non-positive
/// quantities. The first cost seen for a product is kept.
pub fn aggregate_lines<I>(lines: I) -> Vec<ConsignmentLine>
where
    I: IntoIterator<Item = ConsignmentLine>,
{
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, (i64, Option<Decimal>)> = BTreeMap::new();

    for line in lines {
        if line.count <= 0 || line.product_id.trim().is_empty() {
            continue;
        }
        let entry = totals.entry(line.product_id.clone()).or_insert_with(|| {
            order.push(line.product_id.clone());
            (0, None)
        });
        entry.0 += line.count;
        if entry.1.is_none() {
            entry.1 = line.cost;
        }
    }

    order
        .into_iter()
        .filter_map(|pid| {
            totals.remove(&pid).map(|(count, cost)| ConsignmentLine {
                product_id: pid,
                count,
                cost,
            })
        })
        .collect()
}

/// What to do with one desired line given the lines already on the consignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    Add(ConsignmentLine),
    Update(ConsignmentLine),
    Skip { product_id: String },
}

/// Diff desired lines against existing `(product_id, count)` pairs.
/// Missing products are added, differing counts updated, equal counts skipped.
pub fn plan_line_sync(
    desired: &[ConsignmentLine],
    existing: &BTreeMap<String, i64>,
) -> Vec<LineAction> {
    desired
        .iter()
        .map(|line| match existing.get(&line.product_id) {
            None => LineAction::Add(line.clone()),
            Some(count) if *count != line.count => LineAction::Update(line.clone()),
            Some(_) => LineAction::Skip {
                product_id: line.product_id.clone(),
            },
        })
        .collect()
}

/// Per-line failure reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    pub product_id: Option<String>,
    pub action: String,
    pub status: u16,
    pub message: String,
    pub success: bool,
}

/// Counters returned by line synchronisation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSyncSummary {
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: Vec<LineError>,
}

/// Outcome of one outlet stock adjustment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: String,
    pub outlet_id: String,
    pub operation: StockOperation,
    pub quantity: i64,
    pub previous_stock: Option<i64>,
    pub new_stock: Option<i64>,
    pub success: bool,
}
