//! Transfer persistence
//!
//! Queries for transfers and their child rows. Anything that changes state
//! takes the caller's transaction so the change, the audit event and the row
//! lock commit together.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use shared::{
    display_user_name, ConfirmationStatus, ConsignmentLine, CreationMethod, ItemQuantities, Page,
    Pagination, QtyField, Transfer, TransferCategory, TransferItem, TransferState,
};

use crate::error::{AppError, AppResult};
use crate::external::lightspeed::CreatedConsignment;
use crate::services::consignment::ConsignmentLink;

/// Transfer service for all database access
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct TransferRow {
    id: i64,
    public_id: String,
    consignment_category: String,
    creation_method: String,
    outlet_from: String,
    outlet_to: String,
    supplier_id: Option<String>,
    created_by: i64,
    vend_transfer_id: Option<String>,
    vend_number: Option<String>,
    state: String,
    total_boxes: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = AppError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            AppError::Internal(format!("transfer {} has invalid {} '{}'", row.id, field, value))
        };
        let consignment_category = row
            .consignment_category
            .parse::<TransferCategory>()
            .map_err(|_| corrupt("category", &row.consignment_category))?;
        let state = row
            .state
            .parse::<TransferState>()
            .map_err(|_| corrupt("state", &row.state))?;
        let creation_method = match row.creation_method.as_str() {
            "AUTOMATED" => CreationMethod::Automated,
            _ => CreationMethod::Manual,
        };

        Ok(Transfer {
            id: row.id,
            public_id: row.public_id,
            consignment_category,
            creation_method,
            outlet_from: row.outlet_from,
            outlet_to: row.outlet_to,
            supplier_id: row.supplier_id,
            created_by: row.created_by,
            vend_transfer_id: row.vend_transfer_id,
            vend_number: row.vend_number,
            state,
            total_boxes: row.total_boxes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    consignment_id: i64,
    product_id: String,
    qty_requested: i64,
    qty_sent_total: i64,
    qty_received_total: i64,
    confirmation_status: String,
}

impl From<ItemRow> for TransferItem {
    fn from(row: ItemRow) -> Self {
        let confirmation_status = match row.confirmation_status.as_str() {
            "confirmed" => ConfirmationStatus::Confirmed,
            "discrepancy" => ConfirmationStatus::Discrepancy,
            _ => ConfirmationStatus::Pending,
        };
        TransferItem {
            id: row.id,
            consignment_id: row.consignment_id,
            product_id: row.product_id,
            qty_requested: row.qty_requested,
            qty_sent_total: row.qty_sent_total,
            qty_received_total: row.qty_received_total,
            confirmation_status,
        }
    }
}

/// Transfer with display labels, as shown in lists and detail views
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TransferView {
    pub id: i64,
    pub public_id: String,
    pub consignment_category: String,
    pub creation_method: String,
    pub outlet_from: String,
    pub outlet_to: String,
    pub supplier_id: Option<String>,
    pub outlet_from_name: Option<String>,
    pub outlet_to_name: Option<String>,
    pub outlet_from_label: String,
    pub outlet_to_label: String,
    pub supplier_from_name: Option<String>,
    pub vend_number: Option<String>,
    pub vend_transfer_id: Option<String>,
    pub state: String,
    pub total_boxes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List entry: the view plus its coarse status
#[derive(Debug, Clone, Serialize)]
pub struct TransferListEntry {
    #[serde(flatten)]
    pub transfer: TransferView,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ItemView {
    pub id: i64,
    pub product_id: String,
    pub sku: Option<String>,
    pub product_name: Option<String>,
    pub supply_price: Option<Decimal>,
    pub retail_price: Decimal,
    pub qty_requested: i64,
    pub qty_sent_total: i64,
    pub qty_received_total: i64,
    pub confirmation_status: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShipmentView {
    pub id: i64,
    pub status: String,
    pub delivery_mode: String,
    pub tracking_number: Option<String>,
    pub packed_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub packed_by: Option<i64>,
    pub packed_by_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NoteView {
    pub id: i64,
    pub note_text: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub created_by_name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
}

/// Filters accepted by the transfer list
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<String>,
    pub state: Option<String>,
    pub outlet: Option<String>,
    pub query: Option<String>,
}

/// Values for a new transfer header
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub public_id: String,
    pub category: TransferCategory,
    pub creation_method: CreationMethod,
    pub outlet_from: String,
    pub outlet_to: String,
    pub supplier_id: Option<String>,
    pub created_by: i64,
    pub total_boxes: i32,
}

const TRANSFER_COLUMNS: &str = "id, public_id, consignment_category, creation_method, outlet_from, \
     outlet_to, supplier_id, created_by, vend_transfer_id, vend_number, state, total_boxes, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, consignment_id, product_id, qty_requested, qty_sent_total, \
     qty_received_total, confirmation_status";

// Purchase orders take their source label from the supplier
const VIEW_SELECT: &str = r#"
    SELECT t.id, t.public_id, t.consignment_category, t.creation_method,
           t.outlet_from, t.outlet_to, t.supplier_id,
           vf.name AS outlet_from_name, vt.name AS outlet_to_name,
           COALESCE(
               CASE WHEN t.consignment_category = 'PURCHASE_ORDER' THEN NULLIF(vs.name, '')
                    ELSE NULLIF(vf.name, '') END,
               NULLIF(vf.store_code, ''), NULLIF(vf.physical_city, ''), t.outlet_from
           ) AS outlet_from_label,
           COALESCE(NULLIF(vt.name, ''), NULLIF(vt.store_code, ''), NULLIF(vt.physical_city, ''), t.outlet_to)
               AS outlet_to_label,
           NULLIF(vs.name, '') AS supplier_from_name,
           t.vend_number, t.vend_transfer_id, t.state, t.total_boxes, t.created_at, t.updated_at
"#;

const VIEW_FROM: &str = r#"
    FROM transfers t
    LEFT JOIN vend_outlets vf ON vf.id = t.outlet_from
        AND t.consignment_category <> 'PURCHASE_ORDER'
        AND vf.deleted_at IS NULL
    LEFT JOIN vend_outlets vt ON vt.id = t.outlet_to
        AND vt.deleted_at IS NULL
    LEFT JOIN vend_suppliers vs ON vs.id = COALESCE(t.supplier_id, t.outlet_from)
        AND t.consignment_category = 'PURCHASE_ORDER'
"#;

const USER_NAME_SQL: &str =
    "COALESCE(NULLIF(TRIM(CONCAT_WS(' ', u.first_name, u.last_name)), ''), NULLIF(u.email, ''))";

fn push_list_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ListFilter) {
    qb.push(" WHERE TRUE");
    if let Some(category) = &filter.category {
        qb.push(" AND t.consignment_category = ")
            .push_bind(category.clone());
    }
    if let Some(state) = &filter.state {
        qb.push(" AND t.state = ").push_bind(state.clone());
    }
    if let Some(outlet) = &filter.outlet {
        qb.push(" AND (t.outlet_from = ")
            .push_bind(outlet.clone())
            .push(" OR t.outlet_to = ")
            .push_bind(outlet.clone())
            .push(")");
    }
    if let Some(query) = &filter.query {
        let like = format!("%{}%", query);
        qb.push(" AND (");
        let mut separated = qb.separated(" OR ");
        for column in [
            "t.public_id",
            "t.vend_number",
            "t.vend_transfer_id",
            "vf.name",
            "vt.name",
            "vs.name",
        ] {
            separated
                .push(format!("{} ILIKE ", column))
                .push_bind_unseparated(like.clone());
        }
        qb.push(")");
    }
}

impl TransferService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        Ok(self.db.begin().await?)
    }

    // ------------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------------

    /// Load and row-lock a transfer for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: i64) -> AppResult<Transfer> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE id = $1 FOR UPDATE",
            TRANSFER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("transfer".to_string()))?;
        row.try_into()
    }

    pub async fn insert(conn: &mut PgConnection, new: &NewTransfer) -> AppResult<Transfer> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            r#"
            INSERT INTO transfers
                (public_id, consignment_category, creation_method, outlet_from, outlet_to,
                 supplier_id, created_by, total_boxes, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'OPEN')
            RETURNING {}
            "#,
            TRANSFER_COLUMNS
        ))
        .bind(&new.public_id)
        .bind(new.category.as_str())
        .bind(new.creation_method.as_str())
        .bind(&new.outlet_from)
        .bind(&new.outlet_to)
        .bind(&new.supplier_id)
        .bind(new.created_by)
        .bind(new.total_boxes)
        .fetch_one(&mut *conn)
        .await?;
        row.try_into()
    }

    pub async fn set_state(conn: &mut PgConnection, id: i64, state: TransferState) -> AppResult<()> {
        sqlx::query("UPDATE transfers SET state = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(state.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn set_sent(
        conn: &mut PgConnection,
        id: i64,
        state: TransferState,
        total_boxes: i32,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE transfers SET state = $2, total_boxes = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(state.as_str())
        .bind(total_boxes)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Record the consignment id unless one is already set. Returns the
    /// stored id when the claim was lost.
    pub async fn claim_vend_id(
        conn: &mut PgConnection,
        id: i64,
        created: &CreatedConsignment,
    ) -> AppResult<Option<String>> {
        let claimed = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE transfers
            SET vend_transfer_id = $2,
                vend_number = COALESCE($3, vend_number),
                updated_at = NOW()
            WHERE id = $1 AND vend_transfer_id IS NULL
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&created.id)
        .bind(&created.reference)
        .fetch_optional(&mut *conn)
        .await?;

        if claimed.is_some() {
            return Ok(None);
        }

        let existing = sqlx::query_scalar::<_, Option<String>>(
            "SELECT vend_transfer_id FROM transfers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .flatten();

        existing
            .map(Some)
            .ok_or_else(|| AppError::NotFound("transfer".to_string()))
    }

    /// Store external references. The consignment id only fills an empty slot.
    pub async fn store_vend_numbers(
        conn: &mut PgConnection,
        id: i64,
        vend_number: Option<&str>,
        vend_transfer_id: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET vend_number = COALESCE($2, vend_number),
                vend_transfer_id = COALESCE(vend_transfer_id, $3),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(vend_number)
        .bind(vend_transfer_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn list(&self, filter: &ListFilter, page: Pagination) -> AppResult<Page<TransferListEntry>> {
        let mut qb = QueryBuilder::<Postgres>::new(VIEW_SELECT);
        qb.push(VIEW_FROM);
        push_list_filters(&mut qb, filter);
        qb.push(" ORDER BY t.updated_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let views: Vec<TransferView> = qb.build_query_as::<TransferView>().fetch_all(&self.db).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        count.push(VIEW_FROM);
        push_list_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let rows = views
            .into_iter()
            .map(|transfer| {
                let status = transfer
                    .state
                    .parse::<TransferState>()
                    .map(|s| s.list_status())
                    .unwrap_or("open");
                TransferListEntry { transfer, status }
            })
            .collect();

        Ok(Page { rows, total })
    }

    pub async fn view(&self, id: i64) -> AppResult<Option<TransferView>> {
        let sql = format!("{} {} WHERE t.id = $1", VIEW_SELECT, VIEW_FROM);
        let view = sqlx::query_as::<_, TransferView>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(view)
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    pub async fn items(conn: &mut PgConnection, transfer_id: i64) -> AppResult<Vec<TransferItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM consignment_items WHERE consignment_id = $1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(TransferItem::from).collect())
    }

    /// Item by id, optionally scoped to a transfer, locked for update
    pub async fn lock_item(
        conn: &mut PgConnection,
        item_id: i64,
        transfer_id: Option<i64>,
    ) -> AppResult<TransferItem> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM consignment_items \
             WHERE id = $1 AND ($2::BIGINT IS NULL OR consignment_id = $2) FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(transfer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("item".to_string()))?;
        Ok(row.into())
    }

    /// Add a product line, or add to the requested quantity of an existing one
    pub async fn upsert_item(
        conn: &mut PgConnection,
        transfer_id: i64,
        product_id: &str,
        qty: i64,
    ) -> AppResult<TransferItem> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            INSERT INTO consignment_items (consignment_id, product_id, qty_requested)
            VALUES ($1, $2, $3)
            ON CONFLICT (consignment_id, product_id)
            DO UPDATE SET qty_requested = consignment_items.qty_requested + EXCLUDED.qty_requested,
                          updated_at = NOW()
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(transfer_id)
        .bind(product_id)
        .bind(qty)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.into())
    }

    /// Insert a line with all three quantities set
    pub async fn insert_item(
        conn: &mut PgConnection,
        transfer_id: i64,
        product_id: &str,
        qty: ItemQuantities,
    ) -> AppResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO consignment_items
                (consignment_id, product_id, qty_requested, qty_sent_total, qty_received_total)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(transfer_id)
        .bind(product_id)
        .bind(qty.requested)
        .bind(qty.sent)
        .bind(qty.received)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Transfer owning an item
    pub async fn item_owner(&self, item_id: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT consignment_id FROM consignment_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("item".to_string()))
    }

    pub async fn set_item_qty(
        conn: &mut PgConnection,
        item_id: i64,
        field: QtyField,
        value: i64,
    ) -> AppResult<()> {
        // Column names come from a closed enum
        let sql = format!(
            "UPDATE consignment_items SET {} = $2, updated_at = NOW() WHERE id = $1",
            field.column()
        );
        sqlx::query(&sql)
            .bind(item_id)
            .bind(value)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn delete_item(conn: &mut PgConnection, item_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM consignment_items WHERE id = $1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn reset_received(conn: &mut PgConnection, transfer_id: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE consignment_items SET qty_received_total = 0, updated_at = NOW() WHERE consignment_id = $1",
        )
        .bind(transfer_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Lines with a requested quantity, optionally priced at supply cost
    pub async fn consignment_lines(
        conn: &mut PgConnection,
        transfer_id: i64,
        with_cost: bool,
    ) -> AppResult<Vec<ConsignmentLine>> {
        let rows: Vec<(String, i64, Option<Decimal>)> = sqlx::query_as(
            r#"
            SELECT ci.product_id, ci.qty_requested, vp.supply_price
            FROM consignment_items ci
            LEFT JOIN vend_products vp ON vp.id = ci.product_id
            WHERE ci.consignment_id = $1 AND ci.qty_requested > 0
            ORDER BY ci.id
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, count, cost)| ConsignmentLine {
                product_id,
                count,
                cost: if with_cost { cost } else { None },
            })
            .collect())
    }

    pub async fn item_views(&self, transfer_id: i64) -> AppResult<Vec<ItemView>> {
        let items = sqlx::query_as::<_, ItemView>(
            r#"
            SELECT ci.id, ci.product_id, vp.sku, vp.name AS product_name, vp.supply_price,
                   COALESCE(vp.price_including_tax, vp.price_excluding_tax, 0) AS retail_price,
                   ci.qty_requested, ci.qty_sent_total, ci.qty_received_total,
                   ci.confirmation_status
            FROM consignment_items ci
            LEFT JOIN vend_products vp ON vp.id = ci.product_id
            WHERE ci.consignment_id = $1
            ORDER BY ci.id
            LIMIT 1000
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    // ------------------------------------------------------------------------
    // Shipments, receipts, notes
    // ------------------------------------------------------------------------

    pub async fn insert_shipment(
        conn: &mut PgConnection,
        transfer_id: i64,
        packed_by: i64,
    ) -> AppResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO consignment_shipments (consignment_id, status, delivery_mode, packed_at, packed_by)
            VALUES ($1, $2, $3, NOW(), $4)
            RETURNING id
            "#,
        )
        .bind(transfer_id)
        .bind(shared::SHIPMENT_STATUS_PACKED)
        .bind(shared::DELIVERY_MODE_AUTO)
        .bind(packed_by)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    pub async fn shipments(&self, transfer_id: i64) -> AppResult<Vec<ShipmentView>> {
        let sql = format!(
            r#"
            SELECT s.id, s.status, s.delivery_mode, s.tracking_number, s.packed_at,
                   s.received_at, s.packed_by,
                   COALESCE({}, s.packed_by::TEXT) AS packed_by_name
            FROM consignment_shipments s
            LEFT JOIN users u ON u.id = s.packed_by
            WHERE s.consignment_id = $1
            ORDER BY s.id DESC
            LIMIT 200
            "#,
            USER_NAME_SQL
        );
        let shipments = sqlx::query_as::<_, ShipmentView>(&sql)
            .bind(transfer_id)
            .fetch_all(&self.db)
            .await?;
        Ok(shipments)
    }

    pub async fn insert_receipt(
        conn: &mut PgConnection,
        transfer_id: i64,
        received_by: i64,
    ) -> AppResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO consignment_receipts (consignment_id, received_by) VALUES ($1, $2) RETURNING id",
        )
        .bind(transfer_id)
        .bind(received_by)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    pub async fn insert_note(
        conn: &mut PgConnection,
        transfer_id: i64,
        text: &str,
        created_by: i64,
    ) -> AppResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO consignment_notes (consignment_id, note_text, created_by) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(transfer_id)
        .bind(text)
        .bind(created_by)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Text of every live note, oldest first
    pub async fn note_texts(conn: &mut PgConnection, transfer_id: i64) -> AppResult<Vec<String>> {
        let texts = sqlx::query_scalar::<_, String>(
            r#"
            SELECT note_text FROM consignment_notes
            WHERE consignment_id = $1 AND deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(texts)
    }

    pub async fn notes(&self, transfer_id: i64) -> AppResult<Vec<NoteView>> {
        let sql = format!(
            r#"
            SELECT n.id, n.note_text, n.created_by, n.created_at,
                   COALESCE({}, n.created_by::TEXT) AS created_by_name
            FROM consignment_notes n
            LEFT JOIN users u ON u.id = n.created_by
            WHERE n.consignment_id = $1 AND n.deleted_at IS NULL
            ORDER BY n.id DESC
            LIMIT 100
            "#,
            USER_NAME_SQL
        );
        let notes = sqlx::query_as::<_, NoteView>(&sql)
            .bind(transfer_id)
            .fetch_all(&self.db)
            .await?;
        Ok(notes)
    }

    /// Soft-delete a note; false when it does not exist or is already deleted
    pub async fn delete_note(
        conn: &mut PgConnection,
        transfer_id: i64,
        note_id: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE consignment_notes SET deleted_at = NOW()
            WHERE id = $1 AND consignment_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(note_id)
        .bind(transfer_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------------
    // Reference data
    // ------------------------------------------------------------------------

    pub async fn product(conn: &mut PgConnection, product_id: &str) -> AppResult<Option<ProductSummary>> {
        let product = sqlx::query_as::<_, ProductSummary>(
            "SELECT id, name, sku FROM vend_products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(product)
    }

    pub async fn search_products(&self, query: &str, limit: i64) -> AppResult<Vec<ProductSummary>> {
        let like = format!("%{}%", query);
        let results = sqlx::query_as::<_, ProductSummary>(
            r#"
            SELECT id, name, sku FROM vend_products
            WHERE name ILIKE $1 OR sku ILIKE $1
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(like)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(results)
    }

    pub async fn supply_prices(&self, product_ids: &[String]) -> AppResult<HashMap<String, Decimal>> {
        let rows: Vec<(String, Option<Decimal>)> = sqlx::query_as(
            "SELECT id, supply_price FROM vend_products WHERE id = ANY($1)",
        )
        .bind(product_ids)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, price)| price.map(|p| (id, p)))
            .collect())
    }

    /// Outlet id to display label, for live outlets
    pub async fn outlet_map(&self) -> AppResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, COALESCE(NULLIF(name, ''), NULLIF(store_code, ''), NULLIF(physical_city, ''), id)
            FROM vend_outlets
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn supplier_map(&self) -> AppResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, COALESCE(NULLIF(name, ''), id) FROM vend_suppliers WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn user_display_name(conn: &mut PgConnection, user_id: i64) -> AppResult<String> {
        let row: Option<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT first_name, last_name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(match row {
            Some((first, last)) => display_user_name(user_id, first.as_deref(), last.as_deref()),
            None => display_user_name(0, None, None),
        })
    }
}

/// Quantities of a stored line
pub fn quantities(item: &TransferItem) -> ItemQuantities {
    ItemQuantities::new(item.qty_requested, item.qty_sent_total, item.qty_received_total)
}

/// A transfer row inside an open transaction, as the owner of its consignment id
pub struct TransferLink<'c> {
    conn: &'c mut PgConnection,
    transfer_id: i64,
    current: Option<String>,
}

impl<'c> TransferLink<'c> {
    pub fn new(conn: &'c mut PgConnection, transfer: &Transfer) -> Self {
        Self {
            conn,
            transfer_id: transfer.id,
            current: transfer.vend_transfer_id.clone(),
        }
    }
}

#[axum::async_trait]
impl ConsignmentLink for TransferLink<'_> {
    fn linked_id(&self) -> Option<String> {
        self.current.clone()
    }

    async fn claim(&mut self, created: &CreatedConsignment) -> AppResult<Option<String>> {
        let existing = TransferService::claim_vend_id(self.conn, self.transfer_id, created).await?;
        if existing.is_none() {
            self.current = Some(created.id.clone());
        }
        Ok(existing)
    }
}
