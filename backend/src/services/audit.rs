//! Transfer audit trail
//!
//! Mutations call [`enqueue`] on their own transaction, so an audit row exists
//! exactly when the change commits. [`OutboxRelay`] then copies pending rows
//! into `consignment_logs` and `consignment_audit_log`, retrying failures with
//! exponential backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::AuditEvent;
use sqlx::{FromRow, PgConnection, PgPool};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::OutboxConfig;
use crate::error::AppResult;

const MAX_BACKOFF_SECS: i64 = 3600;

/// Write an audit event to the outbox on the caller's connection
pub async fn enqueue(conn: &mut PgConnection, event: &AuditEvent) -> AppResult<i64> {
    let trace_id = Uuid::new_v4().simple().to_string();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO consignment_audit_outbox
            (consignment_id, item_id, shipment_id, event_type, payload, audit_after,
             actor_user_id, severity, trace_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(event.consignment_id)
    .bind(event.item_id)
    .bind(event.shipment_id)
    .bind(&event.event_type)
    .bind(&event.event_data)
    .bind(&event.audit_after)
    .bind(event.actor_user_id)
    .bind(event.severity.as_str())
    .bind(&trace_id)
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(
        outbox_id = id,
        consignment_id = event.consignment_id,
        event_type = %event.event_type,
        "Audit event queued"
    );
    Ok(id)
}

/// Delay before the next delivery attempt: 2^attempts seconds, capped at an hour
pub fn backoff_delay(attempts: i32) -> chrono::Duration {
    let exp = attempts.clamp(0, 12) as u32;
    chrono::Duration::seconds(2_i64.pow(exp).min(MAX_BACKOFF_SECS))
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: i64,
    consignment_id: i64,
    item_id: Option<i64>,
    shipment_id: Option<i64>,
    event_type: String,
    payload: Value,
    audit_after: Option<Value>,
    actor_user_id: Option<i64>,
    severity: String,
    trace_id: String,
    attempts: i32,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

/// Background delivery of outbox rows to the audit tables
#[derive(Clone)]
pub struct OutboxRelay {
    db: PgPool,
    config: OutboxConfig,
}

impl OutboxRelay {
    pub fn new(db: PgPool, config: OutboxConfig) -> Self {
        Self { db, config }
    }

    /// Run relay passes until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.poll_interval_secs,
            batch_size = self.config.batch_size,
            "Audit outbox relay started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Audit outbox relay stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.relay_batch().await {
                        Ok(0) => tracing::trace!("Audit outbox: nothing to deliver"),
                        Ok(delivered) => tracing::debug!(delivered, "Audit outbox: delivered events"),
                        Err(e) => tracing::error!(error = %e, "Audit outbox: relay pass failed"),
                    }
                }
            }
        }
    }

    /// Deliver one batch of due events; returns how many were delivered
    pub async fn relay_batch(&self) -> AppResult<usize> {
        let due: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM consignment_audit_outbox
            WHERE delivered_at IS NULL
              AND attempts < $1
              AND next_attempt_at <= NOW()
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(self.config.max_attempts)
        .bind(self.config.batch_size)
        .fetch_all(&self.db)
        .await?;

        let mut delivered = 0;
        for id in due {
            if self.deliver_one(id).await? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn deliver_one(&self, id: i64) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, consignment_id, item_id, shipment_id, event_type, payload,
                   audit_after, actor_user_id, severity, trace_id, attempts, created_at
            FROM consignment_audit_outbox
            WHERE id = $1 AND delivered_at IS NULL
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        // Delivered or claimed by another relay in the meantime
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        match write_audit_rows(&mut tx, &row).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE consignment_audit_outbox SET delivered_at = NOW(), last_error = NULL WHERE id = $1",
                )
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(true)
            }
            Err(e) => {
                tx.rollback().await?;
                let attempts = row.attempts + 1;
                let next_attempt_at = Utc::now() + backoff_delay(attempts);
                if attempts >= self.config.max_attempts {
                    tracing::error!(
                        outbox_id = row.id,
                        attempts,
                        error = %e,
                        "Audit event exhausted delivery attempts"
                    );
                } else {
                    tracing::warn!(outbox_id = row.id, attempts, error = %e, "Audit delivery failed");
                }
                sqlx::query(
                    r#"
                    UPDATE consignment_audit_outbox
                    SET attempts = $2, last_error = $3, next_attempt_at = $4
                    WHERE id = $1
                    "#,
                )
                .bind(row.id)
                .bind(attempts)
                .bind(e.to_string())
                .bind(next_attempt_at)
                .execute(&self.db)
                .await?;
                Ok(false)
            }
        }
    }
}

async fn write_audit_rows(conn: &mut PgConnection, row: &OutboxRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO consignment_logs
            (consignment_id, shipment_id, item_id, event_type, event_data,
             actor_user_id, severity, source_system, trace_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'CIS', $8)
        "#,
    )
    .bind(row.consignment_id)
    .bind(row.shipment_id)
    .bind(row.item_id)
    .bind(&row.event_type)
    .bind(&row.payload)
    .bind(row.actor_user_id)
    .bind(&row.severity)
    .bind(&row.trace_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO consignment_audit_log
            (entity_type, entity_pk, consignment_pk, consignment_id, action, status,
             actor_type, user_id, data_after)
        VALUES ('transfer', $1, $1, $1, $2, 'success', 'user', $3, $4)
        "#,
    )
    .bind(row.consignment_id)
    .bind(&row.event_type)
    .bind(row.actor_user_id)
    .bind(&row.audit_after)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
