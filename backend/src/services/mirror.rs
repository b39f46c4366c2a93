//! Health of the tables mirrored from Lightspeed
//!
//! Reports, per table, whether it exists, which of its required columns are
//! missing and how many rows it holds.

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::AppResult;

/// A mirrored table and the columns the transfer screens read from it
#[derive(Debug, Clone, Copy)]
pub struct MirrorTable {
    pub name: &'static str,
    pub required_columns: &'static [&'static str],
    pub critical: bool,
}

pub const MIRROR_TABLES: &[MirrorTable] = &[
    MirrorTable {
        name: "vend_outlets",
        required_columns: &["id", "name", "deleted_at"],
        critical: true,
    },
    MirrorTable {
        name: "vend_products",
        required_columns: &["id", "sku", "name"],
        critical: true,
    },
    MirrorTable {
        name: "vend_suppliers",
        required_columns: &["id", "name"],
        critical: false,
    },
];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ColumnInfo {
    #[sqlx(rename = "column_name")]
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "data_type")]
    pub data_type: String,
    #[sqlx(rename = "is_nullable")]
    pub nullable: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Ok,
    Empty,
    Incomplete,
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub name: &'static str,
    pub exists: bool,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub missing_columns: Vec<String>,
    pub critical: bool,
    pub status: TableStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorSummary {
    pub total_tables_checked: usize,
    pub tables_exist: usize,
    pub tables_missing: usize,
    pub critical_missing: usize,
    pub total_rows_all_tables: i64,
    pub error_count: usize,
    pub warning_count: usize,
    pub overall_status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    pub sync_enabled: bool,
    pub timestamp: String,
    pub tables: Vec<TableReport>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: MirrorSummary,
}

impl TableReport {
    /// Classify a table from its columns (`None` when the table is absent)
    /// and row count
    pub fn assess(table: &MirrorTable, columns: Option<Vec<ColumnInfo>>, row_count: i64) -> Self {
        let Some(columns) = columns else {
            return Self {
                name: table.name,
                exists: false,
                row_count: 0,
                columns: Vec::new(),
                missing_columns: Vec::new(),
                critical: table.critical,
                status: TableStatus::Missing,
            };
        };

        let missing_columns: Vec<String> = table
            .required_columns
            .iter()
            .filter(|required| !columns.iter().any(|c| c.name == **required))
            .map(|c| c.to_string())
            .collect();
        let status = if !missing_columns.is_empty() {
            TableStatus::Incomplete
        } else if row_count == 0 {
            TableStatus::Empty
        } else {
            TableStatus::Ok
        };

        Self {
            name: table.name,
            exists: true,
            row_count,
            columns,
            missing_columns,
            critical: table.critical,
            status,
        }
    }

    /// Error or warning line for this table, if any
    fn finding(&self) -> Option<(bool, String)> {
        match (self.status, self.critical) {
            (TableStatus::Missing, true) => Some((
                true,
                format!("Critical table '{}' does not exist in database", self.name),
            )),
            (TableStatus::Missing, false) => Some((
                false,
                format!("Optional table '{}' does not exist", self.name),
            )),
            (TableStatus::Incomplete, true) => Some((
                true,
                format!(
                    "Critical table '{}' is missing required columns: {}",
                    self.name,
                    self.missing_columns.join(", ")
                ),
            )),
            (TableStatus::Incomplete, false) => Some((
                false,
                format!(
                    "Table '{}' is missing columns: {}",
                    self.name,
                    self.missing_columns.join(", ")
                ),
            )),
            (TableStatus::Empty, true) => Some((
                false,
                format!("Critical table '{}' has no data", self.name),
            )),
            _ => None,
        }
    }
}

impl MirrorReport {
    pub fn build(sync_enabled: bool, tables: Vec<TableReport>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for table in &tables {
            match table.finding() {
                Some((true, message)) => errors.push(message),
                Some((false, message)) => warnings.push(message),
                None => {}
            }
        }

        let tables_exist = tables.iter().filter(|t| t.exists).count();
        let critical_missing = tables
            .iter()
            .filter(|t| t.critical && t.status == TableStatus::Missing)
            .count();
        let overall_status = if critical_missing > 0 {
            "critical"
        } else if !errors.is_empty() {
            "error"
        } else if !warnings.is_empty() {
            "warning"
        } else {
            "ok"
        };

        let summary = MirrorSummary {
            total_tables_checked: tables.len(),
            tables_exist,
            tables_missing: tables.len() - tables_exist,
            critical_missing,
            total_rows_all_tables: tables.iter().map(|t| t.row_count).sum(),
            error_count: errors.len(),
            warning_count: warnings.len(),
            overall_status,
        };

        Self {
            sync_enabled,
            timestamp: Utc::now().to_rfc3339(),
            tables,
            errors,
            warnings,
            summary,
        }
    }
}

/// Read-only inspection of the mirrored reference tables
#[derive(Clone)]
pub struct MirrorService {
    db: PgPool,
}

impl MirrorService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn verify(&self, sync_enabled: bool) -> AppResult<MirrorReport> {
        let mut tables = Vec::with_capacity(MIRROR_TABLES.len());
        for table in MIRROR_TABLES {
            let columns = self.columns(table.name).await?;
            let (columns, row_count) = if columns.is_empty() {
                (None, 0)
            } else {
                (Some(columns), self.row_count(table.name).await?)
            };
            tables.push(TableReport::assess(table, columns, row_count));
        }

        let report = MirrorReport::build(sync_enabled, tables);
        tracing::info!(
            status = report.summary.overall_status,
            errors = report.summary.error_count,
            warnings = report.summary.warning_count,
            "Mirror tables verified"
        );
        Ok(report)
    }

    async fn columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>> {
        let columns = sqlx::query_as::<_, ColumnInfo>(
            r#"
            SELECT column_name::TEXT AS column_name,
                   data_type::TEXT AS data_type,
                   is_nullable::TEXT AS is_nullable
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.db)
        .await?;
        Ok(columns)
    }

    async fn row_count(&self, table: &str) -> AppResult<i64> {
        // Table names come from MIRROR_TABLES
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: "text".to_string(),
            nullable: "YES".to_string(),
        }
    }

    fn outlets() -> &'static MirrorTable {
        &MIRROR_TABLES[0]
    }

    fn suppliers() -> &'static MirrorTable {
        &MIRROR_TABLES[2]
    }

    #[test]
    fn test_missing_critical_table_is_critical() {
        let report = MirrorReport::build(true, vec![TableReport::assess(outlets(), None, 0)]);
        assert_eq!(report.tables[0].status, TableStatus::Missing);
        assert_eq!(report.summary.critical_missing, 1);
        assert_eq!(report.summary.overall_status, "critical");
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_missing_column_on_critical_table_is_error() {
        let table = TableReport::assess(outlets(), Some(vec![column("id"), column("name")]), 4);
        assert_eq!(table.status, TableStatus::Incomplete);
        assert_eq!(table.missing_columns, vec!["deleted_at".to_string()]);

        let report = MirrorReport::build(false, vec![table]);
        assert_eq!(report.summary.overall_status, "error");
        assert!(report.errors[0].contains("deleted_at"));
    }

    #[test]
    fn test_empty_tables_warn_only_when_critical() {
        let cols = || Some(vec![column("id"), column("name"), column("deleted_at"), column("sku")]);
        let report = MirrorReport::build(
            true,
            vec![
                TableReport::assess(outlets(), cols(), 0),
                TableReport::assess(suppliers(), cols(), 0),
            ],
        );
        assert_eq!(report.warnings, vec!["Critical table 'vend_outlets' has no data".to_string()]);
        assert_eq!(report.summary.overall_status, "warning");
    }

    #[test]
    fn test_populated_tables_are_ok() {
        let report = MirrorReport::build(
            true,
            vec![TableReport::assess(suppliers(), Some(vec![column("id"), column("name")]), 12)],
        );
        assert_eq!(report.tables[0].status, TableStatus::Ok);
        assert_eq!(report.summary.total_rows_all_tables, 12);
        assert_eq!(report.summary.overall_status, "ok");
    }
}
