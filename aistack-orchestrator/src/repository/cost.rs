//! Cost Repository
//!
//! Postgres-backed cost ledger. Rows are only ever inserted.

use aistack_core::domain::cost::{CostEntry, CostSummary, micros_to_usd};
use aistack_core::domain::job::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{CostLedger, StoreError};

pub struct PgCostLedger {
    pool: PgPool,
}

impl PgCostLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CostLedger for PgCostLedger {
    async fn append(&self, entry: &CostEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cost_entries (id, job_id, stage, amount_micros, quantity, detail, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.job_id)
        .bind(entry.stage.as_str())
        .bind(entry.amount_micros)
        .bind(entry.quantity)
        .bind(&entry.detail)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CostEntry>, StoreError> {
        let rows = sqlx::query_as::<_, CostRow>(
            r#"
            SELECT id, job_id, stage, amount_micros, quantity, detail, timestamp
            FROM cost_entries
            WHERE timestamp >= $1 AND timestamp < $2
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CostEntry::try_from).collect()
    }

    async fn summary(&self, today_start: DateTime<Utc>) -> Result<CostSummary, StoreError> {
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT stage,
                   COALESCE(SUM(amount_micros), 0)::BIGINT,
                   COALESCE(SUM(amount_micros) FILTER (WHERE timestamp >= $1), 0)::BIGINT,
                   COUNT(*)
            FROM cost_entries
            GROUP BY stage
            "#,
        )
        .bind(today_start)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = CostSummary::default();
        for (stage, total, today, count) in rows {
            summary.by_stage.insert(string_to_stage(&stage)?, total);
            summary.total_micros += total;
            summary.today_micros += today;
            summary.entry_count += count;
        }
        summary.total_usd = micros_to_usd(summary.total_micros);
        summary.today_usd = micros_to_usd(summary.today_micros);

        Ok(summary)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn string_to_stage(s: &str) -> Result<Stage, StoreError> {
    match s {
        "search" => Ok(Stage::Search),
        "generate" => Ok(Stage::Generate),
        "test" => Ok(Stage::Test),
        other => Err(StoreError::Corrupt(format!("unknown stage '{}'", other))),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct CostRow {
    id: Uuid,
    job_id: Uuid,
    stage: String,
    amount_micros: i64,
    quantity: i64,
    detail: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<CostRow> for CostEntry {
    type Error = StoreError;

    fn try_from(row: CostRow) -> Result<Self, Self::Error> {
        Ok(CostEntry {
            id: row.id,
            job_id: row.job_id,
            stage: string_to_stage(&row.stage)?,
            amount_micros: row.amount_micros,
            quantity: row.quantity,
            detail: row.detail,
            timestamp: row.timestamp,
        })
    }
}
