use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            task TEXT NOT NULL,
            keyword TEXT NOT NULL,
            status VARCHAR(20) NOT NULL,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            stage_history JSONB NOT NULL DEFAULT '[]',
            result JSONB,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create cost ledger table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cost_entries (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL,
            stage VARCHAR(20) NOT NULL,
            amount_micros BIGINT NOT NULL,
            quantity BIGINT NOT NULL DEFAULT 0,
            detail TEXT,
            timestamp TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for status polling and reporting windows
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_completed_at ON jobs(completed_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cost_entries_timestamp ON cost_entries(timestamp)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cost_entries_job_id ON cost_entries(job_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
