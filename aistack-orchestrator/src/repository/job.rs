//! Job Repository
//!
//! Postgres-backed job state store.

use aistack_core::domain::job::{Job, JobResult, JobStatus, StageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{JobStore, StoreError};

const JOB_COLUMNS: &str = r#"
    id, task, keyword, status, attempt_count, stage_history, result, error,
    created_at, updated_at, completed_at
"#;

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let stage_history = serde_json::to_value(&job.stage_history)?;
        let result = job.result.as_ref().map(serde_json::to_value).transpose()?;

        // Single statement: the row flips from one complete version to the next.
        // Finished rows are frozen.
        sqlx::query(
            r#"
            INSERT INTO jobs (id, task, keyword, status, attempt_count, stage_history,
                              result, error, created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                attempt_count = EXCLUDED.attempt_count,
                stage_history = EXCLUDED.stage_history,
                result = EXCLUDED.result,
                error = EXCLUDED.error,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at
            WHERE jobs.completed_at IS NULL
            "#,
        )
        .bind(job.id)
        .bind(&job.task)
        .bind(&job.keyword)
        .bind(job.status.as_str())
        .bind(job.attempt_count as i32)
        .bind(stage_history)
        .bind(result)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn get_latest(&self) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE completed_at IS NOT NULL
            ORDER BY completed_at DESC
            LIMIT 1
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn get_current(&self) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status NOT IN ($1, $2)
            ORDER BY created_at ASC
            "#
        ))
        .bind(JobStatus::Succeeded.as_str())
        .bind(JobStatus::Failed.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn list_completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE completed_at >= $1 AND completed_at < $2
            ORDER BY completed_at ASC
            "#
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn string_to_status(s: &str) -> Result<JobStatus, StoreError> {
    match s {
        "PENDING" => Ok(JobStatus::Pending),
        "SEARCHING" => Ok(JobStatus::Searching),
        "GENERATING" => Ok(JobStatus::Generating),
        "TESTING" => Ok(JobStatus::Testing),
        "SUCCEEDED" => Ok(JobStatus::Succeeded),
        "FAILED" => Ok(JobStatus::Failed),
        other => Err(StoreError::Corrupt(format!("unknown job status '{}'", other))),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    task: String,
    keyword: String,
    status: String,
    attempt_count: i32,
    stage_history: serde_json::Value,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let stage_history: Vec<StageRecord> = serde_json::from_value(row.stage_history)?;
        let result: Option<JobResult> = row.result.map(serde_json::from_value).transpose()?;

        Ok(Job {
            id: row.id,
            task: row.task,
            keyword: row.keyword,
            status: string_to_status(&row.status)?,
            attempt_count: row.attempt_count.max(0) as u32,
            stage_history,
            result,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_column_value() {
        for status in [
            JobStatus::Pending,
            JobStatus::Searching,
            JobStatus::Generating,
            JobStatus::Testing,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(string_to_status(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        assert!(matches!(
            string_to_status("Running"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_row_conversion_restores_history_and_result() {
        let now = Utc::now();
        let row = JobRow {
            id: Uuid::new_v4(),
            task: "sum CSV column".to_string(),
            keyword: "python csv pandas".to_string(),
            status: "SUCCEEDED".to_string(),
            attempt_count: 1,
            stage_history: serde_json::json!([{
                "stage": "search",
                "outcome": "succeeded",
                "attempts": 1,
                "timestamp": now,
                "detail": null
            }]),
            result: Some(serde_json::json!({ "code": "x = 1", "test_output": "1 passed" })),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };

        let job = Job::try_from(row).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.stage_history.len(), 1);
        assert_eq!(job.result.unwrap().test_output, "1 passed");
    }
}
