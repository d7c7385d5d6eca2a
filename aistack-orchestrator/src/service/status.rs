//! Status snapshot
//!
//! What `GET /status` reports: the newest job, the newest finished job and
//! the batch summary that external monitoring checks.

use aistack_core::domain::batch::BatchStatus;
use aistack_core::domain::job::{Job, JobStatus};
use aistack_core::dto::job::StatusResponse;
use chrono::{DateTime, Days, Utc};

use crate::repository::{JobStore, StoreError};

/// Reads the store into a status response
///
/// The batch counters cover the current report cycle (the UTC day of
/// `now`); `last_*` fields follow the latest finished job overall.
pub async fn snapshot(
    jobs: &dyn JobStore,
    is_running: bool,
    now: DateTime<Utc>,
) -> Result<StatusResponse, StoreError> {
    let current = jobs.get_current().await?;
    let latest_terminal = jobs.get_latest().await?;

    let cycle_start = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    let cycle_end = cycle_start
        .checked_add_days(Days::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let cycle = jobs.list_completed_between(cycle_start, cycle_end).await?;

    let batch = batch_status(&cycle, latest_terminal.as_ref(), is_running);

    Ok(StatusResponse {
        current,
        latest_terminal,
        batch,
    })
}

/// Summarises a report cycle of finished jobs, oldest first
pub fn batch_status(cycle: &[Job], latest: Option<&Job>, is_running: bool) -> BatchStatus {
    let run_count = cycle.len() as u64;
    let error_count = cycle
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
        .count() as u64;
    let consecutive_errors = cycle
        .iter()
        .rev()
        .take_while(|job| job.status == JobStatus::Failed)
        .count() as u64;

    let last_status = latest.and_then(|job| match job.status {
        JobStatus::Succeeded => Some(BatchStatus::SUCCESS.to_string()),
        JobStatus::Failed => Some(BatchStatus::FAILED.to_string()),
        _ => None,
    });

    BatchStatus {
        is_running,
        last_status,
        last_error: latest.and_then(|job| job.error.clone()),
        last_run: latest.and_then(|job| job.completed_at),
        run_count,
        error_count,
        consecutive_errors,
        health_score: health_score(run_count, error_count, consecutive_errors),
    }
}

/// `1 - error_rate - min(0.2 * consecutive_errors, 0.8)`, floored at 0
pub fn health_score(run_count: u64, error_count: u64, consecutive_errors: u64) -> f64 {
    if run_count == 0 {
        return 1.0;
    }

    let error_rate = error_count as f64 / run_count as f64;
    let streak_penalty = (0.2 * consecutive_errors as f64).min(0.8);
    (1.0 - error_rate - streak_penalty).max(0.0)
}
