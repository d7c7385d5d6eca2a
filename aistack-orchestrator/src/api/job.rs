//! Job API Handlers
//!
//! Trigger and status endpoints. Triggering never waits for the pipeline;
//! callers poll `/status` or `/status/{id}`.

use aistack_core::domain::job::Job;
use aistack_core::dto::job::{StatusResponse, TriggerAccepted, TriggerJob};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::status;

/// POST /trigger
/// Admit a job, or answer 409 while another one is running
pub async fn trigger(
    State(state): State<AppState>,
    Json(req): Json<TriggerJob>,
) -> ApiResult<(StatusCode, Json<TriggerAccepted>)> {
    tracing::info!("Trigger requested: {}", req.task);

    let accepted = state.coordinator.trigger(req).await.map_err(|e| {
        tracing::info!("Trigger rejected: {}", e);
        ApiError::from(e)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerAccepted {
            job_id: accepted.job.id,
            status: TriggerAccepted::ACCEPTED.to_string(),
        }),
    ))
}

/// GET /status
/// Newest job, newest finished job and the batch summary
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    tracing::debug!("Reading status");

    let response =
        status::snapshot(state.jobs.as_ref(), state.coordinator.is_busy(), Utc::now()).await?;

    Ok(Json(response))
}

/// GET /status/{id}
/// Get job details by ID
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = state
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", id)))?;

    Ok(Json(job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_state;
    use aistack_core::domain::job::JobStatus;
    use std::time::Duration;

    fn request(task: &str) -> Json<TriggerJob> {
        Json(TriggerJob {
            task: task.to_string(),
            keyword: "python csv pandas".to_string(),
        })
    }

    async fn wait_until_terminal(state: &AppState, id: Uuid) -> Job {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let Json(job) = get_job(State(state.clone()), Path(id)).await.unwrap();
                if job.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish")
    }

    #[tokio::test]
    async fn test_trigger_then_poll() {
        let state = test_state();

        let (code, Json(accepted)) = trigger(State(state.clone()), request("sum CSV column"))
            .await
            .unwrap();
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(accepted.status, "accepted");

        let job = wait_until_terminal(&state, accepted.job_id).await;
        assert_eq!(job.status, JobStatus::Succeeded);

        let Json(status) = get_status(State(state.clone())).await.unwrap();
        assert_eq!(status.latest_terminal.unwrap().id, accepted.job_id);
        assert!(status.batch.is_success());
        assert_eq!(status.batch.run_count, 1);
    }

    #[tokio::test]
    async fn test_trigger_while_running_is_busy() {
        let state = test_state();

        let (_, Json(first)) = trigger(State(state.clone()), request("first"))
            .await
            .unwrap();
        // Nothing has yielded to the pipeline task yet, so the gate is held
        let second = trigger(State(state.clone()), request("second")).await;
        assert!(matches!(second, Err(ApiError::Busy(_))));

        wait_until_terminal(&state, first.job_id).await;
    }

    #[tokio::test]
    async fn test_empty_task_is_bad_request() {
        let state = test_state();
        let result = trigger(State(state), request("  ")).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let state = test_state();
        let result = get_job(State(state), Path(Uuid::new_v4())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_before_any_run() {
        let Json(status) = get_status(State(test_state())).await.unwrap();
        assert!(status.current.is_none());
        assert!(status.latest_terminal.is_none());
        assert!(!status.batch.is_running);
        assert!(!status.batch.is_success());
    }
}
