//! FinOps API Handlers
//!
//! Ledger totals and the daily report.

use aistack_core::domain::cost::CostSummary;
use aistack_core::domain::report::DailyReport;
use aistack_core::dto::report::ReportQuery;
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::report::{day_bounds, previous_day};

/// GET /cost
/// Totals over the whole ledger, plus today's spend
pub async fn cost(State(state): State<AppState>) -> ApiResult<Json<CostSummary>> {
    tracing::debug!("Reading cost summary");

    let (today_start, _) = day_bounds(Utc::now().date_naive())?;
    let summary = state.ledger.summary(today_start).await?;

    Ok(Json(summary))
}

/// POST /finops/daily-report
/// Build the report for `?date=` (default: yesterday, UTC) and send it out
pub async fn daily_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<DailyReport>> {
    let date = query.date.unwrap_or_else(|| previous_day(Utc::now()));
    tracing::info!("Building daily report for {}", date);

    let report = state.reports.run(date).await?;

    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::tests::{state_over, test_state};
    use crate::repository::{InMemoryCostLedger, JobStore, StoreError};
    use aistack_core::domain::cost::CostEntry;
    use aistack_core::domain::job::{Job, Stage};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::{DateTime, NaiveDate};
    use uuid::Uuid;

    /// Job store whose reads all fail
    struct UnreachableJobStore;

    fn unreachable() -> StoreError {
        StoreError::Corrupt("job store unreachable".to_string())
    }

    #[async_trait]
    impl JobStore for UnreachableJobStore {
        async fn put(&self, _job: &Job) -> Result<(), StoreError> {
            Err(unreachable())
        }

        async fn get(&self, _id: Uuid) -> Result<Option<Job>, StoreError> {
            Err(unreachable())
        }

        async fn get_latest(&self) -> Result<Option<Job>, StoreError> {
            Err(unreachable())
        }

        async fn get_current(&self) -> Result<Option<Job>, StoreError> {
            Err(unreachable())
        }

        async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
            Err(unreachable())
        }

        async fn list_completed_between(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Job>, StoreError> {
            Err(unreachable())
        }
    }

    #[tokio::test]
    async fn test_cost_totals() {
        let state = test_state();
        let job_id = Uuid::new_v4();
        state
            .ledger
            .append(&CostEntry::new(job_id, Stage::Generate, 450, 1_500, None))
            .await
            .unwrap();
        state
            .ledger
            .append(&CostEntry::new(job_id, Stage::Test, 6, 2_000, None))
            .await
            .unwrap();

        let Json(summary) = cost(State(state)).await.unwrap();
        assert_eq!(summary.total_micros, 456);
        assert_eq!(summary.today_micros, 456);
        assert_eq!(summary.entry_count, 2);
    }

    #[tokio::test]
    async fn test_report_for_explicit_date() {
        let state = test_state();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

        let mut entry = CostEntry::new(Uuid::new_v4(), Stage::Generate, 1_234, 900, None);
        entry.timestamp = date.and_hms_opt(9, 30, 0).unwrap().and_utc();
        state.ledger.append(&entry).await.unwrap();

        let query = ReportQuery { date: Some(date) };
        let Json(first) = daily_report(State(state.clone()), Query(query.clone()))
            .await
            .unwrap();
        let Json(second) = daily_report(State(state), Query(query)).await.unwrap();

        assert_eq!(first.date, date);
        assert_eq!(first.total_cost_micros, 1_234);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_report_defaults_to_yesterday() {
        let Json(report) = daily_report(State(test_state()), Query(ReportQuery::default()))
            .await
            .unwrap();
        assert_eq!(report.date, previous_day(Utc::now()));
        assert_eq!(report.job_count, 0);
    }

    #[tokio::test]
    async fn test_report_store_failure_is_server_error() {
        let state = state_over(
            Arc::new(UnreachableJobStore),
            Arc::new(InMemoryCostLedger::new()),
        );

        let err = daily_report(State(state), Query(ReportQuery::default()))
            .await
            .unwrap_err();

        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
