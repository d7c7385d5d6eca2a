//! Reporting Aggregator
//!
//! Builds the daily cost and outcome report. The report is a pure function
//! of the ledger entries and the jobs finished inside one UTC day, so
//! producing it again for the same day yields the same figures.

use std::collections::BTreeMap;
use std::sync::Arc;

use aistack_core::domain::cost::{CostEntry, micros_to_usd, usd_to_micros};
use aistack_core::domain::job::{Job, JobStatus, Stage};
use aistack_core::domain::report::DailyReport;
use chrono::{DateTime, Days, NaiveDate, Utc};
use thiserror::Error;
use tracing::info;

use crate::repository::{CostLedger, JobStore, StoreError};
use crate::stages::notify::{self, Notification, Notifier};

/// Days used to project a day's spend onto a month
const DAYS_PER_MONTH: i64 = 30;
/// Average generate tokens per entry above which a cheaper model is suggested
const HEAVY_GENERATION_TOKENS: i64 = 2_000;
/// Daily test compute, in milliseconds, above which test trimming is suggested
const HEAVY_COMPUTE_MS: i64 = 3_600_000;

pub const OPTIMAL_USAGE: &str = "Usage patterns look optimal";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("date {0} is out of range")]
    InvalidDate(NaiveDate),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Budget thresholds, in micro-dollars
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub daily_micros: i64,
    pub monthly_micros: i64,
}

impl Budgets {
    pub fn from_usd(daily: f64, monthly: f64) -> Self {
        Self {
            daily_micros: usd_to_micros(daily),
            monthly_micros: usd_to_micros(monthly),
        }
    }
}

pub struct ReportAggregator {
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CostLedger>,
    notifier: Arc<dyn Notifier>,
    budgets: Budgets,
}

impl ReportAggregator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CostLedger>,
        notifier: Arc<dyn Notifier>,
        budgets: Budgets,
    ) -> Self {
        Self {
            jobs,
            ledger,
            notifier,
            budgets,
        }
    }

    /// Computes the report for `date` without side effects
    pub async fn build(&self, date: NaiveDate) -> Result<DailyReport, ReportError> {
        let (start, end) = day_bounds(date)?;

        let entries = self.ledger.query_range(start, end).await?;
        let jobs = self.jobs.list_completed_between(start, end).await?;

        Ok(build_report(date, &entries, &jobs, self.budgets))
    }

    /// Computes the report for `date` and hands it to the notifier
    pub async fn run(&self, date: NaiveDate) -> Result<DailyReport, ReportError> {
        let report = self.build(date).await?;

        info!(
            "Daily report for {}: ${:.4} over {} job(s) ({} succeeded, {} failed)",
            report.date,
            report.total_cost,
            report.job_count,
            report.success_count,
            report.failure_count
        );

        notify::dispatch(
            Arc::clone(&self.notifier),
            Notification::DailyReport(report.clone()),
        );
        Ok(report)
    }
}

/// The last complete report period
pub fn previous_day(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

/// `[00:00, 24:00)` of a UTC day
pub fn day_bounds(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or(ReportError::InvalidDate(date))?
        .and_utc();
    let end = date
        .checked_add_days(Days::new(1))
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .ok_or(ReportError::InvalidDate(date))?
        .and_utc();
    Ok((start, end))
}

/// Folds one day of ledger entries and finished jobs into a report
pub fn build_report(
    date: NaiveDate,
    entries: &[CostEntry],
    jobs: &[Job],
    budgets: Budgets,
) -> DailyReport {
    let mut cost_by_stage: BTreeMap<Stage, i64> = BTreeMap::new();
    for entry in entries {
        *cost_by_stage.entry(entry.stage).or_insert(0) += entry.amount_micros;
    }
    let total_cost_micros: i64 = cost_by_stage.values().sum();

    let count = |status: JobStatus| jobs.iter().filter(|job| job.status == status).count() as u64;

    DailyReport {
        date,
        total_cost_micros,
        total_cost: micros_to_usd(total_cost_micros),
        job_count: jobs.len() as u64,
        success_count: count(JobStatus::Succeeded),
        failure_count: count(JobStatus::Failed),
        cost_by_stage,
        alerts: budget_alerts(total_cost_micros, budgets),
        recommendations: recommendations(entries),
    }
}

fn budget_alerts(total: i64, budgets: Budgets) -> Vec<String> {
    let mut alerts = Vec::new();
    let daily = micros_to_usd(budgets.daily_micros);

    if total > budgets.daily_micros {
        alerts.push(format!(
            "Daily budget exceeded: ${:.2} > ${:.2}",
            micros_to_usd(total),
            daily
        ));
    }
    if total * 10 > budgets.daily_micros * 8 {
        alerts.push(format!(
            "Approaching daily budget: ${:.2} (80% of ${:.2})",
            micros_to_usd(total),
            daily
        ));
    }

    let projected = total * DAYS_PER_MONTH;
    if projected > budgets.monthly_micros {
        alerts.push(format!(
            "Projected monthly cost ${:.2} exceeds budget ${:.2}",
            micros_to_usd(projected),
            micros_to_usd(budgets.monthly_micros)
        ));
    }

    alerts
}

fn recommendations(entries: &[CostEntry]) -> Vec<String> {
    let mut recommendations = Vec::new();

    let generate: Vec<&CostEntry> = entries
        .iter()
        .filter(|entry| entry.stage == Stage::Generate)
        .collect();
    if !generate.is_empty() {
        let average = generate.iter().map(|entry| entry.quantity).sum::<i64>() / generate.len() as i64;
        if average > HEAVY_GENERATION_TOKENS {
            recommendations.push(format!(
                "Generation averaged {} tokens per job; consider gpt-4o-mini for simpler tasks",
                average
            ));
        }
    }

    let compute_ms: i64 = entries
        .iter()
        .filter(|entry| entry.stage == Stage::Test)
        .map(|entry| entry.quantity)
        .sum();
    if compute_ms > HEAVY_COMPUTE_MS {
        recommendations.push(format!(
            "Test runs took {:.1} minutes; consider shortening the batch",
            compute_ms as f64 / 60_000.0
        ));
    }

    if recommendations.is_empty() {
        recommendations.push(OPTIMAL_USAGE.to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryCostLedger, InMemoryJobStore};
    use crate::stages::LogNotifier;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn budgets() -> Budgets {
        Budgets::from_usd(10.0, 300.0)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn entry_at(stage: Stage, micros: i64, quantity: i64, at: DateTime<Utc>) -> CostEntry {
        let mut entry = CostEntry::new(Uuid::new_v4(), stage, micros, quantity, None);
        entry.timestamp = at;
        entry
    }

    fn finished_at(status: JobStatus, at: DateTime<Utc>) -> Job {
        let mut job = Job::new("task", "keyword");
        match status {
            JobStatus::Failed => job.fail("boom").unwrap(),
            _ => {
                for stage in Stage::ALL {
                    job.enter(stage).unwrap();
                }
                job.succeed(aistack_core::domain::job::JobResult {
                    code: String::new(),
                    test_output: String::new(),
                })
                .unwrap();
            }
        }
        job.completed_at = Some(at);
        job
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = day_bounds(date()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_previous_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 30, 0).unwrap();
        assert_eq!(previous_day(now), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn test_quiet_day() {
        let report = build_report(date(), &[], &[], budgets());
        assert_eq!(report.total_cost_micros, 0);
        assert_eq!(report.job_count, 0);
        assert!(report.alerts.is_empty());
        assert_eq!(report.recommendations, vec![OPTIMAL_USAGE.to_string()]);
    }

    #[test]
    fn test_alerts_follow_budgets() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();

        // $8.50: above 80% of $10, projects to $255
        let report = build_report(
            date(),
            &[entry_at(Stage::Generate, 8_500_000, 1_000, at)],
            &[],
            budgets(),
        );
        assert_eq!(report.alerts.len(), 1);
        assert!(report.alerts[0].starts_with("Approaching daily budget"));

        // $12: all three fire
        let report = build_report(
            date(),
            &[entry_at(Stage::Generate, 12_000_000, 1_000, at)],
            &[],
            budgets(),
        );
        assert_eq!(report.alerts.len(), 3);
        assert!(report.alerts[0].starts_with("Daily budget exceeded: $12.00"));
        assert!(report.alerts[2].starts_with("Projected monthly cost $360.00"));
    }

    #[test]
    fn test_recommendations() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let entries = vec![
            entry_at(Stage::Generate, 100, 3_000, at),
            entry_at(Stage::Generate, 100, 1_500, at),
            entry_at(Stage::Test, 10, 3_000_000, at),
            entry_at(Stage::Test, 10, 700_000, at),
        ];

        let report = build_report(date(), &entries, &[], budgets());
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].contains("2250 tokens"));
        assert!(report.recommendations[1].contains("61.7 minutes"));
    }

    #[tokio::test]
    async fn test_report_is_idempotent_and_bounded_to_the_day() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let ledger = Arc::new(InMemoryCostLedger::new());
        let (start, end) = day_bounds(date()).unwrap();

        for entry in [
            entry_at(Stage::Generate, 450, 1_500, start),
            entry_at(Stage::Test, 6, 2_000, start + Duration::hours(3)),
            entry_at(Stage::Generate, 1_000, 900, end),
            entry_at(Stage::Generate, 1_000, 900, start - Duration::seconds(1)),
        ] {
            ledger.append(&entry).await.unwrap();
        }
        for job in [
            finished_at(JobStatus::Succeeded, start + Duration::hours(1)),
            finished_at(JobStatus::Failed, start + Duration::hours(2)),
            finished_at(JobStatus::Failed, end),
        ] {
            jobs.put(&job).await.unwrap();
        }

        let aggregator = ReportAggregator::new(jobs, ledger, Arc::new(LogNotifier), budgets());
        let first = aggregator.run(date()).await.unwrap();
        let second = aggregator.run(date()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.total_cost_micros, 456);
        assert_eq!(first.cost_by_stage.get(&Stage::Generate), Some(&450));
        assert_eq!(first.job_count, 2);
        assert_eq!(first.success_count, 1);
        assert_eq!(first.failure_count, 1);
    }
}
