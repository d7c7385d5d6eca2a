//! Notifier
//!
//! Outbound delivery of job outcomes and daily reports. Delivery is
//! best-effort: callers log a [`NotifyError`] and move on.

use std::sync::Arc;
use std::time::Duration;

use aistack_core::domain::cost::micros_to_usd;
use aistack_core::domain::job::{Job, JobStatus};
use aistack_core::domain::report::DailyReport;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::stages::truncate;

/// Characters of pytest output carried by a job notification
const NOTIFY_OUTPUT_CHARS: usize = 1_500;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected the message: HTTP {0}")]
    Rejected(u16),
}

/// Payload handed to a [`Notifier`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    JobSucceeded(JobSummary),
    JobFailed(JobSummary),
    DailyReport(DailyReport),
}

/// Job outcome as carried by a notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub task: String,
    pub status: JobStatus,
    pub retries: u32,
    pub error: Option<String>,
    pub test_output: Option<String>,
}

impl Notification {
    /// Builds the notification for a terminal job
    ///
    /// Returns `None` while the job is still running.
    pub fn for_job(job: &Job) -> Option<Self> {
        let summary = JobSummary {
            job_id: job.id,
            task: job.task.clone(),
            status: job.status,
            retries: job.total_retries(),
            error: job.error.clone(),
            test_output: job
                .result
                .as_ref()
                .map(|result| truncate(&result.test_output, NOTIFY_OUTPUT_CHARS)),
        };

        match job.status {
            JobStatus::Succeeded => Some(Notification::JobSucceeded(summary)),
            JobStatus::Failed => Some(Notification::JobFailed(summary)),
            _ => None,
        }
    }

    /// One-line human summary
    pub fn headline(&self) -> String {
        match self {
            Notification::JobSucceeded(job) if job.retries == 0 => {
                format!("Job {} completed successfully", job.job_id)
            }
            Notification::JobSucceeded(job) => {
                format!("Job {} succeeded after {} retries", job.job_id, job.retries)
            }
            Notification::JobFailed(job) => format!(
                "Job {} failed after {} retries: {}",
                job.job_id,
                job.retries,
                job.error.as_deref().unwrap_or("unknown error")
            ),
            Notification::DailyReport(report) => format!(
                "Daily report {}: ${:.4} over {} job(s), {} alert(s)",
                report.date,
                micros_to_usd(report.total_cost_micros),
                report.job_count,
                report.alerts.len()
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sends `notification` on a detached task
///
/// The caller never waits on delivery; failures are logged.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            warn!("Failed to deliver notification: {}", e);
        }
    });
}

/// Posts notifications to a Slack incoming webhook
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&slack_message(notification))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes notifications to the log
///
/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::JobFailed(_) => warn!("{}", notification.headline()),
            _ => info!("{}", notification.headline()),
        }
        Ok(())
    }
}

/// Slack attachment body for a notification
fn slack_message(notification: &Notification) -> serde_json::Value {
    let (color, title) = match notification {
        Notification::JobSucceeded(job) if job.retries == 0 => ("good", "AI-Stack Job Success"),
        Notification::JobSucceeded(_) => ("warning", "AI-Stack Job Success (with retries)"),
        Notification::JobFailed(_) => ("danger", "AI-Stack Job Failed"),
        Notification::DailyReport(report) if !report.alerts.is_empty() => {
            ("warning", "AI-Stack Daily Cost Report")
        }
        Notification::DailyReport(_) => ("good", "AI-Stack Daily Cost Report"),
    };

    let detail = serde_json::to_string_pretty(notification).unwrap_or_default();

    json!({
        "attachments": [{
            "color": color,
            "title": title,
            "text": format!("{}\n```{}```", notification.headline(), detail),
            "footer": "AI-Stack",
            "ts": Utc::now().timestamp(),
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aistack_core::domain::job::{JobResult, Stage, StageOutcome};

    fn succeeded_job(test_attempts: u32) -> Job {
        let mut job = Job::new("sum CSV column", "python csv pandas");
        for stage in Stage::ALL {
            job.enter(stage).unwrap();
            let attempts = if stage == Stage::Test { test_attempts } else { 1 };
            job.record_stage(stage, StageOutcome::Succeeded, attempts, None)
                .unwrap();
        }
        job.succeed(JobResult {
            code: "x = 1".to_string(),
            test_output: "1 passed".to_string(),
        })
        .unwrap();
        job
    }

    #[test]
    fn test_running_job_has_no_notification() {
        let job = Job::new("task", "keyword");
        assert!(Notification::for_job(&job).is_none());
    }

    #[test]
    fn test_slack_colour_follows_retries() {
        let clean = Notification::for_job(&succeeded_job(1)).unwrap();
        assert_eq!(slack_message(&clean)["attachments"][0]["color"], "good");

        let retried = Notification::for_job(&succeeded_job(3)).unwrap();
        assert_eq!(slack_message(&retried)["attachments"][0]["color"], "warning");
        assert!(retried.headline().contains("after 2 retries"));
    }

    #[test]
    fn test_failed_job_counts_failed_stage_retries() {
        let mut job = Job::new("task", "keyword");
        job.enter(Stage::Search).unwrap();
        job.record_stage(Stage::Search, StageOutcome::Failed, 3, None)
            .unwrap();
        job.fail("search backend down").unwrap();

        let notification = Notification::for_job(&job).unwrap();
        let Notification::JobFailed(summary) = &notification else {
            panic!("expected failure payload");
        };
        assert_eq!(summary.retries, 2);
        assert_eq!(slack_message(&notification)["attachments"][0]["color"], "danger");
    }

    #[test]
    fn test_payload_is_tagged() {
        let notification = Notification::for_job(&succeeded_job(1)).unwrap();
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["kind"], "job_succeeded");
        assert_eq!(value["status"], "SUCCEEDED");
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notification = Notification::for_job(&succeeded_job(1)).unwrap();
        assert!(LogNotifier.notify(&notification).await.is_ok());
    }
}
