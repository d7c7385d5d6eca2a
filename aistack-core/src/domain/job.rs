//! Job domain types
//!
//! A job is one task-to-completion run of the Search → Generate → Test
//! pipeline. Its status only ever moves forward through the state machine
//! encoded in [`JobStatus::can_transition_to`]; once it reaches a terminal
//! status the record is frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Pipeline run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub task: String,
    pub keyword: String,
    pub status: JobStatus,
    /// Retries consumed by the current (or last) stage
    pub attempt_count: u32,
    /// Append-only record of finished stages
    pub stage_history: Vec<StageRecord>,
    /// Present only when `status == Succeeded`
    pub result: Option<JobResult>,
    /// Present only when `status == Failed`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Searching,
    Generating,
    Testing,
    Succeeded,
    Failed,
}

/// One of the three pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Search,
    Generate,
    Test,
}

/// Outcome of a finished stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Succeeded,
    Failed,
}

/// Entry of a job's stage history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    /// Number of invocations the stage took, including the first one
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

/// Output of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub code: String,
    pub test_output: String,
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    /// `Succeeded` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the pipeline state machine
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (Pending, Searching)
                | (Searching, Generating)
                | (Generating, Testing)
                | (Testing, Succeeded)
                | (Pending | Searching | Generating | Testing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Searching => "SEARCHING",
            JobStatus::Generating => "GENERATING",
            JobStatus::Testing => "TESTING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Stage {
    /// Stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Search, Stage::Generate, Stage::Test];

    /// Status a job holds while this stage runs
    pub fn status(self) -> JobStatus {
        match self {
            Stage::Search => JobStatus::Searching,
            Stage::Generate => JobStatus::Generating,
            Stage::Test => JobStatus::Testing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Search => "search",
            Stage::Generate => "generate",
            Stage::Test => "test",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Job {
    /// Creates a `Pending` job for the given task
    pub fn new(task: impl Into<String>, keyword: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            keyword: keyword.into(),
            status: JobStatus::Pending,
            attempt_count: 0,
            stage_history: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the job into the status of `stage`
    pub fn enter(&mut self, stage: Stage) -> Result<(), TransitionError> {
        self.transition(stage.status())?;
        self.attempt_count = 0;
        Ok(())
    }

    /// Notes that the running stage is on its `retries`-th retry
    pub fn note_retry(&mut self, retries: u32) {
        self.attempt_count = retries;
        self.updated_at = Utc::now();
    }

    /// Appends a finished stage to the history
    ///
    /// Only valid while the job is still in that stage.
    pub fn record_stage(
        &mut self,
        stage: Stage,
        outcome: StageOutcome,
        attempts: u32,
        detail: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.status != stage.status() {
            return Err(TransitionError {
                from: self.status,
                to: stage.status(),
            });
        }

        let now = Utc::now();
        self.attempt_count = attempts.saturating_sub(1);
        self.stage_history.push(StageRecord {
            stage,
            outcome,
            attempts,
            timestamp: now,
            detail,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Terminal success; status and result are set together
    pub fn succeed(&mut self, result: JobResult) -> Result<(), TransitionError> {
        self.transition(JobStatus::Succeeded)?;
        self.result = Some(result);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Terminal failure; status and error are set together
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Retries consumed across all finished stages
    pub fn total_retries(&self) -> u32 {
        self.stage_history
            .iter()
            .map(|record| record.attempts.saturating_sub(1))
            .sum()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_in_testing() -> Job {
        let mut job = Job::new("sum CSV column", "python csv pandas");
        for stage in Stage::ALL {
            job.enter(stage).unwrap();
            if stage != Stage::Test {
                job.record_stage(stage, StageOutcome::Succeeded, 1, None)
                    .unwrap();
            }
        }
        job
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new("task", "keyword");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.stage_history.is_empty());
        assert!(job.result.is_none());
        assert!(job.error.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job_in_testing();
        job.record_stage(Stage::Test, StageOutcome::Succeeded, 2, None)
            .unwrap();
        job.succeed(JobResult {
            code: "print(1)".to_string(),
            test_output: "1 passed".to_string(),
        })
        .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.stage_history.len(), 3);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(job.total_retries(), 1);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_cannot_skip_stages() {
        let mut job = Job::new("task", "keyword");
        assert!(job.enter(Stage::Generate).is_err());
        assert!(job.enter(Stage::Test).is_err());
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let mut job = Job::new("task", "keyword");
        job.fail("boom").unwrap();

        assert!(job.enter(Stage::Search).is_err());
        assert!(job.fail("again").is_err());
        assert_eq!(job.error.as_deref(), Some("boom"));

        let mut job = job_in_testing();
        job.succeed(JobResult {
            code: String::new(),
            test_output: String::new(),
        })
        .unwrap();
        assert!(job.enter(Stage::Search).is_err());
        assert!(job.fail("late").is_err());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_no_transition_back_to_pending() {
        for status in [
            JobStatus::Searching,
            JobStatus::Generating,
            JobStatus::Testing,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert!(!status.can_transition_to(JobStatus::Pending));
        }
        assert!(!JobStatus::Succeeded.can_transition_to(JobStatus::Searching));
    }

    #[test]
    fn test_record_stage_requires_matching_status() {
        let mut job = Job::new("task", "keyword");
        job.enter(Stage::Search).unwrap();
        assert!(
            job.record_stage(Stage::Generate, StageOutcome::Succeeded, 1, None)
                .is_err()
        );
        assert!(job.stage_history.is_empty());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&JobStatus::Generating).unwrap();
        assert_eq!(json, "\"GENERATING\"");
        let stage = serde_json::to_string(&Stage::Test).unwrap();
        assert_eq!(stage, "\"test\"");
    }
}
