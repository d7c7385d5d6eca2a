//! Job DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::batch::BatchStatus;
use crate::domain::job::Job;

/// Body of `POST /trigger`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerJob {
    pub task: String,
    pub keyword: String,
}

/// `202 Accepted` body of `POST /trigger`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAccepted {
    pub job_id: Uuid,
    pub status: String,
}

/// `409 Conflict` body of `POST /trigger` while a job is in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerBusy {
    pub status: String,
    pub message: String,
}

/// Body of `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Most recently created job, possibly still running
    pub current: Option<Job>,
    /// Most recently finished job
    pub latest_terminal: Option<Job>,
    pub batch: BatchStatus,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl TriggerAccepted {
    pub const ACCEPTED: &'static str = "accepted";
}

impl TriggerBusy {
    pub const BUSY: &'static str = "busy";
}
