//! Batch status summary
//!
//! External monitoring reads `last_status` and fails its check unless it is
//! `"success"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub is_running: bool,
    /// `"success"` or `"failed"` for the most recently finished job
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    /// Finished jobs in the current report cycle
    pub run_count: u64,
    /// Failed jobs in the current report cycle
    pub error_count: u64,
    /// Trailing failures in the current report cycle
    pub consecutive_errors: u64,
    pub health_score: f64,
}

impl BatchStatus {
    pub const SUCCESS: &'static str = "success";
    pub const FAILED: &'static str = "failed";

    pub fn is_success(&self) -> bool {
        self.last_status.as_deref() == Some(Self::SUCCESS)
    }
}
