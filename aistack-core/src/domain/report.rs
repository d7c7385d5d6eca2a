//! Daily report types

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::job::Stage;

/// Cost and outcome summary for one UTC day
///
/// Always recomputed from the ledger and job history, never stored as the
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub total_cost_micros: i64,
    pub total_cost: f64,
    pub job_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub cost_by_stage: BTreeMap<Stage, i64>,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
}
