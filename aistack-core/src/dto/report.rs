//! Report DTOs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Query string of `POST /finops/daily-report`
///
/// The date defaults to the previous UTC day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportQuery {
    pub date: Option<NaiveDate>,
}
