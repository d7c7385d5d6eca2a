//! Cost domain types
//!
//! Amounts are integer micro-dollars so that ledger sums are exact and do not
//! depend on summation order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::Stage;

pub const MICROS_PER_USD: f64 = 1_000_000.0;

/// Resource usage attributed to one stage of one job
///
/// Immutable once written to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub stage: Stage,
    pub amount_micros: i64,
    /// Tokens for `generate`, milliseconds of compute for `test`
    pub quantity: i64,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ledger totals returned by `GET /cost`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_micros: i64,
    pub total_usd: f64,
    pub today_micros: i64,
    pub today_usd: f64,
    pub by_stage: BTreeMap<Stage, i64>,
    pub entry_count: i64,
}

impl CostEntry {
    pub fn new(
        job_id: Uuid,
        stage: Stage,
        amount_micros: i64,
        quantity: i64,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            stage,
            amount_micros,
            quantity,
            detail,
            timestamp: Utc::now(),
        }
    }

    pub fn amount_usd(&self) -> f64 {
        micros_to_usd(self.amount_micros)
    }
}

impl CostSummary {
    /// Folds ledger entries into totals; `today_start` bounds the `today` sum
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a CostEntry>,
        today_start: DateTime<Utc>,
    ) -> Self {
        let mut summary = CostSummary::default();

        for entry in entries {
            summary.total_micros += entry.amount_micros;
            if entry.timestamp >= today_start {
                summary.today_micros += entry.amount_micros;
            }
            *summary.by_stage.entry(entry.stage).or_insert(0) += entry.amount_micros;
            summary.entry_count += 1;
        }

        summary.total_usd = micros_to_usd(summary.total_micros);
        summary.today_usd = micros_to_usd(summary.today_micros);
        summary
    }
}

pub fn micros_to_usd(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_USD
}

pub fn usd_to_micros(usd: f64) -> i64 {
    (usd * MICROS_PER_USD).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_usd_conversion() {
        assert_eq!(usd_to_micros(0.0025), 2_500);
        assert_eq!(usd_to_micros(1.0), 1_000_000);
        assert_eq!(micros_to_usd(1_500_000), 1.5);
    }

    #[test]
    fn test_summary_from_entries() {
        let job_id = Uuid::new_v4();
        let today_start = Utc::now() - Duration::hours(1);

        let mut old = CostEntry::new(job_id, Stage::Generate, 700, 1200, None);
        old.timestamp = today_start - Duration::hours(3);
        let fresh = CostEntry::new(job_id, Stage::Generate, 300, 800, None);
        let test = CostEntry::new(job_id, Stage::Test, 50, 2_000, None);

        let summary = CostSummary::from_entries([&old, &fresh, &test], today_start);

        assert_eq!(summary.total_micros, 1_050);
        assert_eq!(summary.today_micros, 350);
        assert_eq!(summary.by_stage.get(&Stage::Generate), Some(&1_000));
        assert_eq!(summary.by_stage.get(&Stage::Test), Some(&50));
        assert_eq!(summary.entry_count, 3);
    }

    #[test]
    fn test_summary_serializes_stage_keys() {
        let entry = CostEntry::new(Uuid::new_v4(), Stage::Test, 10, 1, None);
        let summary = CostSummary::from_entries([&entry], Utc::now() - Duration::days(1));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["by_stage"]["test"], 10);
    }
}
