//! FinOps API endpoints

use aistack_core::domain::cost::CostSummary;
use aistack_core::domain::report::DailyReport;
use aistack_core::dto::report::ReportQuery;
use chrono::NaiveDate;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Ledger totals
    pub async fn cost(&self) -> Result<CostSummary> {
        let response = self.client.get(self.url("/cost")).send().await?;

        self.handle_response(response).await
    }

    /// Build and send the daily report
    ///
    /// Without a date the orchestrator reports on the previous UTC day.
    pub async fn daily_report(&self, date: Option<NaiveDate>) -> Result<DailyReport> {
        let response = self
            .client
            .post(self.url("/finops/daily-report"))
            .query(&ReportQuery { date })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
