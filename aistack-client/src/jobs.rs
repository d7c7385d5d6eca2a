//! Job-related API endpoints

use aistack_core::domain::job::Job;
use aistack_core::dto::job::{HealthResponse, StatusResponse, TriggerAccepted, TriggerJob};
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.url("/health")).send().await?;

        self.handle_response(response).await
    }

    /// Start a job
    ///
    /// Fails with [`crate::ClientError::Busy`] while another job is in flight.
    pub async fn trigger(&self, req: TriggerJob) -> Result<TriggerAccepted> {
        let response = self
            .client
            .post(self.url("/trigger"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Current job, latest finished job and batch summary
    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self.client.get(self.url("/status")).send().await?;

        self.handle_response(response).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let response = self
            .client
            .get(self.url(&format!("/status/{}", job_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
