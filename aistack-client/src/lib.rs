//! AI-Stack HTTP Client
//!
//! A typed HTTP client for the orchestrator API, used by the CLI and by
//! external schedulers that trigger jobs or request the daily report.
//!
//! # Example
//!
//! ```no_run
//! use aistack_client::OrchestratorClient;
//! use aistack_core::dto::job::TriggerJob;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let accepted = client.trigger(TriggerJob {
//!         task: "Write a function that reverses a string".to_string(),
//!         keyword: "python string reverse".to_string(),
//!     }).await?;
//!
//!     println!("Triggered job: {}", accepted.job_id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod finops;
mod jobs;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the orchestrator API
///
/// - Job lifecycle (trigger, status, lookup)
/// - FinOps (cost totals, daily report)
/// - Health
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Orchestrator returned {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.url("/status"), "http://localhost:8080/status");
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_is_a_request_error() {
        // Port 9 (discard) is closed on test machines
        let client = OrchestratorClient::new("http://127.0.0.1:9");
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed(_)));
    }
}
