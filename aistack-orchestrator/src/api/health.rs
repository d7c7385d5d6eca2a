//! Health Check API Handler
//!
//! Liveness check. Touches neither the stores nor the concurrency gate, so
//! it answers while a pipeline is mid-run.

use aistack_core::dto::job::HealthResponse;
use axum::Json;
use chrono::Utc;

pub const SERVICE_NAME: &str = "aistack-orchestrator";

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_ok() {
        let Json(health) = health_check().await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.service, SERVICE_NAME);
    }
}
