//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod finops;
pub mod health;
pub mod job;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::repository::{CostLedger, JobStore};
use crate::service::{Coordinator, ReportAggregator};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub reports: Arc<ReportAggregator>,
    pub jobs: Arc<dyn JobStore>,
    pub ledger: Arc<dyn CostLedger>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/trigger", post(job::trigger))
        .route("/status", get(job::get_status))
        .route("/status/{id}", get(job::get_job))
        // FinOps endpoints
        .route("/cost", get(finops::cost))
        .route("/finops/daily-report", post(finops::daily_report))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
