//! Repository Module
//!
//! Data access layer for the orchestrator: the job state store and the cost
//! ledger. Both are traits so the pipeline can run against postgres in
//! production and against the in-memory backend in development and tests.

pub mod cost;
pub mod job;
pub mod memory;

use aistack_core::domain::cost::{CostEntry, CostSummary};
use aistack_core::domain::job::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use cost::PgCostLedger;
pub use job::PgJobStore;
pub use memory::{InMemoryCostLedger, InMemoryJobStore};

/// Storage error shared by both repositories
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Current and historical job records
///
/// `put` replaces the whole record in one atomic write, so readers observe
/// either the previous or the new version of a job, never a mix. A stored
/// terminal record is final: later writes for the same ID are ignored.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or replaces a job
    async fn put(&self, job: &Job) -> Result<(), StoreError>;

    /// Finds a job by ID
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Most recently finished job
    async fn get_latest(&self) -> Result<Option<Job>, StoreError>;

    /// Most recently created job, finished or not
    async fn get_current(&self) -> Result<Option<Job>, StoreError>;

    /// Jobs that have not reached a terminal status, oldest first
    async fn list_active(&self) -> Result<Vec<Job>, StoreError>;

    /// Finished jobs with `start <= completed_at < end`, oldest first
    async fn list_completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError>;
}

/// Append-only cost ledger
#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn append(&self, entry: &CostEntry) -> Result<(), StoreError>;

    /// Entries with `start <= timestamp < end`, ordered by timestamp then ID
    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CostEntry>, StoreError>;

    /// Totals over the whole ledger; `today_start` bounds the daily figure
    async fn summary(&self, today_start: DateTime<Utc>) -> Result<CostSummary, StoreError>;
}
