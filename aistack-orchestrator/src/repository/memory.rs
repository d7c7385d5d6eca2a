//! In-memory repositories
//!
//! Process-local implementations of [`JobStore`] and [`CostLedger`] used by
//! the `memory` storage backend and by the test suite. Each write happens
//! under a single write-lock acquisition.

use std::collections::HashMap;

use aistack_core::domain::cost::{CostEntry, CostSummary};
use aistack_core::domain::job::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::repository::{CostLedger, JobStore, StoreError};

#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, Job>,
    /// Insertion order, oldest first
    order: Vec<Uuid>,
}

/// In-memory job store
#[derive(Default)]
pub struct InMemoryJobStore {
    table: RwLock<JobTable>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        match table.jobs.get_mut(&job.id) {
            Some(stored) if stored.is_terminal() => {
                debug!("Ignoring write to finished job {}", job.id);
            }
            Some(stored) => *stored = job.clone(),
            None => {
                table.jobs.insert(job.id, job.clone());
                table.order.push(job.id);
            }
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.table.read().await.jobs.get(&id).cloned())
    }

    async fn get_latest(&self) -> Result<Option<Job>, StoreError> {
        let table = self.table.read().await;

        // Later insertion wins ties on completed_at
        let latest = table
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| table.jobs.get(id).map(|job| (position, job)))
            .filter_map(|(position, job)| job.completed_at.map(|at| (at, position, job)))
            .max_by_key(|(at, position, _)| (*at, *position))
            .map(|(_, _, job)| job.clone());

        Ok(latest)
    }

    async fn get_current(&self) -> Result<Option<Job>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .order
            .last()
            .and_then(|id| table.jobs.get(id))
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.jobs.get(id))
            .filter(|job| !job.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let table = self.table.read().await;

        let mut jobs: Vec<Job> = table
            .order
            .iter()
            .filter_map(|id| table.jobs.get(id))
            .filter(|job| {
                job.completed_at
                    .is_some_and(|completed| completed >= start && completed < end)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.completed_at);

        Ok(jobs)
    }
}

/// In-memory cost ledger
#[derive(Default)]
pub struct InMemoryCostLedger {
    entries: RwLock<Vec<CostEntry>>,
}

impl InMemoryCostLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CostLedger for InMemoryCostLedger {
    async fn append(&self, entry: &CostEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CostEntry>, StoreError> {
        let mut entries: Vec<CostEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.timestamp >= start && entry.timestamp < end)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.timestamp, entry.id));

        Ok(entries)
    }

    async fn summary(&self, today_start: DateTime<Utc>) -> Result<CostSummary, StoreError> {
        let entries = self.entries.read().await;
        Ok(CostSummary::from_entries(entries.iter(), today_start))
    }
}
