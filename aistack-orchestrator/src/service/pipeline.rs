//! Pipeline Coordinator
//!
//! Drives one job through Search → Generate → Test. Every status change is
//! written to the job store as a whole record before the next step starts,
//! so pollers only ever see committed states.
//!
//! Each run executes on its own task under a supervisor task that owns the
//! gate permit. Whatever way the run ends (success, exhausted retries or a
//! panic) the supervisor leaves the job terminal, reopens the gate and only
//! then hands the outcome to the notifier.
//!
//! The gate only covers this process. Jobs left unfinished by a previous
//! process are failed with [`Coordinator::resolve_interrupted`] before any
//! trigger is admitted, and [`Coordinator::drain`] does the same for a run
//! that outlives the shutdown grace period.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use aistack_core::domain::cost::CostEntry;
use aistack_core::domain::job::{Job, JobResult, Stage, StageOutcome};
use aistack_core::dto::job::TriggerJob;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::{CostLedger, JobStore, StoreError};
use crate::service::gate::{ConcurrencyGate, GatePermit};
use crate::service::pricing;
use crate::service::retry::RetryPolicy;
use crate::stages::notify::{self, Notification, Notifier};
use crate::stages::search::{MAX_CONTEXT_CHARS, build_context};
use crate::stages::{
    CodeGenerator, GeneratedCode, SearchProvider, StageError, TestRunner, tail,
};

/// Pytest output carried by a failed-run error
const FAILED_RUN_OUTPUT_CHARS: usize = 1_000;
/// Upper bound on delivering a notification inline
const INLINE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Error of jobs found unfinished at boot
pub const RESTART_REASON: &str = "interrupted by restart";
/// Error of a job still running when the shutdown grace period ends
pub const SHUTDOWN_REASON: &str = "interrupted by shutdown";

/// The three stage executors of a pipeline run
pub struct StageSet {
    pub search: Arc<dyn SearchProvider>,
    pub generator: Arc<dyn CodeGenerator>,
    pub tester: Arc<dyn TestRunner>,
}

pub struct Coordinator {
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CostLedger>,
    stages: StageSet,
    notifier: Arc<dyn Notifier>,
    gate: ConcurrencyGate,
    retry: RetryPolicy,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    /// Another job holds the gate; not a fault
    #[error("a job is already running")]
    Busy,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The admission task died before reporting back
    #[error("job admission was interrupted")]
    Interrupted,
}

/// An admitted job
#[derive(Debug)]
pub struct Accepted {
    /// The job as first persisted (`PENDING`)
    pub job: Job,
    /// Resolves to the terminal job once the run is over
    pub completion: JoinHandle<Job>,
}

impl Coordinator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CostLedger>,
        stages: StageSet,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            jobs,
            ledger,
            stages,
            notifier,
            gate: ConcurrencyGate::new(),
            retry,
        }
    }

    /// Whether a pipeline run currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Admits a new job and starts its pipeline run in the background
    ///
    /// Never waits for the run. Returns [`TriggerError::Busy`] at once if
    /// another job is in flight.
    pub async fn trigger(self: &Arc<Self>, request: TriggerJob) -> Result<Accepted, TriggerError> {
        let task = request.task.trim();
        if task.is_empty() {
            return Err(TriggerError::InvalidRequest(
                "task must not be empty".to_string(),
            ));
        }

        let permit = self.gate.try_acquire().ok_or(TriggerError::Busy)?;
        let job = Job::new(task, request.keyword.trim());

        // Admission runs detached: once the PENDING record is written, the
        // run starts even if the caller has gone away.
        let (admitted_tx, admitted_rx) = oneshot::channel();
        let completion = tokio::spawn(Arc::clone(self).admit(job.clone(), permit, admitted_tx));

        match admitted_rx.await {
            Ok(Ok(())) => Ok(Accepted { job, completion }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TriggerError::Interrupted),
        }
    }

    /// Waits for the running job, failing it if `timeout` passes first
    ///
    /// Returns the jobs that had to be failed.
    pub async fn drain(&self, timeout: Duration) -> Result<Vec<Job>, StoreError> {
        match tokio::time::timeout(timeout, self.gate.wait_idle()).await {
            Ok(Some(_permit)) => {
                debug!("No job in flight");
                Ok(Vec::new())
            }
            _ => {
                warn!("A job is still running after {:?}", timeout);
                self.resolve_interrupted(SHUTDOWN_REASON).await
            }
        }
    }

    /// Fails every stored job that has not reached a terminal status
    ///
    /// At boot these are runs whose process stopped mid-pipeline; nothing
    /// will ever finish them.
    pub async fn resolve_interrupted(&self, reason: &str) -> Result<Vec<Job>, StoreError> {
        let active = self.jobs.list_active().await?;
        let mut resolved = Vec::with_capacity(active.len());

        for mut job in active {
            let left_in = job.status;
            if let Err(e) = job.fail(reason) {
                error!("Job {}: {}", job.id, e);
                continue;
            }
            self.jobs.put(&job).await?;
            warn!("Job {} was left {}; marked failed: {}", job.id, left_in, reason);

            if let Some(notification) = Notification::for_job(&job) {
                self.notify_inline(&notification).await;
            }
            resolved.push(job);
        }

        Ok(resolved)
    }

    async fn admit(
        self: Arc<Self>,
        job: Job,
        permit: GatePermit,
        admitted: oneshot::Sender<Result<(), StoreError>>,
    ) -> Job {
        if let Err(e) = self.jobs.put(&job).await {
            drop(permit);
            let _ = admitted.send(Err(e));
            return job;
        }

        info!("Job {} accepted: {}", job.id, job.task);
        // The caller may have gone; the run goes ahead regardless
        let _ = admitted.send(Ok(()));

        self.supervise(job, permit).await
    }

    async fn supervise(self: Arc<Self>, job: Job, permit: GatePermit) -> Job {
        let fallback = job.clone();
        let runner = Arc::clone(&self);

        let finished = match tokio::spawn(async move { runner.run(job).await }).await {
            Ok(job) => job,
            Err(e) => {
                let reason = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "pipeline task was cancelled".to_string()
                };
                error!("Job {} aborted: {}", fallback.id, reason);
                self.fail_aborted(fallback, &reason).await
            }
        };

        permit.release();

        if let Some(notification) = Notification::for_job(&finished) {
            notify::dispatch(Arc::clone(&self.notifier), notification);
        }

        finished
    }

    async fn run(&self, mut job: Job) -> Job {
        info!("Job {} started", job.id);

        // Search
        let keyword = job.keyword.clone();
        let (search, keyword) = (&self.stages.search, keyword.as_str());
        let Some(results) = self
            .run_stage(&mut job, Stage::Search, move |_| search.search(keyword))
            .await
        else {
            return job;
        };
        let context = build_context(&results, MAX_CONTEXT_CHARS);

        // Generate
        let task = job.task.clone();
        let (generator, task, context) = (&self.stages.generator, task.as_str(), context.as_str());
        let Some(generated) = self
            .run_stage(&mut job, Stage::Generate, move |_| {
                generator.generate(task, context)
            })
            .await
        else {
            return job;
        };
        self.record_generate_cost(job.id, &generated).await;

        // Test
        let compute_ms = AtomicU64::new(0);
        let (tester, code, compute) = (&self.stages.tester, generated.code.as_str(), &compute_ms);
        let tested = self
            .run_stage(&mut job, Stage::Test, move |_| async move {
                let report = tester.run(code).await?;
                let millis = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX);
                compute.fetch_add(millis, Ordering::Relaxed);

                if report.passed {
                    Ok(report)
                } else {
                    Err(StageError::transient(format!(
                        "tests failed:\n{}",
                        tail(&report.output, FAILED_RUN_OUTPUT_CHARS)
                    )))
                }
            })
            .await;
        // Compute is spent whether or not the tests pass
        self.record_compute_cost(job.id, Duration::from_millis(compute_ms.load(Ordering::Relaxed)))
            .await;
        let Some(report) = tested else {
            return job;
        };

        let result = JobResult {
            code: generated.code,
            test_output: report.output,
        };
        if let Err(e) = job.succeed(result) {
            self.abort(&mut job, e.to_string()).await;
            return job;
        }
        self.persist(&job).await;

        info!(
            "Job {} succeeded with {} retries",
            job.id,
            job.total_retries()
        );
        job
    }

    /// Runs one stage through the retry controller
    ///
    /// Returns `None` once the job has been failed and persisted.
    async fn run_stage<T, F, Fut>(&self, job: &mut Job, stage: Stage, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        if let Err(e) = job.enter(stage) {
            self.abort(job, e.to_string()).await;
            return None;
        }
        self.persist(job).await;
        info!("Job {} is {}", job.id, job.status);

        let snapshot = job.clone();
        let attempted = self
            .retry
            .execute(stage, |attempt| {
                let retrying = (attempt > 1).then(|| {
                    let mut retrying = snapshot.clone();
                    retrying.note_retry(attempt - 1);
                    retrying
                });
                let call = op(attempt);
                async move {
                    if let Some(retrying) = retrying {
                        self.persist(&retrying).await;
                    }
                    call.await
                }
            })
            .await;

        match attempted.result {
            Ok(value) => {
                if let Err(e) =
                    job.record_stage(stage, StageOutcome::Succeeded, attempted.attempts, None)
                {
                    self.abort(job, e.to_string()).await;
                    return None;
                }
                self.persist(job).await;
                debug!(
                    "Job {} finished {} in {} attempt(s)",
                    job.id, stage, attempted.attempts
                );
                Some(value)
            }
            Err(err) => {
                let message = err.to_string();
                error!(
                    "Job {} failed in {} after {} attempt(s): {}",
                    job.id, stage, attempted.attempts, message
                );

                if let Err(e) = job.record_stage(
                    stage,
                    StageOutcome::Failed,
                    attempted.attempts,
                    Some(message.clone()),
                ) {
                    warn!("Job {}: could not record failed stage: {}", job.id, e);
                }
                if let Err(e) = job.fail(message) {
                    error!("Job {}: {}", job.id, e);
                }
                self.persist(job).await;
                None
            }
        }
    }

    /// Fails a job whose state machine was violated
    async fn abort(&self, job: &mut Job, reason: String) {
        error!("Job {} aborted: {}", job.id, reason);
        if let Err(e) = job.fail(reason) {
            error!("Job {}: {}", job.id, e);
        }
        self.persist(job).await;
    }

    /// Fails a job whose run task died, starting from its last stored state
    async fn fail_aborted(&self, fallback: Job, reason: &str) -> Job {
        let mut job = match self.jobs.get(fallback.id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => fallback,
            Err(e) => {
                error!("Failed to load job {}: {}", fallback.id, e);
                fallback
            }
        };

        if job.is_terminal() {
            return job;
        }
        if let Err(e) = job.fail(format!("pipeline aborted: {}", reason)) {
            error!("Job {}: {}", job.id, e);
        }
        self.persist(&job).await;
        job
    }

    /// Delivers a notification before returning, bounded in time
    async fn notify_inline(&self, notification: &Notification) {
        match tokio::time::timeout(INLINE_NOTIFY_TIMEOUT, self.notifier.notify(notification)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to send {}: {}", notification.headline(), e),
            Err(_) => warn!("Timed out sending {}", notification.headline()),
        }
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.jobs.put(job).await {
            error!("Failed to persist job {} ({}): {}", job.id, job.status, e);
        }
    }

    async fn record_generate_cost(&self, job_id: Uuid, generated: &GeneratedCode) {
        let Some(usage) = generated.usage else {
            return;
        };

        let amount = pricing::token_cost_micros(&generated.model, usage);
        let tokens = i64::from(usage.prompt_tokens) + i64::from(usage.completion_tokens);
        let detail = format!(
            "{}: {} prompt + {} completion tokens",
            generated.model, usage.prompt_tokens, usage.completion_tokens
        );

        self.append_cost(CostEntry::new(
            job_id,
            Stage::Generate,
            amount,
            tokens,
            Some(detail),
        ))
        .await;
    }

    async fn record_compute_cost(&self, job_id: Uuid, compute: Duration) {
        if compute.is_zero() {
            return;
        }

        let amount = pricing::compute_cost_micros(compute);
        let millis = i64::try_from(compute.as_millis()).unwrap_or(i64::MAX);
        let detail = format!("shared-cpu-1x: {:.1}s of pytest", compute.as_secs_f64());

        self.append_cost(CostEntry::new(
            job_id,
            Stage::Test,
            amount,
            millis,
            Some(detail),
        ))
        .await;
    }

    /// Ledger writes never fail the pipeline
    async fn append_cost(&self, entry: CostEntry) {
        match self.ledger.append(&entry).await {
            Ok(()) => debug!(
                "Recorded {} micro-dollars for job {} ({})",
                entry.amount_micros, entry.job_id, entry.stage
            ),
            Err(e) => warn!(
                "Failed to append {} cost entry for job {}: {}",
                entry.stage, entry.job_id, e
            ),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage panicked".to_string()
    }
}
