use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aistack_core::dto::job::TriggerJob;

use crate::config::{Config, StorageBackend};
use crate::repository::{
    CostLedger, InMemoryCostLedger, InMemoryJobStore, JobStore, PgCostLedger, PgJobStore,
};
use crate::service::pipeline::{RESTART_REASON, StageSet};
use crate::service::report::Budgets;
use crate::service::{Coordinator, ReportAggregator};
use crate::stages::{
    DuckDuckGoSearch, LogNotifier, Notifier, OpenAiGenerator, PytestRunner, SlackNotifier,
};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod stages;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aistack_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AI-Stack Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let (jobs, ledger) = open_stores(&config).await?;

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; every generate stage will fail");
    }

    let stages = StageSet {
        search: Arc::new(
            DuckDuckGoSearch::new(&config.search_api_base)
                .context("Failed to build search client")?,
        ),
        generator: Arc::new(
            OpenAiGenerator::new(
                &config.openai_api_base,
                config.openai_api_key.clone(),
                &config.openai_model,
            )
            .context("Failed to build generator client")?,
        ),
        tester: Arc::new(PytestRunner::new(&config.python_bin, config.test_timeout)),
    };

    let notifier: Arc<dyn Notifier> = match &config.slack_webhook_url {
        Some(url) => {
            info!("Notifications go to Slack");
            Arc::new(SlackNotifier::new(url).context("Failed to build Slack client")?)
        }
        None => {
            info!("SLACK_WEBHOOK_URL not set; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&jobs),
        Arc::clone(&ledger),
        stages,
        Arc::clone(&notifier),
        config.retry_policy(),
    ));
    // Unfinished jobs of a previous process can never complete
    let interrupted = coordinator
        .resolve_interrupted(RESTART_REASON)
        .await
        .context("Failed to resolve interrupted jobs")?;
    if !interrupted.is_empty() {
        warn!(
            "Failed {} job(s) interrupted by the previous shutdown",
            interrupted.len()
        );
    }

    let reports = Arc::new(ReportAggregator::new(
        Arc::clone(&jobs),
        Arc::clone(&ledger),
        notifier,
        Budgets::from_usd(config.daily_budget, config.monthly_budget),
    ));

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        coordinator: Arc::clone(&coordinator),
        reports,
        jobs,
        ledger,
    });

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    if let Some((task, keyword)) = config.startup_job() {
        info!("Triggering startup job: {}", task);
        if let Err(e) = coordinator.trigger(TriggerJob { task, keyword }).await {
            error!("Startup job was not accepted: {}", e);
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Waiting up to {:?} for the running job", config.shutdown_timeout);
    match coordinator.drain(config.shutdown_timeout).await {
        Ok(failed) => {
            for job in failed {
                warn!("Job {} failed by shutdown", job.id);
            }
        }
        Err(e) => error!("Failed to settle the running job: {}", e),
    }

    info!("Orchestrator stopped");
    Ok(())
}

async fn open_stores(
    config: &Config,
) -> anyhow::Result<(Arc<dyn JobStore>, Arc<dyn CostLedger>)> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
            let ledger: Arc<dyn CostLedger> = Arc::new(PgCostLedger::new(pool));
            Ok((jobs, ledger))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; jobs and costs are lost on restart");
            let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
            let ledger: Arc<dyn CostLedger> = Arc::new(InMemoryCostLedger::new());
            Ok((jobs, ledger))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
