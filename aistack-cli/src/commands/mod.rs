//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod finops;
mod job;

use aistack_client::OrchestratorClient;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;
use uuid::Uuid;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a job
    Trigger {
        /// What the generated code must do
        #[arg(long)]
        task: String,

        /// Search query used to gather context
        #[arg(long)]
        keyword: String,

        /// Wait for the job to finish
        #[arg(short, long)]
        wait: bool,

        /// Seconds between status polls while waiting
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
    },
    /// Show the current job and batch summary, or one job
    Status {
        /// Job ID
        id: Option<Uuid>,
    },
    /// Show ledger totals
    Cost,
    /// Build and send the daily report
    Report {
        /// Day to report on (YYYY-MM-DD, default: yesterday UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Check that the orchestrator is up
    Health,
    /// Exit non-zero unless the last finished job succeeded
    BatchCheck,
}

/// Route a command to its handler
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        Commands::Trigger {
            task,
            keyword,
            wait,
            poll_interval,
        } => job::trigger(&client, task, keyword, wait, poll_interval).await,
        Commands::Status { id: Some(id) } => job::show_job(&client, id).await,
        Commands::Status { id: None } => job::show_status(&client).await,
        Commands::Cost => finops::show_cost(&client).await,
        Commands::Report { date } => finops::daily_report(&client, date).await,
        Commands::Health => job::health(&client).await,
        Commands::BatchCheck => job::batch_check(&client).await,
    }
}
