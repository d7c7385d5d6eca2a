//! Job command handlers
//!
//! Triggering jobs, showing their progress and the batch health check used
//! by external monitoring.

use std::time::Duration;

use aistack_client::OrchestratorClient;
use aistack_core::domain::batch::BatchStatus;
use aistack_core::domain::job::{Job, JobStatus, StageOutcome};
use aistack_core::dto::job::TriggerJob;
use anyhow::{Result, bail};
use colored::*;
use uuid::Uuid;

/// Start a job, optionally waiting for it to finish
pub async fn trigger(
    client: &OrchestratorClient,
    task: String,
    keyword: String,
    wait: bool,
    poll_interval: u64,
) -> Result<()> {
    let accepted = match client.trigger(TriggerJob { task, keyword }).await {
        Ok(accepted) => accepted,
        Err(e) if e.is_busy() => {
            println!("{}", format!("⚠ {}", e).yellow());
            bail!("job not started");
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} Job {} accepted",
        "✓".green(),
        accepted.job_id.to_string().cyan()
    );

    if !wait {
        return Ok(());
    }

    let job = wait_for_job(client, accepted.job_id, Duration::from_secs(poll_interval)).await?;
    println!();
    print_job_details(&job);

    if job.status == JobStatus::Failed {
        bail!("job {} failed", job.id);
    }
    Ok(())
}

/// Poll a job until it reaches a terminal status
async fn wait_for_job(client: &OrchestratorClient, id: Uuid, interval: Duration) -> Result<Job> {
    let mut last_status = None;

    loop {
        let job = client.get_job(id).await?;

        if last_status != Some(job.status) {
            println!("  {} {}", "▸".cyan(), colorize_status(&job.status));
            last_status = Some(job.status);
        }
        if job.is_terminal() {
            return Ok(job);
        }

        tokio::time::sleep(interval).await;
    }
}

/// Show the current job, the last finished job and the batch summary
pub async fn show_status(client: &OrchestratorClient) -> Result<()> {
    let status = client.status().await?;

    match &status.current {
        Some(job) => {
            println!("{}", "Current job:".bold());
            print_job_summary(job);
        }
        None => println!("{}", "No jobs yet.".yellow()),
    }

    if let Some(job) = &status.latest_terminal {
        if status.current.as_ref().map(|current| current.id) != Some(job.id) {
            println!("{}", "Last finished job:".bold());
            print_job_summary(job);
        }
    }

    print_batch(&status.batch);
    Ok(())
}

/// Show one job
pub async fn show_job(client: &OrchestratorClient, id: Uuid) -> Result<()> {
    match client.get_job(id).await {
        Ok(job) => {
            print_job_details(&job);
            Ok(())
        }
        Err(e) if e.is_not_found() => bail!("job {} not found", id),
        Err(e) => Err(e.into()),
    }
}

pub async fn health(client: &OrchestratorClient) -> Result<()> {
    let health = client.health().await?;

    println!(
        "{} {} {} ({})",
        "✓".green(),
        health.service.bold(),
        health.version,
        health.status
    );
    Ok(())
}

/// Fails unless the latest finished job succeeded
pub async fn batch_check(client: &OrchestratorClient) -> Result<()> {
    let status = client.status().await?;
    let batch = status.batch;

    print_batch(&batch);

    if !batch.is_success() {
        bail!(
            "last batch status is {}",
            batch.last_status.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Task:     {}", job.task);
    println!("    Status:   {}", colorize_status(&job.status));
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  Task:      {}", job.task);
    println!("  Keyword:   {}", job.keyword.dimmed());
    println!("  Status:    {}", colorize_status(&job.status));
    println!("  Created:   {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(completed) = job.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
        let duration = completed.signed_duration_since(job.created_at);
        println!("  Duration:  {}s", duration.num_seconds());
    }
    println!("  Retries:   {}", job.total_retries());

    if !job.stage_history.is_empty() {
        println!("\n{}", "Stages:".bold());
        for record in &job.stage_history {
            let outcome = match record.outcome {
                StageOutcome::Succeeded => "✓".green(),
                StageOutcome::Failed => "✗".red(),
            };
            println!(
                "  {} {:<9} {} attempt(s)",
                outcome,
                record.stage.to_string(),
                record.attempts
            );
            if let Some(detail) = &record.detail {
                println!("      {}", detail.dimmed());
            }
        }
    }

    if let Some(result) = &job.result {
        println!("\n{}", "Code:".bold());
        println!("{}", result.code);
        println!("\n{}", "Test output:".bold());
        println!("{}", result.test_output.dimmed());
    }

    if let Some(error) = &job.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_batch(batch: &BatchStatus) {
    let last_status = match batch.last_status.as_deref() {
        Some(BatchStatus::SUCCESS) => BatchStatus::SUCCESS.green(),
        Some(other) => other.red(),
        None => "none".dimmed(),
    };

    println!("{}", "Batch:".bold());
    println!(
        "  Running:            {}",
        if batch.is_running { "yes".cyan() } else { "no".dimmed() }
    );
    println!("  Last status:        {}", last_status);
    if let Some(last_run) = batch.last_run {
        println!("  Last run:           {}", last_run.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &batch.last_error {
        println!("  Last error:         {}", error.red());
    }
    println!("  Runs today:         {}", batch.run_count);
    println!("  Errors today:       {}", batch.error_count);
    println!("  Consecutive errors: {}", batch.consecutive_errors);
    println!("  Health score:       {}", colorize_health(batch.health_score));
}

fn colorize_health(score: f64) -> ColoredString {
    let text = format!("{:.2}", score);
    if score >= 0.8 {
        text.green()
    } else if score >= 0.5 {
        text.yellow()
    } else {
        text.red()
    }
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Searching | JobStatus::Generating | JobStatus::Testing => status_str.cyan(),
        JobStatus::Succeeded => status_str.green(),
        JobStatus::Failed => status_str.red(),
    }
}
