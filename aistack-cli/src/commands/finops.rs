//! FinOps command handlers

use aistack_client::OrchestratorClient;
use aistack_core::domain::cost::micros_to_usd;
use aistack_core::domain::report::DailyReport;
use anyhow::Result;
use chrono::NaiveDate;
use colored::*;

pub async fn show_cost(client: &OrchestratorClient) -> Result<()> {
    let summary = client.cost().await?;

    println!("{}", "Cost:".bold());
    println!("  Total:   ${:.4}", summary.total_usd);
    println!("  Today:   ${:.4}", summary.today_usd);
    println!("  Entries: {}", summary.entry_count);

    if !summary.by_stage.is_empty() {
        println!("\n{}", "By stage:".bold());
        for (stage, micros) in &summary.by_stage {
            println!("  {:<9} ${:.4}", stage.to_string(), micros_to_usd(*micros));
        }
    }
    Ok(())
}

/// Ask the orchestrator to build and send the daily report
pub async fn daily_report(client: &OrchestratorClient, date: Option<NaiveDate>) -> Result<()> {
    let report = client.daily_report(date).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &DailyReport) {
    println!("{}", format!("Daily report for {}", report.date).bold());
    println!("  Total cost: ${:.4}", report.total_cost);
    println!(
        "  Jobs:       {} ({} succeeded, {} failed)",
        report.job_count,
        report.success_count.to_string().green(),
        report.failure_count.to_string().red()
    );

    for (stage, micros) in &report.cost_by_stage {
        println!("    {:<9} ${:.4}", stage.to_string(), micros_to_usd(*micros));
    }

    if !report.alerts.is_empty() {
        println!("\n{}", "Alerts:".bold());
        for alert in &report.alerts {
            println!("  {} {}", "⚠".yellow(), alert.yellow());
        }
    }

    println!("\n{}", "Recommendations:".bold());
    for recommendation in &report.recommendations {
        println!("  {} {}", "▸".cyan(), recommendation);
    }
}
