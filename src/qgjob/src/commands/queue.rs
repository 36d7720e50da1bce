use super::{watch_loop, CliResult};
use crate::client::ApiClient;
use crate::format::{panel, priority_band, priority_icon, queue_name, Table};
use crate::models::{QueueStatus, TierStats};
use clap::{Args, Subcommand};
use console::style;
use qgjob_core::types::QueueTier;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Show current queue status across all priority levels
    Status,
    /// Show priority queue configuration and routing information
    Info,
    /// Monitor queue activity and job flow
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Refresh every 5 seconds until interrupted
    #[arg(short, long, default_value_t = false)]
    pub watch: bool,
}

/// Idle, backlog (more waiting than running) or active.
fn activity(stats: &TierStats) -> (&'static str, &'static str) {
    if stats.total_active == 0 {
        ("✅", "Idle")
    } else if stats.queued_jobs > stats.running_jobs {
        ("⏳", "Backlog")
    } else {
        ("🔄", "Active")
    }
}

fn styled_activity(label: &'static str) -> String {
    match label {
        "Idle" => style(label).green(),
        "Backlog" => style(label).yellow(),
        _ => style(label).blue(),
    }
    .to_string()
}

fn processing_order(tier: QueueTier) -> &'static str {
    match tier {
        QueueTier::High => "1st",
        QueueTier::Normal => "2nd",
        QueueTier::Low => "3rd",
    }
}

pub async fn run(client: &ApiClient, cmd: QueueCommand) -> CliResult {
    match cmd {
        QueueCommand::Status => status(client).await,
        QueueCommand::Info => info(client).await,
        QueueCommand::Monitor(args) => {
            watch_loop(args.watch, Duration::from_secs(5), || monitor(client, args.watch)).await
        }
    }
}

fn summary_lines(status: &QueueStatus) -> Vec<String> {
    QueueTier::ALL
        .iter()
        .map(|tier| {
            let stats = status.queue_summary.get(tier).cloned().unwrap_or_default();
            let (icon, label) = activity(&stats);
            format!(
                "{icon} {}: {} active ({} queued, {} running) {}",
                queue_name(*tier),
                stats.total_active,
                stats.queued_jobs,
                stats.running_jobs,
                styled_activity(label)
            )
        })
        .collect()
}

async fn status(client: &ApiClient) -> CliResult {
    let status = client.queue_status().await?;
    println!("{}", panel("Priority Queue Status", &summary_lines(&status)));

    let active = status.active_priorities();
    if active.is_empty() {
        println!("\n{}", style("No active jobs in any priority queue.").dim());
    } else {
        let mut table = Table::new(&["Priority", "Queue", "Queued", "Running", "Total"])
            .with_title("Active Jobs by Priority");
        for (priority, stats) in active {
            table.add_row(vec![
                format!("{} {priority}", priority_icon(priority)),
                queue_name(stats.queue_name),
                stats.queued_jobs.to_string(),
                stats.running_jobs.to_string(),
                stats.total_active.to_string(),
            ]);
        }
        println!("\n{}", table.render());
    }

    println!("\n{}", style(format!("Last updated: {}", status.timestamp.to_rfc3339())).dim());
    Ok(())
}

async fn info(client: &ApiClient) -> CliResult {
    let response = client.priority_info().await?;
    let info = response.priority_queues;

    let mut rows: Vec<(u8, QueueTier)> = info
        .priority_mapping
        .iter()
        .filter_map(|(p, tier)| p.parse().ok().map(|p| (p, *tier)))
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));

    let mut table = Table::new(&["Priority Level", "Queue Name", "Description", "Processing Order"])
        .with_title("Priority to Queue Mapping");
    for (priority, tier) in rows {
        table.add_row(vec![
            format!("{} {priority} ({})", priority_icon(priority), priority_band(priority)),
            queue_name(tier),
            info.description
                .get(&tier)
                .cloned()
                .unwrap_or_else(|| "No description".to_string()),
            processing_order(tier).to_string(),
        ]);
    }
    println!("{}\n", style("Priority Queue Configuration").bold().blue());
    println!("{}", table.render());

    if !info.queue_order.is_empty() {
        println!("\n{}", style("Processing Order:").bold());
        for (i, tier) in info.queue_order.iter().enumerate() {
            println!("  {}. {}", i + 1, queue_name(*tier));
        }
    }

    let state = if response.status == "active" {
        style(response.status.to_uppercase()).green()
    } else {
        style(response.status.to_uppercase()).red()
    };
    println!("\n{} {state}", style("Status:").bold());
    Ok(())
}

async fn monitor(client: &ApiClient, live: bool) -> CliResult {
    let status = client.queue_status().await?;

    let title = if live {
        format!("🔍 Queue Monitor {}", style("(Live)").dim())
    } else {
        "🔍 Queue Monitor".to_string()
    };
    println!("{}\n", style(title).bold().blue());

    let (queued, running) = (status.total_queued(), status.total_running());
    println!(
        "{}",
        panel(
            "Live Metrics",
            &[
                format!("Total Active Jobs: {}", queued + running),
                format!("Queued: {queued}"),
                format!("Running: {running}"),
            ],
        )
    );

    let mut table = Table::new(&["Queue", "Queued", "Running", "Total", "Status"])
        .with_title("Queue Activity");
    for tier in QueueTier::ALL {
        let stats = status.queue_summary.get(&tier).cloned().unwrap_or_default();
        let (_, label) = activity(&stats);
        table.add_row(vec![
            queue_name(tier),
            stats.queued_jobs.to_string(),
            stats.running_jobs.to_string(),
            (stats.queued_jobs + stats.running_jobs).to_string(),
            styled_activity(label),
        ]);
    }
    println!("{}", table.render());
    println!("\n{}", style(format!("Updated: {}", status.timestamp.to_rfc3339())).dim());
    Ok(())
}
