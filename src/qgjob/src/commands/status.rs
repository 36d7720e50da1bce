use super::{CliResult, JobFilters};
use crate::client::ApiClient;
use crate::format::{
    panel, priority_icon, priority_indicator, priority_long, status_indicator, title_case,
    truncate, Table,
};
use clap::{Args, Subcommand};
use console::style;
use std::collections::BTreeMap;

#[derive(Subcommand, Debug)]
pub enum StatusCommand {
    /// Check the status of a specific job
    Job(JobArgs),
    /// List jobs with optional filtering
    List(ListArgs),
    /// Show overall system status summary
    Summary,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Job ID to check status
    #[arg(long)]
    pub job_id: u64,

    /// Show priority and device allocation
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: JobFilters,

    /// Maximum number of jobs to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub async fn run(client: &ApiClient, cmd: StatusCommand) -> CliResult {
    match cmd {
        StatusCommand::Job(args) => job(client, args).await,
        StatusCommand::List(args) => list(client, args).await,
        StatusCommand::Summary => summary(client).await,
    }
}

async fn job(client: &ApiClient, args: JobArgs) -> CliResult {
    let job = client.job(args.job_id).await?;

    let out = if args.verbose {
        panel(
            "Detailed Job Status",
            &[
                format!("Job ID: {}", job.job_id),
                format!("Status: {}", status_indicator(job.status)),
                format!("Priority: {}", priority_long(job.priority)),
                format!("Target: {}", job.target),
                format!(
                    "Device: {}",
                    job.assigned_device_name.as_deref().unwrap_or("Not assigned")
                ),
                format!("Test: {}", job.test_path),
                format!("Created: {}", job.created_at.to_rfc3339()),
                format!("Updated: {}", job.updated_at.to_rfc3339()),
            ],
        )
    } else {
        panel(
            "Job Status",
            &[
                format!("Job ID: {}", job.job_id),
                format!("Status: {}", status_indicator(job.status)),
                format!("Created at: {}", job.created_at.to_rfc3339()),
            ],
        )
    };
    println!("{out}");
    Ok(())
}

async fn list(client: &ApiClient, args: ListArgs) -> CliResult {
    let mut query = args.filters.query();
    query.limit = Some(args.limit);
    let mut jobs = client.list_jobs(&query).await?;

    if jobs.is_empty() {
        println!("{}", style("No jobs found matching the criteria.").yellow());
        return Ok(());
    }

    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut table = Table::new(&[
        "Job ID", "Priority", "Status", "Target", "App Version", "Test File", "Created",
    ])
    .with_title(format!("Jobs List ({} found)", jobs.len()));

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_priority: BTreeMap<u8, usize> = BTreeMap::new();
    for job in &jobs {
        *by_status.entry(job.status.to_string()).or_default() += 1;
        *by_priority.entry(job.priority.get()).or_default() += 1;

        let test_path = if job.test_path.chars().count() > 30 {
            let tail: String = job
                .test_path
                .chars()
                .rev()
                .take(27)
                .collect::<Vec<char>>()
                .into_iter()
                .rev()
                .collect();
            format!("...{tail}")
        } else {
            job.test_path.clone()
        };
        table.add_row(vec![
            job.id.to_string(),
            priority_indicator(job.priority),
            status_indicator(job.status),
            job.target.as_str().to_uppercase(),
            truncate(&job.app_version_id, 15),
            test_path,
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{}", table.render());

    let statuses: Vec<String> = by_status.iter().map(|(s, n)| format!("{s}: {n}")).collect();
    let priorities: Vec<String> = by_priority
        .iter()
        .rev()
        .map(|(p, n)| format!("{}{p}: {n}", priority_icon(*p)))
        .collect();
    println!("\n{}", style("Summary:").bold());
    println!("Status: {}", statuses.join(", "));
    println!("Priority: {}", priorities.join(", "));
    Ok(())
}

async fn summary(client: &ApiClient) -> CliResult {
    println!("{}\n", style("📊 System Status Summary").bold().blue());

    let queue = client.queue_status().await?;
    let (queued, running) = (queue.total_queued(), queue.total_running());
    println!(
        "{}",
        panel(
            "Queue Status",
            &[
                format!("Queued Jobs: {queued}"),
                format!("Running Jobs: {running}"),
                format!("Total Active: {}", queued + running),
            ],
        )
    );

    let devices = client.device_status().await?;
    println!(
        "{}",
        panel(
            "Device Status",
            &[
                format!("Available: {}", style(devices.available_devices).green()),
                format!("Busy: {}", style(devices.busy_devices).yellow()),
                format!("Offline: {}", style(devices.offline_devices).red()),
                format!("Total: {}", devices.total_devices),
            ],
        )
    );

    if !devices.by_type.is_empty() {
        println!("\n{}", style("Device Types:").bold());
        for (target, stats) in &devices.by_type {
            println!(
                "  {}: {} available, {} busy",
                title_case(target.as_str()),
                stats.available,
                stats.busy
            );
        }
    }

    let active = queue.active_priorities();
    if !active.is_empty() {
        println!("\n{}", style("Active Jobs by Priority:").bold());
        for (priority, stats) in active {
            println!(
                "  {} Priority {priority}: {} jobs",
                priority_icon(priority),
                stats.total_active
            );
        }
    }
    Ok(())
}
