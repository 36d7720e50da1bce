use super::{watch_loop, CliResult, JobFilters};
use crate::client::{ApiClient, JobQuery};
use crate::format::{
    format_ago, format_duration, panel, print_success, print_warning, priority_icon,
    priority_indicator, priority_long, short_test_path, status_icon, status_indicator, truncate,
    Table,
};
use crate::models::JobRow;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use console::{style, Term};
use qgjob_core::types::{JobId, JobStatus, SortField, SortOrder};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List and filter jobs with sorting
    List(ListArgs),
    /// Show recently submitted jobs
    Recent(RecentArgs),
    /// Cancel a queued or running job
    Cancel(CancelArgs),
    /// Show queued and running jobs
    Active(ActiveArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: JobFilters,

    /// Filter by organization ID
    #[arg(long)]
    pub org_id: Option<String>,

    /// Maximum number of jobs to show
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Sort by created, priority or status
    #[arg(long, default_value = "created")]
    pub sort: SortField,

    /// asc or desc
    #[arg(long, default_value = "desc")]
    pub order: SortOrder,
}

#[derive(Args, Debug)]
pub struct RecentArgs {
    /// Show only jobs with this priority
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub priority: Option<u8>,

    /// Number of recent jobs to show
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    pub job_id: JobId,

    /// Cancel without asking for confirmation
    #[arg(short, long, default_value_t = false)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ActiveArgs {
    /// Refresh every 3 seconds until interrupted
    #[arg(short, long, default_value_t = false)]
    pub watch: bool,

    /// Filter by priority level
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub priority: Option<u8>,
}

pub async fn run(client: &ApiClient, cmd: JobsCommand) -> CliResult {
    match cmd {
        JobsCommand::List(args) => list(client, args).await,
        JobsCommand::Recent(args) => recent(client, args).await,
        JobsCommand::Cancel(args) => cancel(client, args).await,
        JobsCommand::Active(args) => {
            let priority = args.priority;
            watch_loop(args.watch, Duration::from_secs(3), || {
                active(client, priority, args.watch)
            })
            .await
        }
    }
}

/// Finished jobs run until their last update; live jobs until now.
fn elapsed_secs(job: &JobRow, now: DateTime<Utc>) -> i64 {
    let end = if job.status.is_terminal() {
        job.updated_at
    } else {
        now
    };
    (end - job.created_at).num_seconds()
}

async fn list(client: &ApiClient, args: ListArgs) -> CliResult {
    let mut query = args.filters.query();
    query.org_id = args.org_id.clone();
    query.limit = Some(args.limit);
    query.sort = Some(args.sort);
    query.order = Some(args.order);
    let jobs = client.list_jobs(&query).await?;

    if jobs.is_empty() {
        println!("{}", style("No jobs found matching the criteria.").yellow());
        return Ok(());
    }

    let mut filters = args.filters.describe();
    if let Some(org) = &args.org_id {
        filters.push(format!("org={org}"));
    }
    let filter_text = if filters.is_empty() {
        String::new()
    } else {
        format!(" (Filters: {})", filters.join(", "))
    };

    let now = Utc::now();
    let mut table = Table::new(&[
        "ID", "Priority", "Status", "Target", "Org", "App Version", "Test File", "Created",
        "Duration",
    ])
    .with_title(format!("Jobs List - {} found{filter_text}", jobs.len()));
    for job in &jobs {
        table.add_row(vec![
            job.id.to_string(),
            priority_indicator(job.priority),
            status_indicator(job.status),
            job.target.as_str().to_uppercase(),
            truncate(&job.org_id, 10),
            truncate(&job.app_version_id, 13),
            short_test_path(&job.test_path, 23),
            job.created_at.format("%m-%d %H:%M:%S").to_string(),
            format_duration(elapsed_secs(job, now)),
        ]);
    }
    println!("{}", table.render());

    let mut by_status: BTreeMap<JobStatus, usize> = BTreeMap::new();
    for job in &jobs {
        *by_status.entry(job.status).or_default() += 1;
    }
    let counts: Vec<String> = by_status
        .iter()
        .map(|(s, n)| format!("{} {s}: {n}", status_icon(*s)))
        .collect();
    println!("\n{} {}", style("Summary:").bold(), counts.join(", "));
    Ok(())
}

async fn recent(client: &ApiClient, args: RecentArgs) -> CliResult {
    let query = JobQuery {
        priority: args.priority,
        limit: Some(args.limit),
        sort: Some(SortField::Created),
        order: Some(SortOrder::Desc),
        ..Default::default()
    };
    let jobs = client.list_jobs(&query).await?;

    if jobs.is_empty() {
        println!("{}", style("No recent jobs found.").yellow());
        return Ok(());
    }

    let title = match args.priority {
        Some(p) => format!("📋 Recent Jobs (Priority {p})"),
        None => "📋 Recent Jobs".to_string(),
    };
    println!("{}\n", style(title).bold().blue());

    let now = Utc::now();
    for (i, job) in jobs.iter().enumerate() {
        println!(
            "{:2}. {} Job {} - {}P{} - {} - {} ({})",
            i + 1,
            status_icon(job.status),
            job.id,
            priority_icon(job.priority.get()),
            job.priority,
            job.status.as_str().to_uppercase(),
            short_test_path(&job.test_path, 30),
            format_ago((now - job.created_at).num_seconds())
        );
    }
    Ok(())
}

async fn cancel(client: &ApiClient, args: CancelArgs) -> CliResult {
    let job = client.job(args.job_id).await?;

    if job.status.is_terminal() {
        print_warning(
            "Cannot Cancel",
            &format!("Job {} is already {}", job.job_id, job.status),
        );
        return Ok(());
    }

    println!(
        "{}",
        panel(
            "Job to Cancel",
            &[
                format!("Job ID: {}", job.job_id),
                format!("Status: {}", status_indicator(job.status)),
                format!("Priority: {}", priority_long(job.priority)),
                format!("Test: {}", job.test_path),
                format!("App Version: {}", job.app_version_id),
            ],
        )
    );

    if !args.force {
        let term = Term::stdout();
        term.write_str("\nAre you sure you want to cancel this job? [y/N] ")?;
        let answer = term.read_line()?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("{}", style("Cancellation aborted.").yellow());
            return Ok(());
        }
    }

    let response = client.cancel_job(args.job_id).await?;
    print_success("Job Cancelled", &response.message);
    Ok(())
}

async fn active(client: &ApiClient, priority: Option<u8>, live: bool) -> CliResult {
    let query = JobQuery {
        priority,
        limit: Some(100),
        sort: Some(SortField::Priority),
        order: Some(SortOrder::Desc),
        ..Default::default()
    }
    .with_statuses(&[JobStatus::Queued, JobStatus::Running]);
    let jobs = client.list_jobs(&query).await?;

    let title = if live {
        format!("⚡ Active Jobs {}", style("(Live)").dim())
    } else {
        "⚡ Active Jobs".to_string()
    };
    println!("{}\n", style(title).bold().blue());

    if jobs.is_empty() {
        println!("{}", style("No active jobs.").green());
        return Ok(());
    }

    let (running, queued): (Vec<&JobRow>, Vec<&JobRow>) =
        jobs.iter().partition(|j| j.status == JobStatus::Running);
    println!(
        "{}",
        panel(
            "Activity",
            &[
                format!("Running: {}", style(running.len()).blue()),
                format!("Queued: {}", style(queued.len()).yellow()),
            ],
        )
    );

    let now = Utc::now();
    let mut table = Table::new(&["ID", "Priority", "Status", "Target", "Device", "Test File", "Age"]);
    for job in running.iter().chain(queued.iter()) {
        table.add_row(vec![
            job.id.to_string(),
            priority_indicator(job.priority),
            status_indicator(job.status),
            job.target.as_str().to_uppercase(),
            job.assigned_device_name.clone().unwrap_or_else(|| "-".to_string()),
            short_test_path(&job.test_path, 23),
            format_duration(elapsed_secs(job, now)),
        ]);
    }
    println!("{}", table.render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use qgjob_core::types::{Priority, Target};

    fn row(status: JobStatus, created_ago: i64, updated_ago: i64) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: 1,
            org_id: "qualgent".to_string(),
            app_version_id: "v1".to_string(),
            test_path: "tests/a.spec.js".to_string(),
            priority: Priority::new(3).unwrap(),
            target: Target::Emulator,
            status,
            assigned_device_name: None,
            created_at: now - ChronoDuration::seconds(created_ago),
            updated_at: now - ChronoDuration::seconds(updated_ago),
        }
    }

    #[test]
    fn test_elapsed_uses_update_time_for_finished_jobs() {
        let now = Utc::now();
        let done = row(JobStatus::Completed, 120, 100);
        assert!((19..=21).contains(&elapsed_secs(&done, now)));

        let live = row(JobStatus::Running, 120, 100);
        assert!((119..=121).contains(&elapsed_secs(&live, now)));
    }
}
