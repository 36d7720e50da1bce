use super::CliResult;
use crate::client::ApiClient;
use crate::format::{
    panel, priority_icon, priority_long, queue_name, status_icon, status_indicator, target_icon,
    title_case,
};
use crate::models::GroupedJob;
use crate::validation::{validate_priority, validate_test_file};
use clap::Args;
use console::style;
use qgjob_core::types::{QueueTier, Target};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Organization ID
    #[arg(long)]
    pub org_id: String,

    /// Application version ID
    #[arg(long)]
    pub app_version_id: String,

    /// Path to test file
    #[arg(long)]
    pub test: String,

    /// Job priority (1-5)
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub priority: i64,

    /// Target environment for test execution
    #[arg(long, default_value = "emulator")]
    pub target: Target,

    /// Show priority queue information after submission
    #[arg(long, default_value_t = false)]
    pub show_queue_info: bool,
}

fn routing_note(tier: QueueTier) -> &'static str {
    match tier {
        QueueTier::High => "🔥 This job will be processed with high priority",
        QueueTier::Normal => "⚡ This job will be processed in normal order",
        QueueTier::Low => "🐌 This job will be processed when system is idle",
    }
}

/// Jobs of the group other than `exclude`, highest priority then oldest first.
fn other_jobs(mut jobs: Vec<GroupedJob>, exclude: u64) -> Vec<GroupedJob> {
    jobs.retain(|j| j.job_id != exclude);
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    jobs
}

pub async fn run(client: &ApiClient, args: SubmitArgs) -> CliResult {
    let priority = validate_priority(args.priority)?;
    let cwd = std::env::current_dir()?;
    let test_path = validate_test_file(&args.test, &cwd)?;
    let test_path = test_path.display().to_string();

    println!(
        "{}",
        panel(
            "Job Submission Details",
            &[
                format!("Organization ID: {}", args.org_id),
                format!("App Version ID: {}", args.app_version_id),
                format!("Test Path: {test_path}"),
                format!("Priority: {}", priority_long(priority)),
                format!(
                    "Target: {} {}",
                    target_icon(args.target),
                    title_case(args.target.as_str())
                ),
            ],
        )
    );

    let result = client
        .submit_job(
            &args.org_id,
            &args.app_version_id,
            &test_path,
            priority,
            args.target,
        )
        .await?;

    println!(
        "{}",
        panel(
            "Job Submitted Successfully",
            &[
                format!("Job ID: {}", result.job_id),
                format!("Status: {}", status_indicator(result.status)),
                format!("Priority: {}", priority_long(priority)),
                format!("Created at: {}", result.created_at.to_rfc3339()),
            ],
        )
    );

    println!(
        "\n{} {}",
        style("Queue Routing:").bold().blue(),
        routing_note(result.queue)
    );
    println!("{}", style(format!("Routed to: {} Queue", queue_name(result.queue))).dim());

    // Group listing is informational only.
    if let Ok(group) = client.grouped_jobs(&args.app_version_id).await {
        let others = other_jobs(group, result.job_id);
        if !others.is_empty() {
            println!(
                "\n{}",
                style(format!("Other jobs in this group ({}):", args.app_version_id)).bold()
            );
            for job in others {
                println!(
                    "  • {} Job {} - {}P{} - {}",
                    status_icon(job.status),
                    job.job_id,
                    priority_icon(job.priority.get()),
                    job.priority,
                    job.status.as_str().to_uppercase()
                );
            }
        }
    }

    if args.show_queue_info {
        if let Ok(status) = client.queue_status().await {
            println!("\n{}", style("📊 Current Queue Status:").bold().blue());
            for (tier, stats) in &status.queue_summary {
                if stats.total_active > 0 {
                    println!("  • {}: {} active jobs", queue_name(*tier), stats.total_active);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use qgjob_core::types::{JobStatus, Priority};

    fn grouped(id: u64, priority: i64, age_secs: i64) -> GroupedJob {
        GroupedJob {
            job_id: id,
            status: JobStatus::Queued,
            priority: Priority::new(priority).unwrap(),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_other_jobs_order() {
        let jobs = vec![
            grouped(1, 2, 30),
            grouped(2, 5, 10),
            grouped(3, 2, 60),
            grouped(4, 4, 5),
        ];
        let ids: Vec<u64> = other_jobs(jobs, 4).iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
