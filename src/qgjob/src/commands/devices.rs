use super::CliResult;
use crate::client::{ApiClient, NewDeviceBody};
use crate::format::{device_status_indicator, panel, print_success, title_case, Table};
use crate::models::Recommendation;
use crate::validation::validate_priority;
use clap::{Args, Subcommand};
use console::style;
use qgjob_core::types::Target;

#[derive(Subcommand, Debug)]
pub enum DevicesCommand {
    /// List all devices and their current status
    List,
    /// Show device pool status and utilization metrics
    Status,
    /// Get device allocation recommendations for a target type
    Recommend(RecommendArgs),
    /// Perform health check on all devices
    Health,
    /// Register a device
    Add(AddArgs),
    /// Remove an idle device
    Remove(RemoveArgs),
}

#[derive(Args, Debug)]
pub struct RecommendArgs {
    pub target: Target,

    /// Priority of the job being planned (1-5)
    #[arg(long, default_value_t = 1)]
    pub priority: i64,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique device name, e.g. emulator-4
    #[arg(long)]
    pub device_id: String,

    #[arg(long = "type")]
    pub device_type: Target,

    #[arg(long, default_value_t = 1)]
    pub max_jobs: u32,

    #[arg(long)]
    pub location: Option<String>,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub device_id: String,
}

pub async fn run(client: &ApiClient, cmd: DevicesCommand) -> CliResult {
    match cmd {
        DevicesCommand::List => list(client).await,
        DevicesCommand::Status => status(client).await,
        DevicesCommand::Recommend(args) => recommend(client, args).await,
        DevicesCommand::Health => health(client).await,
        DevicesCommand::Add(args) => {
            let created = client
                .add_device(&NewDeviceBody {
                    device_id: args.device_id,
                    device_type: args.device_type,
                    max_concurrent_jobs: args.max_jobs,
                    location: args.location,
                })
                .await?;
            print_success(
                "Device Added",
                &format!("Device {} registered ({})", created.device_id, created.status),
            );
            Ok(())
        }
        DevicesCommand::Remove(args) => {
            let removed = client.remove_device(&args.device_id).await?;
            print_success("Device Removed", &removed.message);
            Ok(())
        }
    }
}

async fn list(client: &ApiClient) -> CliResult {
    let response = client.devices().await?;
    if response.devices.is_empty() {
        println!("{}", style("No devices found in the pool").yellow());
        return Ok(());
    }

    let mut table = Table::new(&[
        "Device ID", "Type", "Status", "Usage", "Capacity", "Utilization", "Location",
    ])
    .with_title("Device Pool Status");
    for device in &response.devices {
        table.add_row(vec![
            device.device_id.clone(),
            device.device_type.to_string(),
            device_status_indicator(device.status),
            format!("{}/{}", device.current_jobs, device.max_concurrent_jobs),
            device.max_concurrent_jobs.to_string(),
            format!("{:.1}%", device.utilization_percent),
            device.location.clone().unwrap_or_else(|| "N/A".to_string()),
        ]);
    }
    println!("{}", table.render());
    Ok(())
}

async fn status(client: &ApiClient) -> CliResult {
    let status = client.device_status().await?;
    println!(
        "{}",
        panel(
            "Device Pool Summary",
            &[
                format!("Total Devices: {}", status.total_devices),
                format!("Available Devices: {}", status.available_devices),
                format!("Busy Devices: {}", status.busy_devices),
                format!("Offline Devices: {}", status.offline_devices),
            ],
        )
    );

    if !status.by_type.is_empty() {
        let mut table =
            Table::new(&["Type", "Total", "Available", "Busy", "Offline", "Avg Utilization"])
                .with_title("Device Pool Details");
        for (target, stats) in &status.by_type {
            table.add_row(vec![
                title_case(target.as_str()),
                stats.total.to_string(),
                stats.available.to_string(),
                stats.busy.to_string(),
                stats.offline.to_string(),
                format!("{:.1}%", stats.avg_utilization),
            ]);
        }
        println!("\n{}", table.render());
    }

    let mut allocation: Vec<(&String, _)> = status
        .priority_allocation
        .iter()
        .filter(|(_, a)| a.running_jobs + a.queued_jobs > 0)
        .collect();
    if !allocation.is_empty() {
        allocation.sort_by(|a, b| b.0.cmp(a.0));
        let mut table =
            Table::new(&["Priority", "Running", "Queued"]).with_title("Priority Allocation");
        for (key, stats) in allocation {
            table.add_row(vec![
                title_case(key),
                stats.running_jobs.to_string(),
                stats.queued_jobs.to_string(),
            ]);
        }
        println!("\n{}", table.render());
    }
    Ok(())
}

fn recommendation_panel(target: Target, rec: &Recommendation) -> String {
    let title = format!("{} Recommendation", title_case(target.as_str()));
    let wait = rec
        .estimated_wait_time
        .map(|s| format!("{s} seconds"))
        .unwrap_or_else(|| "unknown".to_string());
    let message = rec.message.clone().unwrap_or_default();
    let mut lines = match rec.recommendation.as_str() {
        "immediate_allocation" => vec![
            style("✅ Device Available").green().bold().to_string(),
            format!("Device ID: {}", rec.device_id.as_deref().unwrap_or("-")),
            format!(
                "Current Utilization: {:.1}%",
                rec.current_utilization.unwrap_or(0.0)
            ),
            format!("Estimated Wait Time: {wait}"),
        ],
        "preemption_available" => vec![
            style("⚡ Preemption Possible").yellow().bold().to_string(),
            format!("Message: {message}"),
            format!("Estimated Wait Time: {wait}"),
        ],
        "queue_and_wait" => vec![
            style("⏳ Queue Required").yellow().bold().to_string(),
            format!("Message: {message}"),
            format!("Estimated Wait Time: {wait}"),
        ],
        "devices_offline" | "no_devices_available" => vec![
            style("❌ No Devices Available").red().bold().to_string(),
            format!("Message: {message}"),
        ],
        other => vec![
            style(format!("⚠️  Unknown Status ({other})")).magenta().bold().to_string(),
            format!("Message: {message}"),
        ],
    };
    if rec.priority_advantage {
        lines.push(style("🔥 High priority: jumps ahead of lower priority work").red().to_string());
    }
    panel(&title, &lines)
}

async fn recommend(client: &ApiClient, args: RecommendArgs) -> CliResult {
    let priority = validate_priority(args.priority)?;
    let rec = client.recommendation(args.target, priority).await?;
    println!("{}", recommendation_panel(args.target, &rec));
    Ok(())
}

async fn health(client: &ApiClient) -> CliResult {
    let report = client.health_check().await?;
    println!(
        "{}",
        panel(
            "Health Check Results",
            &[
                format!("Total Checked: {}", report.total_checked),
                format!("Healthy: {}", style(report.healthy).green()),
                format!("Unhealthy: {}", style(report.unhealthy).red()),
            ],
        )
    );

    if !report.details.is_empty() {
        let mut table =
            Table::new(&["Device ID", "Status", "Health"]).with_title("Device Health Details");
        for detail in &report.details {
            let health = if detail.healthy {
                style("✅ Healthy").green().to_string()
            } else {
                style("❌ Unhealthy").red().to_string()
            };
            table.add_row(vec![
                detail.device_id.clone(),
                device_status_indicator(detail.status),
                health,
            ]);
        }
        println!("\n{}", table.render());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> String {
        console::strip_ansi_codes(text).into_owned()
    }

    #[test]
    fn test_recommendation_panels() {
        let rec: Recommendation = serde_json::from_str(
            r#"{"recommendation": "immediate_allocation", "device_id": "emulator-1",
                "current_utilization": 50.0, "estimated_wait_time": 0, "priority_advantage": true}"#,
        )
        .unwrap();
        let rendered = plain(&recommendation_panel(Target::Emulator, &rec));
        assert!(rendered.contains("Emulator Recommendation"));
        assert!(rendered.contains("Device ID: emulator-1"));
        assert!(rendered.contains("Current Utilization: 50.0%"));
        assert!(rendered.contains("High priority"));

        let rec: Recommendation = serde_json::from_str(
            r#"{"recommendation": "no_devices_available", "message": "No device devices configured",
                "estimated_wait_time": null}"#,
        )
        .unwrap();
        let rendered = plain(&recommendation_panel(Target::Device, &rec));
        assert!(rendered.contains("No Devices Available"));
        assert!(rendered.contains("No device devices configured"));
    }
}
