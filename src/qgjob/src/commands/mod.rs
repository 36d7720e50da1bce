pub mod devices;
pub mod jobs;
pub mod queue;
pub mod status;
pub mod submit;

use crate::client::{ApiError, JobQuery};
use crate::validation::ValidationError;
use clap::Args;
use qgjob_core::types::{JobStatus, Target};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T = ()> = Result<T, CliError>;

/// Filters shared by the job listing commands.
#[derive(Args, Debug, Clone, Default)]
pub struct JobFilters {
    /// Filter by app version ID
    #[arg(long)]
    pub app_version_id: Option<String>,

    /// Filter by job status
    #[arg(long = "status-filter")]
    pub status: Option<JobStatus>,

    /// Filter by priority level (1-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub priority: Option<u8>,

    /// Filter by target environment
    #[arg(long)]
    pub target: Option<Target>,
}

impl JobFilters {
    pub fn query(&self) -> JobQuery {
        JobQuery {
            app_version_id: self.app_version_id.clone(),
            status: self.status.map(|s| s.as_str().to_string()),
            priority: self.priority,
            target: self.target,
            ..Default::default()
        }
    }

    /// `status=queued, priority=5` style summary of the active filters.
    pub fn describe(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status={status}"));
        }
        if let Some(priority) = self.priority {
            parts.push(format!("priority={priority}"));
        }
        if let Some(target) = self.target {
            parts.push(format!("target={target}"));
        }
        if let Some(app) = &self.app_version_id {
            parts.push(format!("app={}", crate::format::truncate(app, 20)));
        }
        parts
    }
}

/// Run `render` once, or every `every` until Ctrl+C when `watch` is set.
pub async fn watch_loop<F, Fut>(watch: bool, every: std::time::Duration, mut render: F) -> CliResult
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = CliResult>,
{
    if !watch {
        return render().await;
    }
    println!("{}", console::style("Press Ctrl+C to stop monitoring...").dim());
    let term = console::Term::stdout();
    loop {
        term.clear_screen()?;
        render().await?;
        tokio::select! {
            _ = tokio::time::sleep(every) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", console::style("Monitoring stopped.").dim());
                return Ok(());
            }
        }
    }
}
