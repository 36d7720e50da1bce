//! qgjob: submit and track mobile UI test jobs.
//!
//! ```bash
//! qgjob submit --org-id qualgent --app-version-id v1 --test tests/login.spec.js --priority 4
//! qgjob status job --job-id 12 -v
//! qgjob queue monitor --watch
//! ```

mod client;
mod commands;
mod format;
mod models;
mod validation;

use clap::{Parser, Subcommand};
use client::{ApiClient, DEFAULT_API_URL};
use commands::{devices, jobs, queue, status, submit};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "qgjob")]
#[command(about = "Submit and track AppWright test jobs")]
#[command(version)]
struct Cli {
    /// Base URL of the qgjob server
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a test job for execution with priority scheduling
    Submit(submit::SubmitArgs),
    /// Job status and system summaries
    #[command(subcommand)]
    Status(status::StatusCommand),
    /// Device pool management
    #[command(subcommand)]
    Devices(devices::DevicesCommand),
    /// Queue monitoring
    #[command(subcommand)]
    Queue(queue::QueueCommand),
    /// Job listing and cancellation
    #[command(subcommand)]
    Jobs(jobs::JobsCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = ApiClient::new(cli.api_url);

    let result = match cli.command {
        Command::Submit(args) => submit::run(&client, args).await,
        Command::Status(cmd) => status::run(&client, cmd).await,
        Command::Devices(cmd) => devices::run(&client, cmd).await,
        Command::Queue(cmd) => queue::run(&client, cmd).await,
        Command::Jobs(cmd) => jobs::run(&client, cmd).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            format::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
