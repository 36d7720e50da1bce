//! Batch processing: one dequeued job pulls every queued job sharing its app
//! version and target onto a single device, installs the app once and runs
//! the whole group.

use crate::devices::DeviceManager;
use crate::queue::PriorityQueues;
use crate::results::ResultRegistry;
use crate::runner::{RunOutcome, TestRunner};
use crate::store::JobStore;
use qgjob_core::config::RunnerConfig;
use qgjob_core::types::{JobId, JobOutcome, JobStatus, LeaseId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchSummary {
    pub total_jobs: usize,
    pub successful_jobs: usize,
    pub failed_jobs: usize,
    pub device_used: String,
    /// App installations avoided by batching, in seconds.
    pub time_saved_seconds: u64,
    pub batch_results: Vec<JobOutcome>,
}

/// What happened to the dequeued job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessReport {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_summary: Option<BatchSummary>,
}

impl ProcessReport {
    fn failed(job_id: JobId, error: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            message: None,
            error: Some(error),
            device_id: None,
            batch_summary: None,
        }
    }

    fn skipped(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            message: Some("Job already processed".to_string()),
            error: None,
            device_id: None,
            batch_summary: None,
        }
    }
}

/// Owns a claimed batch until it finishes. If the batch is abandoned first,
/// its jobs are failed (on panic) or put back in the queued state (on
/// cancellation), and the device slot is returned either way.
///
/// The panic path only runs where panics unwind (dev and test profiles).
/// Release builds abort, and the next snapshot load requeues the jobs.
struct ClaimGuard<'a> {
    store: &'a JobStore,
    devices: &'a DeviceManager,
    lease: LeaseId,
    armed: bool,
}

impl ClaimGuard<'_> {
    fn finish(mut self) {
        self.armed = false;
        self.devices.release(self.lease);
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if std::thread::panicking() {
            let failed = self.store.fail_running(self.lease);
            error!(lease = %self.lease, failed, "Batch aborted, marked claimed jobs failed");
        } else {
            let requeued = self.store.requeue_running(self.lease);
            warn!(lease = %self.lease, jobs = ?requeued, "Batch interrupted, jobs returned to queued");
        }
        self.devices.release(self.lease);
    }
}

pub struct BatchProcessor {
    store: Arc<JobStore>,
    devices: Arc<DeviceManager>,
    queues: Arc<PriorityQueues>,
    runner: Arc<dyn TestRunner>,
    results: Arc<ResultRegistry>,
    config: RunnerConfig,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<JobStore>,
        devices: Arc<DeviceManager>,
        queues: Arc<PriorityQueues>,
        runner: Arc<dyn TestRunner>,
        results: Arc<ResultRegistry>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            devices,
            queues,
            runner,
            results,
            config,
        }
    }

    /// Process the batch led by `job_id`.
    pub async fn process(&self, job_id: JobId, worker_id: &str) -> ProcessReport {
        let Some(job) = self.store.job(job_id) else {
            error!(job_id, worker = %worker_id, "Job not found");
            return ProcessReport::failed(job_id, format!("Job {job_id} not found"));
        };
        if job.status != JobStatus::Queued {
            debug!(job_id, status = %job.status, "Job already processed");
            return ProcessReport::skipped(job_id, job.status);
        }

        let Some(allocation) = self.devices.allocate(job.target, job.priority) else {
            let error = format!("No available devices for target type {}", job.target);
            warn!(job_id, target = %job.target, priority = %job.priority, "{error}");
            if let Err(e) = self.store.set_status(job_id, JobStatus::Failed) {
                warn!(job_id, error = %e, "Could not mark job failed");
            }
            self.results.record(JobOutcome {
                job_id,
                status: JobStatus::Failed,
                result: None,
                error: Some(error.clone()),
                device: None,
            });
            metrics::counter!("jobs.failed", "reason" => "no_device").increment(1);
            return ProcessReport::failed(job_id, error);
        };
        self.requeue(&allocation.preempted);

        let lease = allocation.lease;
        let device_name = allocation.device.device_id.clone();

        let claimed = match self.store.claim_batch(&job, lease) {
            Ok(jobs) => jobs,
            Err(e) => {
                // Lease revoked before the claim; try again later.
                warn!(job_id, error = %e, "Batch claim failed");
                self.devices.release(lease);
                self.requeue(&[job_id]);
                return ProcessReport {
                    job_id,
                    status: JobStatus::Queued,
                    message: Some(e.to_string()),
                    error: None,
                    device_id: None,
                    batch_summary: None,
                };
            }
        };
        if claimed.is_empty() {
            self.devices.release(lease);
            let status = self.store.job(job_id).map_or(JobStatus::Failed, |j| j.status);
            return ProcessReport::skipped(job_id, status);
        }

        let guard = ClaimGuard {
            store: &self.store,
            devices: &self.devices,
            lease,
            armed: true,
        };

        let ids: Vec<JobId> = claimed.iter().map(|j| j.id).collect();
        info!(
            worker = %worker_id,
            device = %device_name,
            app_version_id = %job.app_version_id,
            target = %job.target,
            jobs = ?ids,
            "Claimed batch"
        );
        metrics::histogram!("batch.size").record(claimed.len() as f64);

        let install_secs = job.target.install_secs();
        debug!(app_version_id = %job.app_version_id, secs = install_secs, "Installing app");
        tokio::time::sleep(self.config.scaled(install_secs)).await;

        let mut batch_results = Vec::with_capacity(claimed.len());
        let mut successful_jobs = 0;
        let mut failed_jobs = 0;

        for member in &claimed {
            if !self.store.is_running_under(member.id, lease) {
                debug!(job_id = member.id, "Skipping job cancelled or preempted mid-batch");
                continue;
            }

            let started = Instant::now();
            let run = self
                .runner
                .run(&member.test_path, &member.app_version_id, member.target)
                .await;
            metrics::histogram!("jobs.execution_secs").record(started.elapsed().as_secs_f64());

            let outcome = match run {
                RunOutcome::Passed(report) => JobOutcome {
                    job_id: member.id,
                    status: JobStatus::Completed,
                    result: Some(report),
                    error: None,
                    device: Some(device_name.clone()),
                },
                RunOutcome::Failed(error) => JobOutcome {
                    job_id: member.id,
                    status: JobStatus::Failed,
                    result: None,
                    error: Some(error),
                    device: Some(device_name.clone()),
                },
            };

            if !self.store.finish_job(member.id, lease, outcome.status) {
                debug!(job_id = member.id, "Job left the batch while running, result dropped");
                continue;
            }
            match outcome.status {
                JobStatus::Completed => {
                    successful_jobs += 1;
                    metrics::counter!("jobs.completed").increment(1);
                }
                _ => {
                    failed_jobs += 1;
                    metrics::counter!("jobs.failed", "reason" => "test").increment(1);
                }
            }
            info!(
                job_id = member.id,
                status = %outcome.status,
                error = outcome.error.as_deref().unwrap_or(""),
                "Job finished"
            );
            self.results.record(outcome.clone());
            batch_results.push(outcome);
        }

        guard.finish();

        let total_jobs = claimed.len();
        let time_saved_seconds = (total_jobs as u64).saturating_sub(1) * install_secs;
        metrics::counter!("batch.time_saved_secs").increment(time_saved_seconds);
        info!(
            device = %device_name,
            total_jobs,
            successful_jobs,
            failed_jobs,
            time_saved_seconds,
            "Batch completed"
        );

        let status = self.store.job(job_id).map_or(JobStatus::Failed, |j| j.status);
        ProcessReport {
            job_id,
            status,
            message: None,
            error: None,
            device_id: Some(device_name.clone()),
            batch_summary: Some(BatchSummary {
                total_jobs,
                successful_jobs,
                failed_jobs,
                device_used: device_name,
                time_saved_seconds,
                batch_results,
            }),
        }
    }

    /// Push jobs that are queued in the store back onto the queue.
    fn requeue(&self, ids: &[JobId]) {
        for &id in ids {
            let Some(job) = self.store.job(id) else { continue };
            if job.status != JobStatus::Queued {
                continue;
            }
            match self.queues.push(id, job.priority) {
                Ok(tier) => info!(job_id = id, queue = %tier, "Job re-enqueued"),
                Err(e) => warn!(job_id = id, error = %e, "Job stays queued until restart"),
            }
        }
    }
}
