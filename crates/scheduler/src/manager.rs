//! Scheduler facade: owns the store, device manager, queues and worker pool.

use crate::devices::DeviceManager;
use crate::processor::BatchProcessor;
use crate::queue::PriorityQueues;
use crate::results::ResultRegistry;
use crate::runner::{build_runner, TestRunner};
use crate::store::JobStore;
use crate::worker::BatchWorker;
use parking_lot::Mutex;
use qgjob_core::config::AppConfig;
use qgjob_core::types::{Job, JobId, JobStatus, NewJob, QueueTier};
use qgjob_core::QgResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct Scheduler {
    config: AppConfig,
    store: Arc<JobStore>,
    devices: Arc<DeviceManager>,
    queues: Arc<PriorityQueues>,
    results: Arc<ResultRegistry>,
    processor: Arc<BatchProcessor>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: AppConfig, store: Arc<JobStore>) -> Self {
        let runner = build_runner(&config.runner);
        Self::with_runner(config, store, runner)
    }

    pub fn with_runner(config: AppConfig, store: Arc<JobStore>, runner: Arc<dyn TestRunner>) -> Self {
        let devices = Arc::new(DeviceManager::new(store.clone()));
        let queues = Arc::new(PriorityQueues::new());
        let results = Arc::new(ResultRegistry::new());
        let processor = Arc::new(BatchProcessor::new(
            store.clone(),
            devices.clone(),
            queues.clone(),
            runner,
            results.clone(),
            config.runner.clone(),
        ));
        Self {
            config,
            store,
            devices,
            queues,
            results,
            processor,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool and enqueue jobs left queued by a previous run.
    pub fn start(&self) -> usize {
        let mut handles = self.handles.lock();
        for i in 0..self.config.queue.workers {
            let worker_id = format!("{}-worker-{:02}", self.config.node_id, i);
            let worker = BatchWorker::new(
                worker_id.clone(),
                self.config.node_id.clone(),
                self.processor.clone(),
            );
            handles.push(worker.spawn(self.queues.clone()));
            info!(worker_id = %worker_id, "Worker spawned");
        }

        let pending = self.store.queued_jobs();
        let mut restored = 0;
        for job in &pending {
            match self.queues.push(job.id, job.priority) {
                Ok(_) => restored += 1,
                Err(e) => warn!(job_id = job.id, error = %e, "Could not restore queued job"),
            }
        }

        info!(
            workers = self.config.queue.workers,
            node = %self.config.node_id,
            restored,
            "Scheduler started"
        );
        restored
    }

    /// Record a job and route it to its priority queue. A job that cannot be
    /// enqueued is marked failed.
    pub fn submit(&self, new: NewJob) -> QgResult<(Job, QueueTier)> {
        let job = self.store.create_job(new);
        info!(
            job_id = job.id,
            org_id = %job.org_id,
            app_version_id = %job.app_version_id,
            priority = %job.priority,
            target = %job.target,
            "Job created"
        );

        match self.queues.push(job.id, job.priority) {
            Ok(tier) => {
                metrics::counter!("jobs.submitted", "queue" => tier.as_str()).increment(1);
                info!(job_id = job.id, queue = %tier, "Job routed");
                Ok((job, tier))
            }
            Err(e) => {
                error!(job_id = job.id, error = %e, "Failed to enqueue job");
                self.store.set_status(job.id, JobStatus::Failed)?;
                metrics::counter!("jobs.failed", "reason" => "enqueue").increment(1);
                Err(e)
            }
        }
    }

    /// Cancel a queued or running job. Returns its previous status.
    pub fn cancel(&self, job_id: JobId) -> QgResult<JobStatus> {
        let previous = self.store.cancel_job(job_id)?;
        metrics::counter!("jobs.cancelled").increment(1);
        info!(job_id, previous = %previous, "Job cancelled");
        Ok(previous)
    }

    /// Close the queues and stop the workers. Batches in flight return their
    /// jobs to the queued state.
    pub async fn shutdown(&self) {
        self.queues.close();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "Worker task panicked");
                }
            }
        }
        info!("Scheduler stopped");
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn devices(&self) -> &Arc<DeviceManager> {
        &self.devices
    }

    pub fn queues(&self) -> &Arc<PriorityQueues> {
        &self.queues
    }

    pub fn results(&self) -> &Arc<ResultRegistry> {
        &self.results
    }

    pub fn worker_count(&self) -> usize {
        self.handles.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgjob_core::types::{NewDevice, Priority, Target};
    use std::time::Duration;

    fn config(workers: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.queue.workers = workers;
        config.runner.time_scale = 0.0;
        config
    }

    fn new_job(app: &str, test_path: &str, priority: i64) -> NewJob {
        NewJob {
            org_id: "qualgent".to_string(),
            app_version_id: app.to_string(),
            test_path: test_path.to_string(),
            priority: Priority::new(priority).unwrap(),
            target: Target::Emulator,
        }
    }

    async fn wait_until_settled(store: &JobStore, ids: &[JobId]) {
        let settled = || ids.iter().all(|id| store.job(*id).is_some_and(|j| j.status.is_terminal()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !settled() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not settle");
    }

    #[tokio::test]
    async fn test_jobs_flow_through_workers() {
        let dir = tempfile::tempdir().unwrap();
        let test_file = dir.path().join("search.spec.js");
        std::fs::write(&test_file, "test('search', async () => {});").unwrap();
        let test_path = test_file.to_string_lossy().to_string();

        let store = Arc::new(JobStore::new());
        store
            .add_device(NewDevice {
                device_id: "emulator-1".to_string(),
                device_type: Target::Emulator,
                max_concurrent_jobs: 2,
                location: None,
                capabilities: None,
            })
            .unwrap();
        let scheduler = Scheduler::new(config(3), store.clone());
        scheduler.start();
        assert_eq!(scheduler.worker_count(), 3);

        let mut ids = Vec::new();
        for priority in [1, 3, 5] {
            let (job, tier) = scheduler.submit(new_job("v1", &test_path, priority)).unwrap();
            assert_eq!(tier, Priority::new(priority).unwrap().tier());
            ids.push(job.id);
        }
        let (missing, _) = scheduler.submit(new_job("v2", "nope.js", 2)).unwrap();
        ids.push(missing.id);

        wait_until_settled(&store, &ids).await;
        for id in &ids[..3] {
            assert_eq!(store.job(*id).unwrap().status, JobStatus::Completed);
            assert!(scheduler.results().get(*id).unwrap().result.is_some());
        }
        let failed = scheduler.results().get(missing.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Test file not found: nope.js"));
        assert_eq!(store.device(1).unwrap().current_jobs, 0);

        scheduler.shutdown().await;
        assert_eq!(scheduler.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_marks_job_failed() {
        let scheduler = Scheduler::new(config(1), Arc::new(JobStore::new()));
        scheduler.start();
        scheduler.shutdown().await;

        assert!(scheduler.submit(new_job("v1", "a.js", 2)).is_err());
        assert_eq!(scheduler.store().job(1).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_start_restores_queued_jobs() {
        let store = Arc::new(JobStore::new());
        store.create_job(new_job("v1", "a.js", 2));
        store.create_job(new_job("v1", "b.js", 4));
        let scheduler = Scheduler::new(config(0), store);
        assert_eq!(scheduler.start(), 2);
        assert_eq!(scheduler.queues().depth()[&QueueTier::High], 1);
    }

    #[test]
    fn test_cancel_queued_job() {
        let scheduler = Scheduler::new(config(0), Arc::new(JobStore::new()));
        let (job, _) = scheduler.submit(new_job("v1", "a.js", 2)).unwrap();
        assert_eq!(scheduler.cancel(job.id).unwrap(), JobStatus::Queued);
        assert!(scheduler.cancel(job.id).is_err());
    }
}
