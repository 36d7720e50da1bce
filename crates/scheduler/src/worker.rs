//! Batch worker: a Tokio task that pulls job ids off the priority queues and
//! runs their batches.

use crate::processor::BatchProcessor;
use crate::queue::PriorityQueues;
use qgjob_core::types::JobStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct BatchWorker {
    pub worker_id: String,
    pub node_id: String,
    processor: Arc<BatchProcessor>,
}

impl BatchWorker {
    pub fn new(worker_id: String, node_id: String, processor: Arc<BatchProcessor>) -> Self {
        Self {
            worker_id,
            node_id,
            processor,
        }
    }

    /// Spawn this worker; it runs until the queue is closed and drained.
    pub fn spawn(self, queues: Arc<PriorityQueues>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                worker_id = %self.worker_id,
                node_id = %self.node_id,
                "Worker started, consuming priority queues"
            );
            self.consume(queues).await;
        })
    }

    async fn consume(self, queues: Arc<PriorityQueues>) {
        while let Some(task) = queues.pop().await {
            let report = self.processor.process(task.job_id, &self.worker_id).await;
            match (&report.batch_summary, &report.error) {
                (Some(summary), _) => info!(
                    worker_id = %self.worker_id,
                    job_id = task.job_id,
                    batch = summary.total_jobs,
                    status = %report.status,
                    "Batch processed"
                ),
                (None, Some(e)) if report.status == JobStatus::Failed => {
                    error!(worker_id = %self.worker_id, job_id = task.job_id, error = %e, "Job failed")
                }
                _ => {}
            }
        }
        warn!(worker_id = %self.worker_id, "Queue closed, worker stopping");
    }
}
