//! Per-job outcomes of finished batches, served by `GET /jobs/{id}/result`.

use dashmap::DashMap;
use qgjob_core::types::{JobId, JobOutcome};

#[derive(Default)]
pub struct ResultRegistry {
    outcomes: DashMap<JobId, JobOutcome>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: JobOutcome) {
        self.outcomes.insert(outcome.job_id, outcome);
    }

    pub fn get(&self, job_id: JobId) -> Option<JobOutcome> {
        self.outcomes.get(&job_id).map(|o| o.value().clone())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgjob_core::types::JobStatus;

    #[test]
    fn test_latest_outcome_wins() {
        let registry = ResultRegistry::new();
        assert!(registry.is_empty());
        registry.record(JobOutcome {
            job_id: 7,
            status: JobStatus::Failed,
            result: None,
            error: Some("Test file not found: a.js".to_string()),
            device: None,
        });
        registry.record(JobOutcome {
            job_id: 7,
            status: JobStatus::Completed,
            result: None,
            error: None,
            device: Some("emulator-1".to_string()),
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(7).unwrap().status, JobStatus::Completed);
        assert!(registry.get(8).is_none());
    }
}
