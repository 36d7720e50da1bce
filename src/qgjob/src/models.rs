//! Response bodies of the qgjob server as the CLI reads them.

use chrono::{DateTime, Utc};
use qgjob_core::types::{DeviceStatus, JobId, JobStatus, Priority, QueueTier, Target};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub queue: QueueTier,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDetail {
    pub job_id: JobId,
    pub app_version_id: String,
    pub test_path: String,
    pub priority: Priority,
    pub target: Target,
    pub status: JobStatus,
    pub assigned_device_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupedJob {
    pub job_id: JobId,
    pub status: JobStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Row of `GET /jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRow {
    pub id: JobId,
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub priority: Priority,
    pub target: Target,
    pub status: JobStatus,
    pub assigned_device_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub device_type: Target,
    pub status: DeviceStatus,
    pub max_concurrent_jobs: u32,
    pub current_jobs: u32,
    pub location: Option<String>,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceList {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCreated {
    pub device_id: String,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeStats {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
    pub offline: usize,
    pub avg_utilization: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityAllocation {
    pub running_jobs: usize,
    pub queued_jobs: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicePoolStatus {
    pub total_devices: usize,
    pub available_devices: usize,
    pub busy_devices: usize,
    pub offline_devices: usize,
    pub by_type: BTreeMap<Target, TypeStats>,
    pub priority_allocation: BTreeMap<String, PriorityAllocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recommendation {
    pub recommendation: String,
    pub device_id: Option<String>,
    pub current_utilization: Option<f64>,
    pub message: Option<String>,
    pub estimated_wait_time: Option<u64>,
    #[serde(default)]
    pub priority_advantage: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthDetail {
    pub device_id: String,
    pub status: DeviceStatus,
    pub healthy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckReport {
    pub total_checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub details: Vec<HealthDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierStats {
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub total_active: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityStats {
    pub queue_name: QueueTier,
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub total_active: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub queue_summary: BTreeMap<QueueTier, TierStats>,
    pub priority_breakdown: BTreeMap<String, PriorityStats>,
    pub timestamp: DateTime<Utc>,
}

impl QueueStatus {
    pub fn total_queued(&self) -> usize {
        self.queue_summary.values().map(|s| s.queued_jobs).sum()
    }

    pub fn total_running(&self) -> usize {
        self.queue_summary.values().map(|s| s.running_jobs).sum()
    }

    /// Active priorities, highest first.
    pub fn active_priorities(&self) -> Vec<(u8, &PriorityStats)> {
        let mut rows: Vec<(u8, &PriorityStats)> = self
            .priority_breakdown
            .iter()
            .filter(|(_, stats)| stats.total_active > 0)
            .filter_map(|(key, stats)| {
                key.strip_prefix("priority_")
                    .and_then(|n| n.parse().ok())
                    .map(|n| (n, stats))
            })
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityInfo {
    pub priority_mapping: BTreeMap<String, QueueTier>,
    pub queue_order: Vec<QueueTier>,
    pub description: BTreeMap<QueueTier, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityInfoResponse {
    pub priority_queues: PriorityInfo,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_status_parses_server_shape() {
        let body = r#"{
            "queue_summary": {
                "high_priority": {"queued_jobs": 2, "running_jobs": 1, "total_active": 3},
                "normal_priority": {"queued_jobs": 0, "running_jobs": 0, "total_active": 0},
                "low_priority": {"queued_jobs": 1, "running_jobs": 0, "total_active": 1}
            },
            "priority_breakdown": {
                "priority_1": {"queue_name": "low_priority", "queued_jobs": 1, "running_jobs": 0, "total_active": 1},
                "priority_4": {"queue_name": "high_priority", "queued_jobs": 0, "running_jobs": 1, "total_active": 1},
                "priority_5": {"queue_name": "high_priority", "queued_jobs": 2, "running_jobs": 0, "total_active": 2},
                "priority_3": {"queue_name": "normal_priority", "queued_jobs": 0, "running_jobs": 0, "total_active": 0}
            },
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;
        let status: QueueStatus = serde_json::from_str(body).unwrap();
        assert_eq!(status.total_queued(), 3);
        assert_eq!(status.total_running(), 1);
        let order: Vec<u8> = status.active_priorities().iter().map(|(p, _)| *p).collect();
        assert_eq!(order, vec![5, 4, 1]);
    }
}
