//! In-process registry of jobs and devices.
//!
//! Every mutation that touches more than one entity (device allocation,
//! preemption, batch claims, completion) runs under the single store lock, so
//! the scheduler never observes a half-applied transition.

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use qgjob_core::types::{
    Device, DeviceKey, DeviceStatus, Job, JobId, JobStatus, LeaseId, NewDevice, NewJob, Priority,
    QueueTier, SortField, SortOrder, Target,
};
use qgjob_core::{QgError, QgResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};
use utoipa::ToSchema;

/// A device slot held by one batch.
#[derive(Debug, Clone)]
pub struct Lease {
    pub id: LeaseId,
    pub device: DeviceKey,
    pub priority: Priority,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreState {
    pub(crate) jobs: BTreeMap<JobId, Job>,
    pub(crate) devices: BTreeMap<DeviceKey, Device>,
    #[serde(skip)]
    pub(crate) leases: HashMap<LeaseId, Lease>,
    next_job_id: JobId,
    next_device_id: DeviceKey,
}

impl StoreState {
    pub(crate) fn running_under(&self, lease: LeaseId) -> impl Iterator<Item = &Job> {
        self.jobs
            .values()
            .filter(move |j| j.status == JobStatus::Running && j.lease == Some(lease))
    }

    pub(crate) fn count(&self, priority: Priority, status: JobStatus) -> usize {
        self.jobs
            .values()
            .filter(|j| j.priority == priority && j.status == status)
            .count()
    }

    /// Leases do not survive a restart: running jobs go back to the queue and
    /// every device starts empty.
    fn reset_in_flight(&mut self) {
        self.leases.clear();
        for job in self.jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Queued;
                job.unassign();
                job.touch();
            }
        }
        for device in self.devices.values_mut() {
            device.current_jobs = 0;
            if device.status == DeviceStatus::Busy {
                device.status = DeviceStatus::Available;
            }
        }
        self.next_job_id = self.next_job_id.max(self.jobs.keys().max().copied().unwrap_or(0));
        self.next_device_id = self
            .next_device_id
            .max(self.devices.keys().max().copied().unwrap_or(0));
    }
}

/// Criteria for [`JobStore::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub app_version_id: Option<String>,
    /// Matches any of the listed statuses; empty matches all.
    pub statuses: Vec<JobStatus>,
    pub priority: Option<Priority>,
    pub target: Option<Target>,
    pub org_id: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        self.app_version_id
            .as_ref()
            .map_or(true, |v| &job.app_version_id == v)
            && (self.statuses.is_empty() || self.statuses.contains(&job.status))
            && self.priority.map_or(true, |p| job.priority == p)
            && self.target.map_or(true, |t| job.target == t)
            && self.org_id.as_ref().map_or(true, |o| &job.org_id == o)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchGroup {
    pub app_version_id: String,
    pub target: Target,
    pub total_jobs: usize,
    pub status_breakdown: BTreeMap<JobStatus, usize>,
    pub first_job: DateTime<Utc>,
    pub last_job: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchTotals {
    pub total_batches: usize,
    pub total_jobs: usize,
    pub average_batch_size: f64,
    pub potential_time_saved_seconds: u64,
}

/// Jobs grouped by (app version, target): each group shares one install.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchSummaryReport {
    pub summary: BatchTotals,
    pub batches: Vec<BatchGroup>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TierStats {
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub total_active: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriorityStats {
    pub queue_name: QueueTier,
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub total_active: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueStatusReport {
    pub queue_summary: BTreeMap<QueueTier, TierStats>,
    /// Keyed `priority_1` .. `priority_5`.
    pub priority_breakdown: BTreeMap<String, PriorityStats>,
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe job and device registry with optional JSON snapshots.
pub struct JobStore {
    state: RwLock<StoreState>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Restore from a snapshot file. A missing file yields an empty store.
    pub fn load(path: &Path) -> QgResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No snapshot found, starting with an empty store");
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        let mut state: StoreState = serde_json::from_slice(&bytes)?;
        if let Some(device) = state.devices.values().find(|d| d.max_concurrent_jobs == 0) {
            return Err(QgError::Validation(format!(
                "Snapshot device {} has max_concurrent_jobs 0",
                device.device_id
            )));
        }
        state.reset_in_flight();
        info!(
            path = %path.display(),
            jobs = state.jobs.len(),
            devices = state.devices.len(),
            "Store restored from snapshot"
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Write the current state atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> QgResult<()> {
        let bytes = {
            let state = self.state.read();
            serde_json::to_vec_pretty(&*state)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write()
    }

    // ─── Jobs ───────────────────────────────────────────────────────────

    pub fn create_job(&self, new: NewJob) -> Job {
        let mut state = self.state.write();
        state.next_job_id += 1;
        let now = Utc::now();
        let job = Job {
            id: state.next_job_id,
            org_id: new.org_id,
            app_version_id: new.app_version_id,
            test_path: new.test_path,
            priority: new.priority,
            target: new.target,
            status: JobStatus::Queued,
            device_id: None,
            assigned_device_name: None,
            created_at: now,
            updated_at: now,
            lease: None,
        };
        state.jobs.insert(job.id, job.clone());
        job
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        self.state.read().jobs.get(&id).cloned()
    }

    pub fn jobs_for_app_version(&self, app_version_id: &str) -> Vec<Job> {
        self.state
            .read()
            .jobs
            .values()
            .filter(|j| j.app_version_id == app_version_id)
            .cloned()
            .collect()
    }

    /// Queued jobs in submission order.
    pub fn queued_jobs(&self) -> Vec<Job> {
        self.state
            .read()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect()
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .state
            .read()
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();

        // Stable sorts, so equal keys keep submission order.
        match (filter.sort, filter.order) {
            (SortField::Created, SortOrder::Asc) => jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            (SortField::Created, SortOrder::Desc) => jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            (SortField::Priority, SortOrder::Asc) => jobs.sort_by(|a, b| a.priority.cmp(&b.priority)),
            (SortField::Priority, SortOrder::Desc) => jobs.sort_by(|a, b| b.priority.cmp(&a.priority)),
            (SortField::Status, SortOrder::Asc) => {
                jobs.sort_by(|a, b| a.status.as_str().cmp(b.status.as_str()))
            }
            (SortField::Status, SortOrder::Desc) => {
                jobs.sort_by(|a, b| b.status.as_str().cmp(a.status.as_str()))
            }
        }

        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        jobs
    }

    /// Cancel a queued or running job. Returns the status it had before.
    pub fn cancel_job(&self, id: JobId) -> QgResult<JobStatus> {
        let mut state = self.state.write();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QgError::NotFound("Job".to_string()))?;
        if job.status.is_terminal() {
            return Err(QgError::Conflict(format!(
                "Cannot cancel job with status: {}",
                job.status
            )));
        }
        let previous = job.status;
        job.status = JobStatus::Failed;
        job.touch();
        Ok(previous)
    }

    pub fn set_status(&self, id: JobId, status: JobStatus) -> QgResult<()> {
        let mut state = self.state.write();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QgError::NotFound("Job".to_string()))?;
        job.status = status;
        job.touch();
        Ok(())
    }

    /// Move every queued job sharing `lead`'s app version and target onto
    /// the lease's device. Returns the claimed jobs in id order.
    pub fn claim_batch(&self, lead: &Job, lease: LeaseId) -> QgResult<Vec<Job>> {
        let mut state = self.state.write();
        let device_key = state
            .leases
            .get(&lease)
            .map(|l| l.device)
            .ok_or_else(|| QgError::Allocation(format!("Lease {lease} is no longer held")))?;
        let device_name = state
            .devices
            .get(&device_key)
            .map(|d| d.device_id.clone())
            .ok_or_else(|| QgError::NotFound("Device".to_string()))?;

        let mut claimed = Vec::new();
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Queued
                && job.app_version_id == lead.app_version_id
                && job.target == lead.target
            {
                job.status = JobStatus::Running;
                job.device_id = Some(device_key);
                job.assigned_device_name = Some(device_name.clone());
                job.lease = Some(lease);
                job.touch();
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    pub fn is_running_under(&self, id: JobId, lease: LeaseId) -> bool {
        self.state
            .read()
            .jobs
            .get(&id)
            .is_some_and(|j| j.status == JobStatus::Running && j.lease == Some(lease))
    }

    /// Record a job's final status, but only if it still runs under `lease`.
    /// Cancelled or preempted jobs are left untouched.
    pub fn finish_job(&self, id: JobId, lease: LeaseId, status: JobStatus) -> bool {
        let mut state = self.state.write();
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Running && job.lease == Some(lease) => {
                job.status = status;
                job.lease = None;
                job.touch();
                true
            }
            _ => false,
        }
    }

    /// Fail every job still running under `lease`. Returns how many changed.
    pub fn fail_running(&self, lease: LeaseId) -> usize {
        let mut state = self.state.write();
        let mut failed = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Running && job.lease == Some(lease) {
                job.status = JobStatus::Failed;
                job.lease = None;
                job.touch();
                failed += 1;
            }
        }
        failed
    }

    /// Put every job still running under `lease` back in the queued state.
    pub fn requeue_running(&self, lease: LeaseId) -> Vec<JobId> {
        let mut state = self.state.write();
        let mut requeued = Vec::new();
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Running && job.lease == Some(lease) {
                job.status = JobStatus::Queued;
                job.unassign();
                job.touch();
                requeued.push(job.id);
            }
        }
        requeued
    }

    // ─── Devices ────────────────────────────────────────────────────────

    pub fn add_device(&self, new: NewDevice) -> QgResult<Device> {
        new.validate()?;
        let mut state = self.state.write();
        if state.devices.values().any(|d| d.device_id == new.device_id) {
            return Err(QgError::Conflict("Device ID already exists".to_string()));
        }
        Ok(insert_device(&mut state, new))
    }

    /// Remove a device by its name. Devices with running jobs are kept.
    pub fn remove_device(&self, device_id: &str) -> QgResult<Device> {
        let mut state = self.state.write();
        let key = state
            .devices
            .values()
            .find(|d| d.device_id == device_id)
            .map(|d| d.id)
            .ok_or_else(|| QgError::NotFound("Device".to_string()))?;
        if state.devices[&key].current_jobs > 0 {
            return Err(QgError::Conflict(
                "Cannot remove device with running jobs".to_string(),
            ));
        }
        state
            .devices
            .remove(&key)
            .ok_or_else(|| QgError::NotFound("Device".to_string()))
    }

    /// Drop the whole pool and register `pool` in its place.
    pub fn replace_devices(&self, pool: Vec<NewDevice>) -> Vec<Device> {
        let mut state = self.state.write();
        if state.devices.values().any(|d| d.current_jobs > 0) {
            warn!("Replacing device pool while devices still hold jobs");
        }
        state.devices.clear();
        state.leases.clear();
        pool.into_iter()
            .filter(|new| match new.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(device_id = %new.device_id, error = %e, "Skipping device");
                    false
                }
            })
            .map(|new| insert_device(&mut state, new))
            .collect()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.state.read().devices.values().cloned().collect()
    }

    pub fn device(&self, key: DeviceKey) -> Option<Device> {
        self.state.read().devices.get(&key).cloned()
    }

    // ─── Reports ────────────────────────────────────────────────────────

    pub fn batch_summary(&self) -> BatchSummaryReport {
        let state = self.state.read();
        let mut groups: BTreeMap<(String, Target), BatchGroup> = BTreeMap::new();

        for job in state.jobs.values() {
            let group = groups
                .entry((job.app_version_id.clone(), job.target))
                .or_insert_with(|| BatchGroup {
                    app_version_id: job.app_version_id.clone(),
                    target: job.target,
                    total_jobs: 0,
                    status_breakdown: BTreeMap::new(),
                    first_job: job.created_at,
                    last_job: job.created_at,
                });
            group.total_jobs += 1;
            *group.status_breakdown.entry(job.status).or_insert(0) += 1;
            group.first_job = group.first_job.min(job.created_at);
            group.last_job = group.last_job.max(job.created_at);
        }

        let batches: Vec<BatchGroup> = groups.into_values().collect();
        let total_batches = batches.len();
        let total_jobs: usize = batches.iter().map(|b| b.total_jobs).sum();
        let potential_time_saved_seconds = batches
            .iter()
            .map(|b| b.total_jobs.saturating_sub(1) as u64 * b.target.install_secs())
            .sum();
        let average_batch_size = if total_batches > 0 {
            (total_jobs as f64 / total_batches as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        BatchSummaryReport {
            summary: BatchTotals {
                total_batches,
                total_jobs,
                average_batch_size,
                potential_time_saved_seconds,
            },
            batches,
        }
    }

    pub fn queue_status(&self) -> QueueStatusReport {
        let state = self.state.read();
        let mut queue_summary: BTreeMap<QueueTier, TierStats> = QueueTier::ALL
            .iter()
            .map(|t| (*t, TierStats::default()))
            .collect();
        let mut priority_breakdown = BTreeMap::new();

        for priority in Priority::all_desc() {
            let queued_jobs = state.count(priority, JobStatus::Queued);
            let running_jobs = state.count(priority, JobStatus::Running);
            let tier = queue_summary.entry(priority.tier()).or_default();
            tier.queued_jobs += queued_jobs;
            tier.running_jobs += running_jobs;
            tier.total_active += queued_jobs + running_jobs;

            priority_breakdown.insert(
                format!("priority_{priority}"),
                PriorityStats {
                    queue_name: priority.tier(),
                    queued_jobs,
                    running_jobs,
                    total_active: queued_jobs + running_jobs,
                },
            );
        }

        QueueStatusReport {
            queue_summary,
            priority_breakdown,
            timestamp: Utc::now(),
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_device(state: &mut StoreState, new: NewDevice) -> Device {
    state.next_device_id += 1;
    let now = Utc::now();
    let device = Device {
        id: state.next_device_id,
        device_id: new.device_id,
        device_type: new.device_type,
        status: DeviceStatus::Available,
        max_concurrent_jobs: new.max_concurrent_jobs,
        current_jobs: 0,
        location: new.location,
        capabilities: new.capabilities,
        last_health_check: now,
        created_at: now,
        updated_at: now,
    };
    state.devices.insert(device.id, device.clone());
    device
}
