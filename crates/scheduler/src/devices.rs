//! Device pool management: priority-aware allocation, preemption, load
//! reporting and health checks.

use crate::store::{JobStore, Lease, StoreState};
use async_trait::async_trait;
use chrono::Utc;
use qgjob_core::types::{
    Device, DeviceKey, DeviceStatus, JobId, JobStatus, LeaseId, NewDevice, Priority, Target,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Average job duration used for wait estimates.
const AVG_JOB_SECS: f64 = 30.0;
/// Time a preemption takes before the requester gets its device.
const PREEMPTION_WAIT_SECS: u64 = 5;

/// Liveness check for a single device.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn is_healthy(&self, device: &Device) -> bool;
}

/// Reports every device healthy.
pub struct AlwaysHealthy;

#[async_trait]
impl DeviceProbe for AlwaysHealthy {
    async fn is_healthy(&self, _device: &Device) -> bool {
        true
    }
}

/// A device slot granted to one batch.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub lease: LeaseId,
    pub device: Device,
    /// Jobs pulled off the device to make room. They are `queued` again and
    /// must be pushed back onto the queue by the caller.
    pub preempted: Vec<JobId>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TypeStats {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
    pub offline: usize,
    pub avg_utilization: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriorityAllocation {
    pub running_jobs: usize,
    pub queued_jobs: usize,
    /// Running jobs of this priority per device type.
    pub devices_by_type: BTreeMap<Target, usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceRow {
    pub device_id: String,
    #[serde(rename = "type")]
    pub device_type: Target,
    pub status: DeviceStatus,
    pub current_jobs: u32,
    pub max_jobs: u32,
    pub utilization_percent: f64,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DevicePoolStatus {
    pub total_devices: usize,
    pub available_devices: usize,
    pub busy_devices: usize,
    /// Offline and maintenance devices.
    pub offline_devices: usize,
    pub by_type: BTreeMap<Target, TypeStats>,
    pub priority_allocation: BTreeMap<String, PriorityAllocation>,
    pub devices: Vec<DeviceRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    NoDevicesAvailable,
    ImmediateAllocation,
    PreemptionAvailable,
    QueueAndWait,
    DevicesOffline,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Recommendation {
    pub recommendation: RecommendationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds; `None` when no device of the type can serve the job.
    pub estimated_wait_time: Option<u64>,
    pub priority_advantage: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthDetail {
    pub device_id: String,
    pub status: DeviceStatus,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthCheckReport {
    pub total_checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub details: Vec<HealthDetail>,
}

/// Allocates device slots to batches and reports on the pool.
pub struct DeviceManager {
    store: Arc<JobStore>,
    probe: Arc<dyn DeviceProbe>,
}

impl DeviceManager {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self::with_probe(store, Arc::new(AlwaysHealthy))
    }

    pub fn with_probe(store: Arc<JobStore>, probe: Arc<dyn DeviceProbe>) -> Self {
        Self { store, probe }
    }

    /// Grant a slot on a device of `target` for a batch led by a job of
    /// `priority`, preempting lower-priority work for urgent jobs when the
    /// pool is saturated.
    pub fn allocate(&self, target: Target, priority: Priority) -> Option<Allocation> {
        let mut state = self.store.write();

        let selected = {
            let candidates: Vec<&Device> = state
                .devices
                .values()
                .filter(|d| d.can_handle(target))
                .collect();
            select_optimal(&candidates, priority).map(|d| d.id)
        };

        let (key, preempted) = match selected {
            Some(key) => (key, Vec::new()),
            None if priority.is_high() => match find_preemptible(&state, target, priority) {
                Some(victim) => revoke(&mut state, victim)?,
                None => {
                    debug!(target = %target, priority = %priority, "No preemptible device");
                    metrics::counter!("devices.allocation_misses").increment(1);
                    return None;
                }
            },
            None => {
                metrics::counter!("devices.allocation_misses").increment(1);
                return None;
            }
        };

        let device = state.devices.get_mut(&key)?;
        if let Err(e) = device.allocate() {
            warn!(device = %device.device_id, error = %e, "Selected device refused allocation");
            return None;
        }
        let device = device.clone();

        let lease = Uuid::new_v4();
        state.leases.insert(
            lease,
            Lease {
                id: lease,
                device: key,
                priority,
            },
        );

        metrics::counter!("devices.allocations").increment(1);
        info!(
            device = %device.device_id,
            target = %target,
            priority = %priority,
            current_jobs = device.current_jobs,
            max_jobs = device.max_concurrent_jobs,
            preempted = preempted.len(),
            "Device allocated"
        );

        Some(Allocation {
            lease,
            device,
            preempted,
        })
    }

    /// Return a lease's slot. Releasing an unknown or revoked lease is a no-op.
    pub fn release(&self, lease: LeaseId) -> bool {
        let mut state = self.store.write();
        let Some(held) = state.leases.remove(&lease) else {
            return false;
        };
        if let Some(device) = state.devices.get_mut(&held.device) {
            device.release();
            debug!(
                device = %device.device_id,
                current_jobs = device.current_jobs,
                "Device released"
            );
        }
        true
    }

    pub fn status(&self) -> DevicePoolStatus {
        let state = self.store.read();
        let mut by_type: BTreeMap<Target, TypeStats> = BTreeMap::new();
        let mut utilization: BTreeMap<Target, f64> = BTreeMap::new();
        let mut status = DevicePoolStatus {
            total_devices: state.devices.len(),
            available_devices: 0,
            busy_devices: 0,
            offline_devices: 0,
            by_type: BTreeMap::new(),
            priority_allocation: priority_allocation(&state),
            devices: Vec::with_capacity(state.devices.len()),
        };

        for device in state.devices.values() {
            let stats = by_type.entry(device.device_type).or_default();
            stats.total += 1;
            match device.status {
                DeviceStatus::Available => {
                    status.available_devices += 1;
                    stats.available += 1;
                }
                DeviceStatus::Busy => {
                    status.busy_devices += 1;
                    stats.busy += 1;
                }
                DeviceStatus::Offline | DeviceStatus::Maintenance => {
                    status.offline_devices += 1;
                    stats.offline += 1;
                }
            }
            *utilization.entry(device.device_type).or_insert(0.0) += device.utilization_percent();

            status.devices.push(DeviceRow {
                device_id: device.device_id.clone(),
                device_type: device.device_type,
                status: device.status,
                current_jobs: device.current_jobs,
                max_jobs: device.max_concurrent_jobs,
                utilization_percent: device.utilization_percent(),
                is_available: device.is_available(),
            });
        }

        for (target, stats) in by_type.iter_mut() {
            if stats.total > 0 {
                stats.avg_utilization =
                    utilization.get(target).copied().unwrap_or(0.0) / stats.total as f64;
            }
        }
        status.by_type = by_type;
        status
    }

    /// Advise a client on how soon a job of `priority` could start on `target`.
    pub fn recommend(&self, target: Target, priority: Priority) -> Recommendation {
        let state = self.store.read();
        let devices: Vec<&Device> = state
            .devices
            .values()
            .filter(|d| d.device_type == target)
            .collect();

        if devices.is_empty() {
            return Recommendation {
                recommendation: RecommendationKind::NoDevicesAvailable,
                device_id: None,
                current_utilization: None,
                message: Some(format!("No {target} devices configured")),
                estimated_wait_time: None,
                priority_advantage: false,
            };
        }

        let available: Vec<&Device> = devices.iter().copied().filter(|d| d.is_available()).collect();
        if let Some(best) = select_optimal(&available, priority) {
            return Recommendation {
                recommendation: RecommendationKind::ImmediateAllocation,
                device_id: Some(best.device_id.clone()),
                current_utilization: Some(best.utilization_percent()),
                message: None,
                estimated_wait_time: Some(0),
                priority_advantage: priority.is_high(),
            };
        }

        if priority.is_high() && find_preemptible(&state, target, priority).is_some() {
            return Recommendation {
                recommendation: RecommendationKind::PreemptionAvailable,
                device_id: None,
                current_utilization: None,
                message: Some("High priority job can preempt lower priority jobs".to_string()),
                estimated_wait_time: Some(PREEMPTION_WAIT_SECS),
                priority_advantage: true,
            };
        }

        let min_busy = devices
            .iter()
            .filter(|d| d.status == DeviceStatus::Busy)
            .map(|d| d.current_jobs)
            .min();
        if let Some(min_jobs) = min_busy {
            let mut wait = min_jobs as f64 * AVG_JOB_SECS;
            if priority.is_high() {
                wait *= 0.5;
            } else if priority == Priority::MIN {
                wait *= 1.5;
            }
            return Recommendation {
                recommendation: RecommendationKind::QueueAndWait,
                device_id: None,
                current_utilization: None,
                message: Some(format!("All {target} devices busy")),
                estimated_wait_time: Some(wait as u64),
                priority_advantage: priority.is_high(),
            };
        }

        Recommendation {
            recommendation: RecommendationKind::DevicesOffline,
            device_id: None,
            current_utilization: None,
            message: Some(format!("All {target} devices offline")),
            estimated_wait_time: None,
            priority_advantage: false,
        }
    }

    /// Probe every device and move it between `offline` and `available`.
    pub async fn health_check(&self) -> HealthCheckReport {
        let devices = self.store.devices();
        let mut verdicts = Vec::with_capacity(devices.len());
        for device in &devices {
            verdicts.push((device.id, self.probe.is_healthy(device).await));
        }

        let mut state = self.store.write();
        let mut report = HealthCheckReport {
            total_checked: verdicts.len(),
            healthy: 0,
            unhealthy: 0,
            details: Vec::with_capacity(verdicts.len()),
        };
        let now = Utc::now();

        for (key, healthy) in verdicts {
            // Removed while probing.
            let Some(device) = state.devices.get_mut(&key) else {
                report.total_checked -= 1;
                continue;
            };
            match (healthy, device.status) {
                (true, DeviceStatus::Offline) => {
                    device.status = DeviceStatus::Available;
                    info!(device = %device.device_id, "Device is back online");
                }
                (false, DeviceStatus::Available | DeviceStatus::Busy) => {
                    device.status = DeviceStatus::Offline;
                    warn!(device = %device.device_id, "Device went offline");
                }
                _ => {}
            }
            device.last_health_check = now;

            if healthy {
                report.healthy += 1;
            } else {
                report.unhealthy += 1;
            }
            report.details.push(HealthDetail {
                device_id: device.device_id.clone(),
                status: device.status,
                healthy,
            });
        }

        metrics::gauge!("devices.unhealthy").set(report.unhealthy as f64);
        report
    }

    /// Replace the pool with the built-in lab layout.
    pub fn seed_default_pool(&self) -> Vec<Device> {
        let devices = self.store.replace_devices(default_pool());
        info!(count = devices.len(), "Seeded default device pool");
        devices
    }
}

/// The lab layout: three emulators, three handsets, three cloud slots.
pub fn default_pool() -> Vec<NewDevice> {
    let capabilities = serde_json::json!({"android": true, "api_level": 29}).to_string();
    [
        ("emulator-1", Target::Emulator, 2, "Local"),
        ("emulator-2", Target::Emulator, 2, "Local"),
        ("emulator-3", Target::Emulator, 1, "Local"),
        ("device-pixel-1", Target::Device, 1, "Lab-A"),
        ("device-samsung-1", Target::Device, 1, "Lab-A"),
        ("device-oneplus-1", Target::Device, 1, "Lab-B"),
        ("browserstack-1", Target::Browserstack, 5, "US-East"),
        ("browserstack-2", Target::Browserstack, 5, "EU-West"),
        ("browserstack-3", Target::Browserstack, 3, "Asia-Pacific"),
    ]
    .into_iter()
    .map(|(name, target, max, location)| NewDevice {
        device_id: name.to_string(),
        device_type: target,
        max_concurrent_jobs: max,
        location: Some(location.to_string()),
        capabilities: Some(capabilities.clone()),
    })
    .collect()
}

/// Urgent and normal jobs take the least loaded device. Background jobs pack
/// onto the busiest device that still has room, keeping idle devices free.
/// Ties go to the lowest id.
fn select_optimal<'a>(candidates: &[&'a Device], priority: Priority) -> Option<&'a Device> {
    let mut iter = candidates.iter().copied();
    let first = iter.next()?;
    Some(iter.fold(first, |best, d| {
        let better = if priority > Priority::MIN {
            d.current_jobs < best.current_jobs
        } else {
            d.current_jobs > best.current_jobs
        };
        if better || (d.current_jobs == best.current_jobs && d.id < best.id) {
            d
        } else {
            best
        }
    }))
}

/// A lease on a busy device of `target` whose work all sits more than one
/// priority level below `priority`. Lowest device id first.
fn find_preemptible(state: &StoreState, target: Target, priority: Priority) -> Option<LeaseId> {
    let below = |p: Priority| p.get() + 1 < priority.get();
    state
        .leases
        .values()
        .filter(|lease| {
            state
                .devices
                .get(&lease.device)
                .is_some_and(|d| d.device_type == target && d.status == DeviceStatus::Busy)
                && below(lease.priority)
                && state.running_under(lease.id).all(|j| below(j.priority))
        })
        .min_by_key(|lease| (lease.device, lease.priority))
        .map(|lease| lease.id)
}

/// Drop a lease, send its running jobs back to the queue and free its slot.
fn revoke(state: &mut StoreState, lease: LeaseId) -> Option<(DeviceKey, Vec<JobId>)> {
    let held = state.leases.remove(&lease)?;
    let mut preempted = Vec::new();
    for job in state.jobs.values_mut() {
        if job.status == JobStatus::Running && job.lease == Some(lease) {
            job.status = JobStatus::Queued;
            job.unassign();
            job.touch();
            preempted.push(job.id);
        }
    }
    let device = state.devices.get_mut(&held.device)?;
    device.release();

    metrics::counter!("devices.preemptions").increment(1);
    warn!(
        device = %device.device_id,
        lease = %lease,
        jobs = ?preempted,
        "Preempted lower priority batch"
    );
    Some((held.device, preempted))
}

fn priority_allocation(state: &StoreState) -> BTreeMap<String, PriorityAllocation> {
    Priority::all_desc()
        .map(|priority| {
            let mut devices_by_type = BTreeMap::new();
            for job in state.jobs.values() {
                if job.priority != priority || job.status != JobStatus::Running {
                    continue;
                }
                if let Some(device) = job.device_id.and_then(|k| state.devices.get(&k)) {
                    *devices_by_type.entry(device.device_type).or_insert(0) += 1;
                }
            }
            (
                format!("priority_{priority}"),
                PriorityAllocation {
                    running_jobs: state.count(priority, JobStatus::Running),
                    queued_jobs: state.count(priority, JobStatus::Queued),
                    devices_by_type,
                },
            )
        })
        .collect()
}
