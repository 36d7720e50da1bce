use crate::error::{QgError, QgResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub type JobId = u64;
pub type DeviceKey = u64;
pub type LeaseId = Uuid;

/// Job priority, 1 (background) through 5 (urgent).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "i64", into = "i64")]
#[schema(value_type = i64)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const MAX: Priority = Priority(5);

    pub fn new(value: i64) -> QgResult<Self> {
        if !(1..=5).contains(&value) {
            return Err(QgError::Validation(
                "Priority must be between 1 and 5".to_string(),
            ));
        }
        Ok(Self(value as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn tier(self) -> QueueTier {
        match self.0 {
            4..=5 => QueueTier::High,
            2..=3 => QueueTier::Normal,
            _ => QueueTier::Low,
        }
    }

    /// High-priority jobs get the least loaded device and may preempt.
    pub fn is_high(self) -> bool {
        self.0 >= 4
    }

    /// All priorities, highest first.
    pub fn all_desc() -> impl Iterator<Item = Priority> {
        (1..=5u8).rev().map(Priority)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<i64> for Priority {
    type Error = QgError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Priority::new(value)
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        p.0 as i64
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue a job is routed to, derived from its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum QueueTier {
    #[serde(rename = "high_priority")]
    High,
    #[serde(rename = "normal_priority")]
    Normal,
    #[serde(rename = "low_priority")]
    Low,
}

impl QueueTier {
    /// Processing order.
    pub const ALL: [QueueTier; 3] = [QueueTier::High, QueueTier::Normal, QueueTier::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueTier::High => "high_priority",
            QueueTier::Normal => "normal_priority",
            QueueTier::Low => "low_priority",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            QueueTier::High => "High Priority Queue",
            QueueTier::Normal => "Normal Priority Queue",
            QueueTier::Low => "Low Priority Queue",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            QueueTier::High => "Urgent jobs (priority 4-5) - processed first",
            QueueTier::Normal => "Standard jobs (priority 2-3) - default processing",
            QueueTier::Low => "Background jobs (priority 1) - processed when idle",
        }
    }

    /// Position in processing order.
    pub fn slot(self) -> usize {
        match self {
            QueueTier::High => 0,
            QueueTier::Normal => 1,
            QueueTier::Low => 2,
        }
    }
}

impl fmt::Display for QueueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution environment a test job runs against.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Emulator,
    Device,
    Browserstack,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Emulator, Target::Device, Target::Browserstack];

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Emulator => "emulator",
            Target::Device => "device",
            Target::Browserstack => "browserstack",
        }
    }

    /// Seconds a simulated test run takes on this target.
    pub fn simulated_run_secs(self) -> u64 {
        match self {
            Target::Emulator => 3,
            Target::Device => 5,
            Target::Browserstack => 8,
        }
    }

    /// Seconds needed to install the app under test. Batching jobs that share
    /// an app version saves one installation per extra job.
    pub fn install_secs(self) -> u64 {
        match self {
            Target::Emulator => 5,
            Target::Device => 10,
            Target::Browserstack => 15,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = QgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "emulator" => Ok(Target::Emulator),
            "device" => Ok(Target::Device),
            "browserstack" => Ok(Target::Browserstack),
            other => Err(QgError::Validation(format!(
                "Unknown target '{other}': expected emulator, device or browserstack"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = QgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(QgError::Validation(format!("Unknown job status '{other}'"))),
        }
    }
}

/// A submitted test job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: JobId,
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub priority: Priority,
    pub target: Target,
    pub status: JobStatus,
    /// Store key of the device the job is assigned to.
    pub device_id: Option<DeviceKey>,
    pub assigned_device_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Device lease the job currently runs under. Leases do not survive a
    /// restart, so this is never persisted.
    #[serde(skip)]
    pub lease: Option<LeaseId>,
}

impl Job {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Detach the job from its device and lease.
    pub fn unassign(&mut self) {
        self.device_id = None;
        self.assigned_device_name = None;
        self.lease = None;
    }
}

/// Fields supplied when submitting a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub priority: Priority,
    pub target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Available,
    Busy,
    Offline,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Available => "available",
            DeviceStatus::Busy => "busy",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device (emulator, physical handset or cloud slot) in the pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub id: DeviceKey,
    /// Unique human-readable name, e.g. `emulator-1`.
    pub device_id: String,
    pub device_type: Target,
    pub status: DeviceStatus,
    pub max_concurrent_jobs: u32,
    pub current_jobs: u32,
    pub location: Option<String>,
    /// JSON string describing device capabilities.
    pub capabilities: Option<String>,
    pub last_health_check: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn is_available(&self) -> bool {
        self.status == DeviceStatus::Available && self.current_jobs < self.max_concurrent_jobs
    }

    pub fn utilization_percent(&self) -> f64 {
        if self.max_concurrent_jobs == 0 {
            return 0.0;
        }
        self.current_jobs as f64 / self.max_concurrent_jobs as f64 * 100.0
    }

    pub fn can_handle(&self, target: Target) -> bool {
        self.device_type == target && self.is_available()
    }

    /// Take one job slot on this device.
    pub fn allocate(&mut self) -> QgResult<()> {
        if !self.is_available() {
            return Err(QgError::Allocation(format!(
                "Device {} is not available for job allocation",
                self.device_id
            )));
        }
        self.current_jobs += 1;
        if self.current_jobs >= self.max_concurrent_jobs {
            self.status = DeviceStatus::Busy;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Return one job slot.
    pub fn release(&mut self) {
        if self.current_jobs > 0 {
            self.current_jobs -= 1;
        }
        if self.current_jobs < self.max_concurrent_jobs && self.status == DeviceStatus::Busy {
            self.status = DeviceStatus::Available;
        }
        self.updated_at = Utc::now();
    }
}

/// Fields supplied when registering a device.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDevice {
    pub device_id: String,
    pub device_type: Target,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub capabilities: Option<String>,
}

fn default_max_concurrent_jobs() -> u32 {
    1
}

impl NewDevice {
    /// A device must be able to hold at least one job.
    pub fn validate(&self) -> QgResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(QgError::Validation(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of executing a single test file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestReport {
    pub test_file: String,
    pub app_version_id: String,
    pub target: Target,
    /// Wall-clock seconds spent running the test.
    pub execution_time: f64,
    pub tests_run: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    pub details: ReportDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReportDetails {
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Runner configuration used for the run (device, build, provider).
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub target_config: Option<serde_json::Value>,
    #[serde(default)]
    pub test_output: Option<String>,
}

/// Final outcome of one job inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TestReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Field used to order job listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Created,
    Priority,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortField {
    type Err = QgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(SortField::Created),
            "priority" => Ok(SortField::Priority),
            "status" => Ok(SortField::Status),
            other => Err(QgError::Validation(format!("Unknown sort field '{other}'"))),
        }
    }
}

impl FromStr for SortOrder {
    type Err = QgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(QgError::Validation(format!("Unknown sort order '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(max: u32) -> Device {
        let now = Utc::now();
        Device {
            id: 1,
            device_id: "emulator-1".to_string(),
            device_type: Target::Emulator,
            status: DeviceStatus::Available,
            max_concurrent_jobs: max,
            current_jobs: 0,
            location: None,
            capabilities: None,
            last_health_check: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_priority_bounds_and_tiers() {
        assert!(Priority::new(0).is_err());
        assert!(Priority::new(6).is_err());
        assert_eq!(Priority::new(5).unwrap().tier(), QueueTier::High);
        assert_eq!(Priority::new(4).unwrap().tier(), QueueTier::High);
        assert_eq!(Priority::new(3).unwrap().tier(), QueueTier::Normal);
        assert_eq!(Priority::new(2).unwrap().tier(), QueueTier::Normal);
        assert_eq!(Priority::new(1).unwrap().tier(), QueueTier::Low);
        assert_eq!(Priority::default(), Priority::MIN);
    }

    #[test]
    fn test_priority_rejected_during_deserialization() {
        let ok: Priority = serde_json::from_str("3").unwrap();
        assert_eq!(ok.get(), 3);
        assert!(serde_json::from_str::<Priority>("9").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "3");
    }

    #[test]
    fn test_tier_names_serialize_as_queue_names() {
        assert_eq!(
            serde_json::to_string(&QueueTier::Normal).unwrap(),
            "\"normal_priority\""
        );
        assert_eq!(QueueTier::ALL[0], QueueTier::High);
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("BrowserStack".parse::<Target>().unwrap(), Target::Browserstack);
        assert!("local".parse::<Target>().is_err());
        assert_eq!(Target::Device.install_secs(), 10);
        assert_eq!(Target::Browserstack.simulated_run_secs(), 8);
    }

    #[test]
    fn test_device_allocation_cycle() {
        let mut d = device(2);
        d.allocate().unwrap();
        assert_eq!(d.status, DeviceStatus::Available);
        assert_eq!(d.utilization_percent(), 50.0);
        d.allocate().unwrap();
        assert_eq!(d.status, DeviceStatus::Busy);
        assert!(!d.is_available());
        assert!(d.allocate().is_err());

        d.release();
        assert_eq!(d.status, DeviceStatus::Available);
        assert_eq!(d.current_jobs, 1);
        d.release();
        d.release();
        assert_eq!(d.current_jobs, 0);
    }

    #[test]
    fn test_release_keeps_offline_device_offline() {
        let mut d = device(1);
        d.allocate().unwrap();
        d.status = DeviceStatus::Offline;
        d.release();
        assert_eq!(d.status, DeviceStatus::Offline);
        assert!(!d.can_handle(Target::Emulator));
    }

    #[test]
    fn test_new_device_needs_capacity() {
        let mut new = NewDevice {
            device_id: "emulator-9".to_string(),
            device_type: Target::Emulator,
            max_concurrent_jobs: 0,
            location: None,
            capabilities: None,
        };
        assert_eq!(
            new.validate().unwrap_err().to_string(),
            "max_concurrent_jobs must be at least 1"
        );
        new.max_concurrent_jobs = 1;
        assert!(new.validate().is_ok());
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Queued.is_active());
        assert_eq!("RUNNING".parse::<JobStatus>().unwrap(), JobStatus::Running);
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!("priority".parse::<SortField>().unwrap(), SortField::Priority);
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("name".parse::<SortField>().is_err());
    }
}
