//! Job submission, lookup, cancellation and listing endpoints.

use crate::rest::{api_error, ApiResult, AppState, ErrorResponse};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use qgjob_core::types::{
    Job, JobId, JobOutcome, JobStatus, NewJob, Priority, QueueTier, SortField, SortOrder, Target,
};
use qgjob_core::QgError;
use qgjob_scheduler::store::{BatchSummaryReport, JobFilter};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    /// 1 (background) to 5 (urgent).
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// `emulator`, `device` or `browserstack`.
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_priority() -> i64 {
    1
}

fn default_target() -> String {
    Target::default().to_string()
}

impl SubmitJobRequest {
    fn validate(self) -> Result<NewJob, QgError> {
        let priority = Priority::new(self.priority)?;
        let target: Target = self.target.parse()?;
        for (field, value) in [
            ("org_id", &self.org_id),
            ("app_version_id", &self.app_version_id),
            ("test_path", &self.test_path),
        ] {
            if value.trim().is_empty() {
                return Err(QgError::Validation(format!("{field} must not be empty")));
            }
        }
        Ok(NewJob {
            org_id: self.org_id,
            app_version_id: self.app_version_id,
            test_path: self.test_path,
            priority,
            target,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Queue the job was routed to.
    pub queue: QueueTier,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobDetail {
    pub job_id: JobId,
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

impl From<Job> for JobDetail {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            org_id: job.org_id,
            app_version_id: job.app_version_id,
            test_path: job.test_path,
            priority: job.priority,
            target: job.target,
            status: job.status,
            assigned_device_name: job.assigned_device_name,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupedJob {
    pub job_id: JobId,
    pub status: JobStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub message: String,
    pub previous_status: JobStatus,
    pub new_status: JobStatus,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobListQuery {
    pub app_version_id: Option<String>,
    /// One status or a comma separated list, e.g. `queued,running`.
    pub status: Option<String>,
    pub priority: Option<i64>,
    pub target: Option<String>,
    pub org_id: Option<String>,
    /// Defaults to 50.
    pub limit: Option<usize>,
    /// `created` (default), `priority` or `status`.
    pub sort: Option<String>,
    /// `asc` or `desc` (default).
    pub order: Option<String>,
}

impl JobListQuery {
    fn into_filter(self) -> Result<JobFilter, QgError> {
        let statuses = match self.status.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<JobStatus>)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(JobFilter {
            app_version_id: self.app_version_id,
            statuses,
            priority: self.priority.map(Priority::new).transpose()?,
            target: self.target.as_deref().map(str::parse).transpose()?,
            org_id: self.org_id,
            sort: self
                .sort
                .as_deref()
                .map(str::parse::<SortField>)
                .transpose()?
                .unwrap_or_default(),
            order: self
                .order
                .as_deref()
                .map(str::parse::<SortOrder>)
                .transpose()?
                .unwrap_or_default(),
            limit: Some(self.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        })
    }
}

/// POST /jobs/submit: Submit a test job.
#[utoipa::path(
    post,
    path = "/jobs/submit",
    tag = "Jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 200, description = "Job queued", body = SubmitJobResponse),
        (status = 400, description = "Invalid priority, target or empty field", body = ErrorResponse),
        (status = 503, description = "Queue closed, job marked failed", body = ErrorResponse),
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<SubmitJobResponse> {
    let new = request.validate().map_err(api_error)?;
    let (job, queue) = state.scheduler.submit(new).map_err(api_error)?;
    Ok(Json(SubmitJobResponse {
        job_id: job.id,
        status: job.status,
        created_at: job.created_at,
        queue,
    }))
}

/// GET /jobs/{job_id}: Job status and assignment.
#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    tag = "Jobs",
    params(("job_id" = u64, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job details", body = JobDetail),
        (status = 404, description = "Job not found", body = ErrorResponse),
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<JobDetail> {
    state
        .scheduler
        .store()
        .job(job_id)
        .map(|job| Json(job.into()))
        .ok_or_else(|| api_error(QgError::NotFound("Job".to_string())))
}

/// GET /jobs/{job_id}/result: Outcome recorded when the job's batch ran.
#[utoipa::path(
    get,
    path = "/jobs/{job_id}/result",
    tag = "Jobs",
    params(("job_id" = u64, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job outcome", body = JobOutcome),
        (status = 404, description = "Job unknown or not finished", body = ErrorResponse),
    )
)]
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<JobOutcome> {
    if state.scheduler.store().job(job_id).is_none() {
        return Err(api_error(QgError::NotFound("Job".to_string())));
    }
    state
        .scheduler
        .results()
        .get(job_id)
        .map(Json)
        .ok_or_else(|| api_error(QgError::NotFound("Job result".to_string())))
}

/// DELETE /jobs/{job_id}: Cancel a queued or running job.
#[utoipa::path(
    delete,
    path = "/jobs/{job_id}",
    tag = "Jobs",
    params(("job_id" = u64, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job cancelled", body = CancelResponse),
        (status = 400, description = "Job already finished", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
    )
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<CancelResponse> {
    let previous_status = state.scheduler.cancel(job_id).map_err(api_error)?;
    Ok(Json(CancelResponse {
        job_id,
        message: format!("Job cancelled successfully (was {previous_status})"),
        previous_status,
        new_status: JobStatus::Failed,
    }))
}

/// GET /jobs: Filtered, sorted job listing.
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    params(JobListQuery),
    responses(
        (status = 200, description = "Matching jobs", body = Vec<Job>),
        (status = 400, description = "Unknown status, target, priority or sort", body = ErrorResponse),
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Vec<Job>> {
    let filter = query.into_filter().map_err(api_error)?;
    Ok(Json(state.scheduler.store().list_jobs(&filter)))
}

/// GET /jobs/group/{app_version_id}: Every job of one app version.
#[utoipa::path(
    get,
    path = "/jobs/group/{app_version_id}",
    tag = "Jobs",
    params(("app_version_id" = String, Path, description = "App build identifier")),
    responses(
        (status = 200, description = "Jobs of the app version", body = Vec<GroupedJob>),
    )
)]
pub async fn group_jobs(
    State(state): State<AppState>,
    Path(app_version_id): Path<String>,
) -> Json<Vec<GroupedJob>> {
    let jobs = state.scheduler.store().jobs_for_app_version(&app_version_id);
    info!(app_version_id = %app_version_id, count = jobs.len(), "Group lookup");
    Json(
        jobs.into_iter()
            .map(|j| GroupedJob {
                job_id: j.id,
                status: j.status,
                priority: j.priority,
                created_at: j.created_at,
            })
            .collect(),
    )
}

/// GET /batches/summary: How well jobs group into shared installs.
#[utoipa::path(
    get,
    path = "/batches/summary",
    tag = "Jobs",
    responses(
        (status = 200, description = "Batch grouping summary", body = BatchSummaryReport),
    )
)]
pub async fn batch_summary(State(state): State<AppState>) -> Json<BatchSummaryReport> {
    Json(state.scheduler.store().batch_summary())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(priority: i64, target: &str) -> SubmitJobRequest {
        SubmitJobRequest {
            org_id: "qualgent".to_string(),
            app_version_id: "v1".to_string(),
            test_path: "tests/a.spec.js".to_string(),
            priority,
            target: target.to_string(),
        }
    }

    #[test]
    fn test_submit_validation() {
        assert!(request(3, "device").validate().is_ok());
        assert_eq!(
            request(0, "device").validate().unwrap_err().to_string(),
            "Priority must be between 1 and 5"
        );
        assert!(request(3, "simulator").validate().is_err());

        let mut blank = request(3, "emulator");
        blank.test_path = " ".to_string();
        assert_eq!(
            blank.validate().unwrap_err().to_string(),
            "test_path must not be empty"
        );
    }

    #[test]
    fn test_submit_defaults() {
        let parsed: SubmitJobRequest = serde_json::from_str(
            r#"{"org_id": "qualgent", "app_version_id": "v1", "test_path": "a.js"}"#,
        )
        .unwrap();
        assert_eq!(parsed.priority, 1);
        assert_eq!(parsed.target, "emulator");
    }

    #[test]
    fn test_list_query_parsing() {
        let filter = JobListQuery {
            status: Some("queued, running".to_string()),
            target: Some("browserstack".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.statuses, vec![JobStatus::Queued, JobStatus::Running]);
        assert_eq!(filter.target, Some(Target::Browserstack));
        assert_eq!(filter.limit, Some(50));
        assert_eq!(filter.order, SortOrder::Desc);

        let bad = JobListQuery {
            status: Some("paused".to_string()),
            ..Default::default()
        };
        assert!(bad.into_filter().is_err());

        let sorted = JobListQuery {
            sort: Some("priority".to_string()),
            order: Some("asc".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!((sorted.sort, sorted.order), (SortField::Priority, SortOrder::Asc));

        let unknown = JobListQuery {
            sort: Some("newest".to_string()),
            ..Default::default()
        };
        assert_eq!(
            unknown.into_filter().unwrap_err().to_string(),
            "Unknown sort field 'newest'"
        );
    }
}
