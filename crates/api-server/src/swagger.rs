//! OpenAPI specification served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "qgjob API",
        version = "0.1.0",
        description = "Priority scheduling of mobile UI test jobs across emulators, devices and BrowserStack.\n\nJobs sharing an app version and target are batched onto one device so the app is installed once.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Operations", description = "Health probe"),
        (name = "Jobs", description = "Job submission, status, cancellation and batching"),
        (name = "Devices", description = "Device pool management and allocation advice"),
        (name = "Queues", description = "Priority queue routing and load"),
    ),
    paths(
        // Operations
        crate::rest::health_check,
        // Jobs
        crate::jobs_rest::submit_job,
        crate::jobs_rest::get_job,
        crate::jobs_rest::get_job_result,
        crate::jobs_rest::cancel_job,
        crate::jobs_rest::list_jobs,
        crate::jobs_rest::group_jobs,
        crate::jobs_rest::batch_summary,
        // Devices
        crate::device_rest::list_devices,
        crate::device_rest::create_device,
        crate::device_rest::remove_device,
        crate::device_rest::device_status,
        crate::device_rest::recommend,
        crate::device_rest::health_check_devices,
        // Queues
        crate::queue_rest::priority_info,
        crate::queue_rest::queue_status,
    ),
    components(schemas(
        // Core types
        qgjob_core::types::Priority,
        qgjob_core::types::QueueTier,
        qgjob_core::types::Target,
        qgjob_core::types::JobStatus,
        qgjob_core::types::Job,
        qgjob_core::types::DeviceStatus,
        qgjob_core::types::Device,
        qgjob_core::types::NewDevice,
        qgjob_core::types::TestReport,
        qgjob_core::types::ReportDetails,
        qgjob_core::types::JobOutcome,
        qgjob_core::types::SortField,
        qgjob_core::types::SortOrder,
        // Scheduler reports
        qgjob_scheduler::store::BatchSummaryReport,
        qgjob_scheduler::store::BatchTotals,
        qgjob_scheduler::store::BatchGroup,
        qgjob_scheduler::store::QueueStatusReport,
        qgjob_scheduler::store::TierStats,
        qgjob_scheduler::store::PriorityStats,
        qgjob_scheduler::devices::DevicePoolStatus,
        qgjob_scheduler::devices::TypeStats,
        qgjob_scheduler::devices::PriorityAllocation,
        qgjob_scheduler::devices::DeviceRow,
        qgjob_scheduler::devices::Recommendation,
        qgjob_scheduler::devices::RecommendationKind,
        qgjob_scheduler::devices::HealthCheckReport,
        qgjob_scheduler::devices::HealthDetail,
        qgjob_scheduler::queue::PriorityInfo,
        // REST types
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        crate::jobs_rest::SubmitJobRequest,
        crate::jobs_rest::SubmitJobResponse,
        crate::jobs_rest::JobDetail,
        crate::jobs_rest::GroupedJob,
        crate::jobs_rest::CancelResponse,
        crate::device_rest::DeviceEntry,
        crate::device_rest::DeviceListResponse,
        crate::device_rest::DeviceCreatedResponse,
        crate::device_rest::DeviceRemovedResponse,
        crate::queue_rest::PriorityInfoResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/jobs/submit",
            "/jobs/{job_id}",
            "/jobs/{job_id}/result",
            "/jobs",
            "/jobs/group/{app_version_id}",
            "/batches/summary",
            "/devices",
            "/devices/{device_id}",
            "/devices/status",
            "/devices/recommendations/{target}",
            "/devices/health-check",
            "/queues/priority-info",
            "/queues/status",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {expected}");
        }
    }
}
