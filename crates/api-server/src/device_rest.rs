//! Device pool endpoints.

use crate::rest::{api_error, ApiResult, AppState, ErrorResponse};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use qgjob_core::types::{Device, DeviceStatus, NewDevice, Priority, Target};
use qgjob_scheduler::devices::{DevicePoolStatus, HealthCheckReport, Recommendation};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

/// A pool entry together with its current load.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceEntry {
    #[serde(flatten)]
    pub device: Device,
    pub utilization_percent: f64,
}

impl From<Device> for DeviceEntry {
    fn from(device: Device) -> Self {
        Self {
            utilization_percent: device.utilization_percent(),
            device,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceCreatedResponse {
    pub device_id: String,
    pub status: DeviceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceRemovedResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecommendQuery {
    /// Priority of the job being planned, 1 to 5. Defaults to 1.
    pub priority: Option<i64>,
}

/// GET /devices: Every device in the pool.
#[utoipa::path(
    get,
    path = "/devices",
    tag = "Devices",
    responses(
        (status = 200, description = "Device pool", body = DeviceListResponse),
    )
)]
pub async fn list_devices(State(state): State<AppState>) -> Json<DeviceListResponse> {
    Json(DeviceListResponse {
        devices: state
            .scheduler
            .store()
            .devices()
            .into_iter()
            .map(DeviceEntry::from)
            .collect(),
    })
}

/// POST /devices: Register a device.
#[utoipa::path(
    post,
    path = "/devices",
    tag = "Devices",
    request_body = NewDevice,
    responses(
        (status = 200, description = "Device registered", body = DeviceCreatedResponse),
        (status = 400, description = "Device ID already exists or max_concurrent_jobs is 0", body = ErrorResponse),
    )
)]
pub async fn create_device(
    State(state): State<AppState>,
    Json(request): Json<NewDevice>,
) -> ApiResult<DeviceCreatedResponse> {
    let device = state.scheduler.store().add_device(request).map_err(api_error)?;
    info!(device_id = %device.device_id, device_type = %device.device_type, "Device registered");
    metrics::counter!("devices.registered").increment(1);
    Ok(Json(DeviceCreatedResponse {
        device_id: device.device_id,
        status: device.status,
        created_at: device.created_at,
    }))
}

/// DELETE /devices/{device_id}: Remove an idle device.
#[utoipa::path(
    delete,
    path = "/devices/{device_id}",
    tag = "Devices",
    params(("device_id" = String, Path, description = "Device name, e.g. emulator-1")),
    responses(
        (status = 200, description = "Device removed", body = DeviceRemovedResponse),
        (status = 400, description = "Device has running jobs", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn remove_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<DeviceRemovedResponse> {
    state
        .scheduler
        .store()
        .remove_device(&device_id)
        .map_err(api_error)?;
    info!(device_id = %device_id, "Device removed");
    Ok(Json(DeviceRemovedResponse {
        message: format!("Device {device_id} removed successfully"),
    }))
}

/// GET /devices/status: Pool utilisation by type and priority.
#[utoipa::path(
    get,
    path = "/devices/status",
    tag = "Devices",
    responses(
        (status = 200, description = "Pool status", body = DevicePoolStatus),
    )
)]
pub async fn device_status(State(state): State<AppState>) -> Json<DevicePoolStatus> {
    Json(state.scheduler.devices().status())
}

/// GET /devices/recommendations/{target}: Expected wait for a new job.
#[utoipa::path(
    get,
    path = "/devices/recommendations/{target}",
    tag = "Devices",
    params(
        ("target" = String, Path, description = "emulator, device or browserstack"),
        RecommendQuery,
    ),
    responses(
        (status = 200, description = "Allocation advice", body = Recommendation),
        (status = 400, description = "Unknown target or priority", body = ErrorResponse),
    )
)]
pub async fn recommend(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Query(query): Query<RecommendQuery>,
) -> ApiResult<Recommendation> {
    let target: Target = target.parse().map_err(api_error)?;
    let priority = query
        .priority
        .map(Priority::new)
        .transpose()
        .map_err(api_error)?
        .unwrap_or_default();
    Ok(Json(state.scheduler.devices().recommend(target, priority)))
}

/// POST /devices/health-check: Probe every device now.
#[utoipa::path(
    post,
    path = "/devices/health-check",
    tag = "Devices",
    responses(
        (status = 200, description = "Health check results", body = HealthCheckReport),
    )
)]
pub async fn health_check_devices(State(state): State<AppState>) -> Json<HealthCheckReport> {
    Json(state.scheduler.devices().health_check().await)
}
