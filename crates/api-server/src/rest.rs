//! Shared REST state, error mapping and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use qgjob_core::QgError;
use qgjob_scheduler::Scheduler;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

/// Map a domain error onto an HTTP status and JSON body.
pub fn api_error(e: QgError) -> ApiError {
    let (status, code) = match &e {
        QgError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        QgError::Conflict(_) => (StatusCode::BAD_REQUEST, "conflict"),
        QgError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        QgError::Queue(_) => (StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status.is_server_error() {
        error!(error = %e, "Request failed");
        metrics::counter!("api.errors").increment(1);
    } else {
        metrics::counter!("api.client_errors").increment(1);
    }
    (status, Json(ErrorResponse::new(code, e.to_string())))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "qgjob-server".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = api_error(QgError::NotFound("Job".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Job not found");

        let (status, body) = api_error(QgError::Conflict(
            "Cannot cancel job with status: completed".to_string(),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "conflict");

        let (status, _) = api_error(QgError::Runner("boom".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
