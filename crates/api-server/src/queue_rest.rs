//! Queue routing and load endpoints.

use crate::rest::AppState;
use axum::extract::State;
use axum::Json;
use qgjob_scheduler::queue::{PriorityInfo, PriorityQueues};
use qgjob_scheduler::store::QueueStatusReport;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct PriorityInfoResponse {
    pub priority_queues: PriorityInfo,
    pub status: String,
    pub description: String,
}

/// GET /queues/priority-info: How priorities map onto queues.
#[utoipa::path(
    get,
    path = "/queues/priority-info",
    tag = "Queues",
    responses(
        (status = 200, description = "Queue routing table", body = PriorityInfoResponse),
    )
)]
pub async fn priority_info(State(state): State<AppState>) -> Json<PriorityInfoResponse> {
    let status = if state.scheduler.queues().is_closed() {
        "closed"
    } else {
        "active"
    };
    Json(PriorityInfoResponse {
        priority_queues: PriorityQueues::priority_info(),
        status: status.to_string(),
        description: "Priority-based job routing configuration".to_string(),
    })
}

/// GET /queues/status: Queued and running jobs per priority and queue.
#[utoipa::path(
    get,
    path = "/queues/status",
    tag = "Queues",
    responses(
        (status = 200, description = "Queue load", body = QueueStatusReport),
    )
)]
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatusReport> {
    Json(state.scheduler.store().queue_status())
}
