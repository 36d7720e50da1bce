//! API server: HTTP routes and the Prometheus exporter.

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use crate::{device_rest, jobs_rest, queue_rest};
use axum::routing::{delete, get, post};
use axum::Router;
use qgjob_core::config::AppConfig;
use qgjob_scheduler::Scheduler;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub struct ApiServer {
    config: AppConfig,
    scheduler: Arc<Scheduler>,
}

impl ApiServer {
    pub fn new(config: AppConfig, scheduler: Arc<Scheduler>) -> Self {
        Self { config, scheduler }
    }

    /// All REST routes plus the OpenAPI document and Swagger UI.
    pub fn router(&self) -> Router {
        let state = AppState {
            scheduler: self.scheduler.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            // Operational
            .route("/health", get(rest::health_check))
            // Jobs
            .route("/jobs", get(jobs_rest::list_jobs))
            .route("/jobs/submit", post(jobs_rest::submit_job))
            .route(
                "/jobs/:job_id",
                get(jobs_rest::get_job).delete(jobs_rest::cancel_job),
            )
            .route("/jobs/:job_id/result", get(jobs_rest::get_job_result))
            .route("/jobs/group/:app_version_id", get(jobs_rest::group_jobs))
            .route("/batches/summary", get(jobs_rest::batch_summary))
            // Devices
            .route(
                "/devices",
                get(device_rest::list_devices).post(device_rest::create_device),
            )
            .route("/devices/status", get(device_rest::device_status))
            .route("/devices/health-check", post(device_rest::health_check_devices))
            .route("/devices/recommendations/:target", get(device_rest::recommend))
            .route("/devices/:device_id", delete(device_rest::remove_device))
            // Queues
            .route("/queues/priority-info", get(queue_rest::priority_info))
            .route("/queues/status", get(queue_rest::queue_status))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    }

    /// Serve HTTP until `shutdown` resolves.
    pub async fn start_http<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
