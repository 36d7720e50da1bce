//! HTTP client for the qgjob server.

use crate::models::*;
use qgjob_core::types::{JobId, JobStatus, Priority, SortField, SortOrder, Target};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8002";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found")]
    NotFound,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Server error - please try again later")]
    Server,
    #[error("API error: {0}")]
    Unexpected(String),
    #[error("API error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// Classify a non-success response.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::BAD_REQUEST => ApiError::BadRequest(body),
            s if s.is_server_error() => ApiError::Server,
            _ => ApiError::Unexpected(body),
        }
    }
}

/// Filters for `GET /jobs`. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

impl JobQuery {
    pub fn with_statuses(mut self, statuses: &[JobStatus]) -> Self {
        if !statuses.is_empty() {
            let joined: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
            self.status = Some(joined.join(","));
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    org_id: &'a str,
    app_version_id: &'a str,
    test_path: &'a str,
    priority: Priority,
    target: Target,
}

#[derive(Debug, Serialize)]
pub struct NewDeviceBody {
    pub device_id: String,
    pub device_type: Target,
    pub max_concurrent_jobs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }
        Ok(resp.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.client.get(self.url(path)).send().await?;
        Self::parse(resp).await
    }

    // ─── Jobs ───────────────────────────────────────────────────────────

    pub async fn submit_job(
        &self,
        org_id: &str,
        app_version_id: &str,
        test_path: &str,
        priority: Priority,
        target: Target,
    ) -> Result<SubmitResponse, ApiError> {
        let body = SubmitBody {
            org_id,
            app_version_id,
            test_path,
            priority,
            target,
        };
        let resp = self
            .client
            .post(self.url("/jobs/submit"))
            .json(&body)
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn job(&self, job_id: JobId) -> Result<JobDetail, ApiError> {
        self.get(&format!("/jobs/{job_id}")).await
    }

    pub async fn grouped_jobs(&self, app_version_id: &str) -> Result<Vec<GroupedJob>, ApiError> {
        self.get(&format!("/jobs/group/{app_version_id}")).await
    }

    pub async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobRow>, ApiError> {
        let resp = self
            .client
            .get(self.url("/jobs"))
            .query(query)
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn cancel_job(&self, job_id: JobId) -> Result<CancelResponse, ApiError> {
        let resp = self
            .client
            .delete(self.url(&format!("/jobs/{job_id}")))
            .send()
            .await?;
        Self::parse(resp).await
    }

    // ─── Devices ────────────────────────────────────────────────────────

    pub async fn devices(&self) -> Result<DeviceList, ApiError> {
        self.get("/devices").await
    }

    pub async fn device_status(&self) -> Result<DevicePoolStatus, ApiError> {
        self.get("/devices/status").await
    }

    pub async fn recommendation(
        &self,
        target: Target,
        priority: Priority,
    ) -> Result<Recommendation, ApiError> {
        self.get(&format!(
            "/devices/recommendations/{target}?priority={priority}"
        ))
        .await
    }

    pub async fn health_check(&self) -> Result<HealthCheckReport, ApiError> {
        let resp = self
            .client
            .post(self.url("/devices/health-check"))
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn add_device(&self, device: &NewDeviceBody) -> Result<DeviceCreated, ApiError> {
        let resp = self
            .client
            .post(self.url("/devices"))
            .json(device)
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn remove_device(&self, device_id: &str) -> Result<Message, ApiError> {
        let resp = self
            .client
            .delete(self.url(&format!("/devices/{device_id}")))
            .send()
            .await?;
        Self::parse(resp).await
    }

    // ─── Queues ─────────────────────────────────────────────────────────

    pub async fn queue_status(&self) -> Result<QueueStatus, ApiError> {
        self.get("/queues/status").await
    }

    pub async fn priority_info(&self) -> Result<PriorityInfoResponse, ApiError> {
        self.get("/queues/priority-info").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ApiError::from_status(StatusCode::NOT_FOUND, String::new()).to_string(),
            "Resource not found"
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "bad priority".to_string()).to_string(),
            "Bad request: bad priority"
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, String::new()).to_string(),
            "Server error - please try again later"
        );
        assert_eq!(
            ApiError::from_status(StatusCode::CONFLICT, "busy".to_string()).to_string(),
            "API error: busy"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8002/");
        assert_eq!(client.base_url, "http://localhost:8002");
        assert_eq!(client.url("/jobs"), "http://localhost:8002/jobs");
    }

    #[test]
    fn test_job_query_skips_unset_fields() {
        let query = JobQuery {
            limit: Some(20),
            target: Some(Target::Device),
            ..Default::default()
        }
        .with_statuses(&[JobStatus::Queued, JobStatus::Running]);
        let encoded = serde_json::to_value(&query).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"status": "queued,running", "target": "device", "limit": 20})
        );
    }
}
