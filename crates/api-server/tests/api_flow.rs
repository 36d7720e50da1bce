//! End-to-end flow through the HTTP router: submit, inspect, batch, cancel.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use qgjob_api::ApiServer;
use qgjob_core::config::AppConfig;
use qgjob_core::types::{JobOutcome, JobStatus, NewDevice, Priority, Target};
use qgjob_scheduler::{JobStore, Scheduler};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn config(workers: usize, workspace: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.queue.workers = workers;
    config.runner.time_scale = 0.0;
    config.runner.workspace_dir = workspace.to_path_buf();
    config
}

fn emulator(name: &str, max: u32) -> NewDevice {
    NewDevice {
        device_id: name.to_string(),
        device_type: Target::Emulator,
        max_concurrent_jobs: max,
        location: Some("Local".to_string()),
        capabilities: None,
    }
}

fn app(workers: usize, workspace: &std::path::Path) -> (Router, Arc<Scheduler>) {
    let config = config(workers, workspace);
    let store = Arc::new(JobStore::new());
    let scheduler = Arc::new(Scheduler::new(config.clone(), store));
    let router = ApiServer::new(config, scheduler.clone()).router();
    (router, scheduler)
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn submission(app_version: &str, test_path: &str, priority: i64) -> Value {
    json!({
        "org_id": "qualgent",
        "app_version_id": app_version,
        "test_path": test_path,
        "priority": priority,
        "target": "emulator",
    })
}

#[tokio::test]
async fn test_health_and_openapi() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(0, dir.path());

    let (status, body) = call(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "qgjob-server");

    let (status, body) = call(&router, Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/jobs/submit"].is_object());
}

#[tokio::test]
async fn test_submit_lookup_and_cancel_without_workers() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(0, dir.path());

    let (status, body) = call(
        &router,
        Method::POST,
        "/jobs/submit",
        Some(submission("v1", "tests/a.spec.js", 5)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["queue"], "high_priority");
    let job_id = body["job_id"].as_u64().unwrap();

    let (status, body) = call(&router, Method::GET, &format!("/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priority"], 5);
    assert_eq!(body["target"], "emulator");
    assert!(body["assigned_device_name"].is_null());

    let (status, _) = call(&router, Method::GET, &format!("/jobs/{job_id}/result"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&router, Method::GET, "/queues/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priority_breakdown"]["priority_5"]["queued_jobs"], 1);

    let (status, body) = call(&router, Method::DELETE, &format!("/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_status"], "queued");
    assert_eq!(body["new_status"], "failed");

    let (status, body) = call(&router, Method::DELETE, &format!("/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, _) = call(&router, Method::GET, "/jobs/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(0, dir.path());

    let (status, body) = call(
        &router,
        Method::POST,
        "/jobs/submit",
        Some(submission("v1", "tests/a.spec.js", 9)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Priority must be between 1 and 5");

    let mut bad_target = submission("v1", "tests/a.spec.js", 3);
    bad_target["target"] = json!("simulator");
    let (status, _) = call(&router, Method::POST, "/jobs/submit", Some(bad_target)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&router, Method::GET, "/jobs?status=paused", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_job_listing_sorts_filters_and_limits() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(0, dir.path());
    for (test, priority) in [("tests/a.spec.js", 2), ("tests/b.spec.js", 5), ("tests/c.spec.js", 1)] {
        let (status, _) = call(
            &router,
            Method::POST,
            "/jobs/submit",
            Some(submission("v1", test, priority)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) =
        call(&router, Method::GET, "/jobs?sort=priority&order=asc&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let priorities: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["priority"].as_i64().unwrap())
        .collect();
    assert_eq!(priorities, vec![1, 2]);

    let (status, _) = call(&router, Method::DELETE, "/jobs/2", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&router, Method::GET, "/jobs?status=failed", None).await;
    assert_eq!(status, StatusCode::OK);
    let failed = body.as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["id"], 2);

    let (status, body) = call(&router, Method::GET, "/jobs?sort=newest", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    let (status, _) = call(&router, Method::GET, "/jobs?order=sideways", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_job_result_appears_once_finished() {
    let dir = tempfile::tempdir().unwrap();
    let (router, scheduler) = app(0, dir.path());
    scheduler.store().add_device(emulator("emulator-1", 1)).unwrap();
    let (_, body) = call(
        &router,
        Method::POST,
        "/jobs/submit",
        Some(submission("v1", "tests/a.spec.js", 3)),
    )
    .await;
    let job_id = body["job_id"].as_u64().unwrap();

    let (status, body) = call(&router, Method::GET, &format!("/jobs/{job_id}/result"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Job result not found");

    let job = scheduler.store().job(job_id).unwrap();
    let allocation = scheduler
        .devices()
        .allocate(Target::Emulator, Priority::new(3).unwrap())
        .unwrap();
    scheduler.store().claim_batch(&job, allocation.lease).unwrap();
    assert!(scheduler
        .store()
        .finish_job(job_id, allocation.lease, JobStatus::Completed));
    scheduler.results().record(JobOutcome {
        job_id,
        status: JobStatus::Completed,
        result: None,
        error: None,
        device: Some("emulator-1".to_string()),
    });
    scheduler.devices().release(allocation.lease);

    let (status, body) = call(&router, Method::GET, &format!("/jobs/{job_id}/result"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["device"], "emulator-1");

    let (status, body) = call(&router, Method::GET, "/jobs/999/result", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Job not found");
}

#[tokio::test]
async fn test_device_crud() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(0, dir.path());

    let new = json!({"device_id": "emulator-9", "device_type": "emulator"});
    let (status, body) = call(&router, Method::POST, "/devices", Some(new.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");

    let (status, _) = call(&router, Method::POST, "/devices", Some(new)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let empty = json!({"device_id": "emulator-10", "device_type": "emulator", "max_concurrent_jobs": 0});
    let (status, body) = call(&router, Method::POST, "/devices", Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "max_concurrent_jobs must be at least 1");

    let (_, body) = call(&router, Method::GET, "/devices", None).await;
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["device_id"], "emulator-9");
    assert_eq!(devices[0]["utilization_percent"], 0.0);

    let (status, body) = call(&router, Method::GET, "/devices/recommendations/emulator?priority=4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recommendation"], "immediate_allocation");

    let (status, _) = call(&router, Method::GET, "/devices/recommendations/tablet", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&router, Method::DELETE, "/devices/emulator-9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Device emulator-9 removed successfully");

    let (status, _) = call(&router, Method::DELETE, "/devices/emulator-9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_jobs_of_one_app_version_share_a_batch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("tests")).unwrap();
    for name in ["a.spec.js", "b.spec.js"] {
        std::fs::write(
            dir.path().join("tests").join(name),
            "test('loads', async () => {});\n",
        )
        .unwrap();
    }

    let (router, scheduler) = app(1, dir.path());
    scheduler.store().add_device(emulator("emulator-1", 1)).unwrap();

    // Queue both jobs before the worker starts so they land in one batch.
    let mut ids = Vec::new();
    for test in ["tests/a.spec.js", "tests/b.spec.js"] {
        let (_, body) = call(&router, Method::POST, "/jobs/submit", Some(submission("v7", test, 3))).await;
        ids.push(body["job_id"].as_u64().unwrap());
    }
    scheduler.start();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, group) = call(&router, Method::GET, "/jobs/group/v7", None).await;
            let (_, devices) = call(&router, Method::GET, "/devices", None).await;
            let completed = group
                .as_array()
                .unwrap()
                .iter()
                .all(|j| j["status"] == "completed");
            // The device slot is returned after every outcome is recorded.
            if completed && devices["devices"][0]["current_jobs"] == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("batch did not complete");

    for id in &ids {
        let (status, body) = call(&router, Method::GET, &format!("/jobs/{id}/result"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["device"], "emulator-1");
        assert_eq!(body["result"]["tests_passed"], 1);
    }

    let (_, summary) = call(&router, Method::GET, "/batches/summary", None).await;
    assert_eq!(summary["batches"][0]["app_version_id"], "v7");

    scheduler.shutdown().await;
    let (_, info) = call(&router, Method::GET, "/queues/priority-info", None).await;
    assert_eq!(info["status"], "closed");
}
