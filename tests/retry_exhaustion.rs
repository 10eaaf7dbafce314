//! A reducer (or mapper) that always fails exhausts the coordinator's
//! retry budget and the job transitions to `failed` rather than
//! hanging forever.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::tempdir;

use gridmr::config::{CoordinatorConfig, SharedStorageArgs};
use gridmr::coordinator::{http as coordinator_http, Scheduler};
use gridmr::store::{InMemoryJobStore, InMemoryWorkerRegistry};

/// A worker stand-in that always reports task failure, to exercise the
/// dispatch retry budget without a real `WorkerExecutor`.
async fn always_fails(State(()): State<()>, Json(_req): Json<Value>) -> Json<Value> {
    Json(json!({
        "task_id": "unknown",
        "status": "FAILED",
        "error": "simulated permanent worker-side failure",
    }))
}

async fn spawn_failing_worker() -> u16 {
    let app = Router::new()
        .route("/task/execute", post(always_fails))
        .route("/health", get(|| async { "ok" }))
        .with_state(());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

#[tokio::test]
async fn job_fails_once_retry_budget_is_exhausted() {
    let shared_root = tempdir().unwrap();
    let input_path = shared_root.path().join("input.txt");
    fs::write(&input_path, "hello world\n").unwrap();

    let config = CoordinatorConfig {
        port: 0,
        storage: SharedStorageArgs {
            use_nfs: false,
            shared_root: shared_root.path().to_str().unwrap().to_string(),
            local_mount: shared_root.path().to_str().unwrap().to_string(),
        },
        reduce_fanout: 1,
        heartbeat_interval_secs: 30,
        lost_worker_timeout_secs: 90,
        retry_budget: 2,
        dispatch_timeout_secs: 5,
        worker_concurrency: 4,
    };
    let scheduler = Scheduler::new(config, Arc::new(InMemoryJobStore::default()), Arc::new(InMemoryWorkerRegistry::default()));
    let app = coordinator_http::router(Arc::clone(&scheduler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
    });
    let base_url = format!("http://{addr}");

    let worker_port = spawn_failing_worker().await;
    let client = reqwest::Client::new();
    client
        .post(format!("{base_url}/worker/register"))
        .header("X-Worker-Port", worker_port.to_string())
        .header("X-Worker-ID", "failing-worker")
        .json(&json!({ "worker_type": "compute" }))
        .send()
        .await
        .unwrap();

    let submit: Value = client
        .post(format!("{base_url}/job/submit"))
        .json(&json!({ "data_url": format!("file://{}", input_path.display()), "code_url": "wordcount" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let job_id = submit["job_id"].as_str().unwrap().to_string();

    let mut terminal = None;
    for _ in 0..100 {
        let status: Value = client.get(format!("{base_url}/job/status/{job_id}")).send().await.unwrap().json().await.unwrap();
        if matches!(status["status"].as_str(), Some("completed") | Some("failed")) {
            terminal = Some(status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let terminal = terminal.expect("job should reach a terminal state once retries are exhausted");
    assert_eq!(terminal["status"], "failed");
    assert!(terminal["error_message"].as_str().unwrap().contains("retry budget"));
}
