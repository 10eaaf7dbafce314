//! End-to-end test of a word-count job: a coordinator and a single
//! worker, both serving real HTTP, run a job from submission through
//! to a concatenated result file.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;

use gridmr::config::{CoordinatorConfig, SharedStorageArgs};
use gridmr::coordinator::{http as coordinator_http, Scheduler};
use gridmr::model::WorkerId;
use gridmr::pathrewrite::PathRewriter;
use gridmr::store::{InMemoryJobStore, InMemoryWorkerRegistry};
use gridmr::worker::{heartbeat, http as worker_http, WorkerExecutor};

async fn spawn_coordinator(shared_root: &str) -> (String, Arc<Scheduler>) {
    let config = CoordinatorConfig {
        port: 0,
        storage: SharedStorageArgs {
            use_nfs: false,
            shared_root: shared_root.to_string(),
            local_mount: shared_root.to_string(),
        },
        reduce_fanout: 2,
        heartbeat_interval_secs: 30,
        lost_worker_timeout_secs: 90,
        retry_budget: 3,
        dispatch_timeout_secs: 10,
        worker_concurrency: 4,
    };

    let scheduler = Scheduler::new(config, Arc::new(InMemoryJobStore::default()), Arc::new(InMemoryWorkerRegistry::default()));
    let app = coordinator_http::router(Arc::clone(&scheduler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
    });

    (format!("http://{addr}"), scheduler)
}

async fn spawn_worker(coordinator_url: &str) {
    let worker_id = WorkerId::new();
    let executor = Arc::new(WorkerExecutor::new(worker_id.clone(), PathRewriter::disabled()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = worker_http::router(Arc::clone(&executor));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    heartbeat::register(&client, coordinator_url, &worker_id, addr.port()).await.unwrap();
}

async fn wait_for_job(base_url: &str, job_id: &str) -> Value {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let status: Value = client
            .get(format!("{base_url}/job/status/{job_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        match status["status"].as_str() {
            Some("completed") | Some("failed") => return status,
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    panic!("job {job_id} did not reach a terminal state in time");
}

#[tokio::test]
async fn word_count_job_runs_to_completion() {
    let shared_root = tempdir().unwrap();
    let input_path = shared_root.path().join("input.txt");
    fs::write(&input_path, "to be or not to be\nthat is the question\n").unwrap();

    let (base_url, _scheduler) = spawn_coordinator(shared_root.path().to_str().unwrap()).await;
    spawn_worker(&base_url).await;

    let client = reqwest::Client::new();
    let submit: Value = client
        .post(format!("{base_url}/job/submit"))
        .json(&json!({
            "data_url": format!("file://{}", input_path.display()),
            "code_url": "wordcount",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let job_id = submit["job_id"].as_str().unwrap().to_string();
    let terminal = wait_for_job(&base_url, &job_id).await;
    assert_eq!(terminal["status"], "completed", "job did not complete: {terminal:?}");

    let result: Value = client.get(format!("{base_url}/job/result/{job_id}")).send().await.unwrap().json().await.unwrap();
    let result_url = result["result_url"].as_str().expect("completed job must have a result_url");
    let contents = fs::read_to_string(result_url).unwrap();

    let mut counts = std::collections::HashMap::new();
    for line in contents.lines() {
        let (word, count) = line.split_once('\t').unwrap();
        counts.insert(word.to_string(), count.parse::<i64>().unwrap());
    }
    assert_eq!(counts.get("to"), Some(&2));
    assert_eq!(counts.get("be"), Some(&2));
    assert_eq!(counts.get("question"), Some(&1));
}

#[tokio::test]
async fn job_with_no_worker_registered_never_completes_but_does_not_error() {
    let shared_root = tempdir().unwrap();
    let input_path = shared_root.path().join("input.txt");
    fs::write(&input_path, "hello world\n").unwrap();

    let (base_url, _scheduler) = spawn_coordinator(shared_root.path().to_str().unwrap()).await;

    let client = reqwest::Client::new();
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

    tokio::time::sleep(Duration::from_millis(300)).await;
    let status: Value = client.get(format!("{base_url}/job/status/{job_id}")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["status"], "running", "job should still be waiting for a worker, not failed or completed");
}

#[tokio::test]
async fn empty_directory_submission_is_rejected() {
    let shared_root = tempdir().unwrap();
    fs::create_dir_all(shared_root.path().join("empty")).unwrap();
    let (base_url, _scheduler) = spawn_coordinator(shared_root.path().to_str().unwrap()).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base_url}/job/submit"))
        .json(&json!({
            "data_url": format!("file://{}", shared_root.path().join("empty").display()),
            "code_url": "wordcount",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}
