//! Worker -> coordinator control messages: one-shot registration at
//! startup, then a periodic heartbeat (default every 30s) that reports
//! `worker_id`, status, and in-flight tasks so the coordinator can
//! detect a lost worker and requeue its tasks.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{TaskStatus, WorkerId};

use super::WorkerExecutor;

#[derive(Debug, Serialize)]
struct RegisterRequest {
    worker_type: &'static str,
}

#[derive(Debug, Serialize)]
struct HeartbeatTaskEntry {
    task_id: String,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest {
    worker_id: WorkerId,
    status: &'static str,
    current_tasks: Vec<HeartbeatTaskEntry>,
}

/// Registers this worker with the coordinator, advertising the port it
/// listens on via `X-Worker-Port`/`X-Worker-ID` headers; the
/// coordinator derives the callback URL from the request's source
/// address plus that port.
pub async fn register(client: &reqwest::Client, coordinator_url: &str, worker_id: &WorkerId, port: u16) -> Result<()> {
    let resp = client
        .post(format!("{coordinator_url}/worker/register"))
        .header("X-Worker-Port", port.to_string())
        .header("X-Worker-ID", worker_id.to_string())
        .json(&RegisterRequest { worker_type: "compute" })
        .send()
        .await?;

    if !resp.status().is_success() {
        warn!(status = %resp.status(), "worker registration was rejected by coordinator");
    } else {
        info!(worker_id = %worker_id, coordinator = %coordinator_url, "registered with coordinator");
    }
    Ok(())
}

/// Runs forever, sending a heartbeat every `interval` until the
/// process exits. Transport failures are logged and retried on the
/// next tick rather than propagated — a dropped heartbeat is exactly
/// what lets the coordinator eventually mark this worker `lost`, which
/// is the correct outcome if the network partition is real.
pub async fn run_heartbeat_loop(client: reqwest::Client, coordinator_url: String, worker_id: WorkerId, executor: Arc<WorkerExecutor>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let current_tasks = executor
            .in_flight_snapshot()
            .into_iter()
            .map(|(task_id, status)| HeartbeatTaskEntry { task_id, status })
            .collect();

        let body = HeartbeatRequest {
            worker_id: worker_id.clone(),
            status: "available",
            current_tasks,
        };

        let result = client.post(format!("{coordinator_url}/worker/heartbeat")).json(&body).send().await;
        match result {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "heartbeat rejected by coordinator");
            }
            Err(e) => warn!(error = %e, "failed to send heartbeat"),
            _ => {}
        }
    }
}
