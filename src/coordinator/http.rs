//! The coordinator's HTTP surface: client-facing job endpoints and
//! worker-facing registration/heartbeat endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Job, JobId, WorkerId};

use super::scheduler::Scheduler;

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/job/submit", post(submit_job))
        .route("/job/status/:job_id", get(job_status))
        .route("/job/result/:job_id", get(job_result))
        .route("/job/cancel/:job_id", post(cancel_job))
        .route("/worker/register", post(register_worker))
        .route("/worker/heartbeat", post(heartbeat))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(scheduler)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    data_url: String,
    /// Primary form. When absent, `code_url` is used for both roles,
    /// matching the legacy single-URL submission convention.
    #[serde(default)]
    mapper_url: Option<String>,
    #[serde(default)]
    reducer_url: Option<String>,
    #[serde(default)]
    code_url: Option<String>,
    #[serde(default)]
    job_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitJobResponse {
    job_id: JobId,
}

async fn submit_job(State(scheduler): State<Arc<Scheduler>>, Json(req): Json<SubmitJobRequest>) -> Result<impl IntoResponse> {
    let mapper_url = req
        .mapper_url
        .or_else(|| req.code_url.clone())
        .ok_or_else(|| Error::Validation("submission must set mapper_url or the legacy code_url".to_string()))?;
    let reducer_url = req
        .reducer_url
        .or(req.code_url)
        .ok_or_else(|| Error::Validation("submission must set reducer_url or the legacy code_url".to_string()))?;

    let job_id = scheduler.submit(mapper_url, reducer_url, req.data_url, req.job_name)?;
    Ok(Json(SubmitJobResponse { job_id }))
}

async fn job_status(State(scheduler): State<Arc<Scheduler>>, Path(job_id): Path<String>) -> Result<impl IntoResponse> {
    Ok(Json(scheduler.status(&JobId::from(job_id))?))
}

#[derive(Debug, Serialize)]
struct JobResultResponse {
    job_id: JobId,
    result_url: String,
}

#[derive(Debug, Serialize)]
struct JobStillRunningResponse {
    job_id: JobId,
    status: crate::model::JobStatus,
    progress: f64,
}

/// `200 {result_url}` once `completed`; `202` (still running) with a
/// status snapshot otherwise; the `Error::JobNotFound` path above
/// already yields a `404` for an unknown id.
async fn job_result(State(scheduler): State<Arc<Scheduler>>, Path(job_id): Path<String>) -> Result<axum::response::Response> {
    let job: Job = scheduler.status(&JobId::from(job_id))?;
    match (job.status, job.result_path) {
        (crate::model::JobStatus::Completed, Some(result_url)) => Ok(Json(JobResultResponse { job_id: job.job_id, result_url }).into_response()),
        _ => Ok((
            axum::http::StatusCode::ACCEPTED,
            Json(JobStillRunningResponse {
                job_id: job.job_id,
                status: job.status,
                progress: job.progress,
            }),
        )
            .into_response()),
    }
}

async fn cancel_job(State(scheduler): State<Arc<Scheduler>>, Path(job_id): Path<String>) -> Result<impl IntoResponse> {
    scheduler.cancel(&JobId::from(job_id))?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    worker_type: Option<String>,
}

/// The coordinator never trusts a self-reported callback URL: it
/// derives the worker's address from the request's source IP plus the
/// `X-Worker-Port` header, so a worker cannot register itself under an
/// address it doesn't actually listen on.
async fn register_worker(
    State(scheduler): State<Arc<Scheduler>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(_req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let worker_id = headers
        .get("X-Worker-ID")
        .and_then(|v| v.to_str().ok())
        .map(WorkerId::from)
        .unwrap_or_else(WorkerId::new);

    let port: u16 = headers
        .get("X-Worker-Port")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::Validation("worker registration is missing the X-Worker-Port header".to_string()))?;

    let worker_url = format!("http://{}:{}", addr.ip(), port);
    scheduler.register_worker(worker_id, worker_url.clone());
    Ok(Json(serde_json::json!({ "worker_url": worker_url })))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    worker_id: WorkerId,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    current_tasks: Vec<serde_json::Value>,
}

async fn heartbeat(State(scheduler): State<Arc<Scheduler>>, Json(req): Json<HeartbeatRequest>) -> Result<impl IntoResponse> {
    scheduler.heartbeat(&req.worker_id)?;
    info!(worker_id = %req.worker_id, status = ?req.status, in_flight = req.current_tasks.len(), "heartbeat received");
    Ok(Json(serde_json::json!({ "acknowledged": true })))
}
