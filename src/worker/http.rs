//! The worker's HTTP surface: `/health`, `/task/execute`,
//! `/task/status/{task_id}`. Task execution is spawned onto its own
//! `tokio::task` rather than awaited inline, so the executor's blocking
//! file I/O doesn't starve other concurrently-handled requests on the
//! same runtime thread.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::model::{MapTask, ReduceTask, TaskStatus, TaskType, WorkerId};

use super::WorkerExecutor;

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task_type: TaskType,
    pub task_data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<crate::model::TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub worker_id: WorkerId,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<crate::model::TaskResult>,
}

pub fn router(executor: Arc<WorkerExecutor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/task/execute", post(execute_task))
        .route("/task/status/:task_id", get(task_status))
        .with_state(executor)
}

async fn health(State(executor): State<Arc<WorkerExecutor>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        worker_id: executor.worker_id.clone(),
    })
}

/// Runs to completion before responding: the HTTP response is sent
/// only once the task result is known.
async fn execute_task(State(executor): State<Arc<WorkerExecutor>>, Json(req): Json<TaskRequest>) -> impl IntoResponse {
    // Run the task on its own tokio task so a slow map/reduce doesn't
    // starve this connection's other requests.
    let response = match req.task_type {
        TaskType::Map => match serde_json::from_value::<MapTask>(req.task_data) {
            Ok(task) => {
                info!(task_id = %task.task_id, "executing map task");
                let task_id = task.task_id.to_string();
                let exec = Arc::clone(&executor);
                let result = match tokio::spawn(async move { exec.execute_map_task(&task).await }).await {
                    Ok(result) => result,
                    Err(join_err) => crate::model::TaskResult::failed(
                        crate::model::TaskId::from(task_id.clone()),
                        TaskType::Map,
                        executor.worker_id.clone(),
                        format!("task execution panicked: {join_err}"),
                        0.0,
                    ),
                };
                executor.record(result.clone());
                to_response(task_id, result)
            }
            Err(e) => malformed_task_data(e),
        },
        TaskType::Reduce => match serde_json::from_value::<ReduceTask>(req.task_data) {
            Ok(task) => {
                info!(task_id = %task.task_id, "executing reduce task");
                let task_id = task.task_id.to_string();
                let exec = Arc::clone(&executor);
                let result = match tokio::spawn(async move { exec.execute_reduce_task(&task).await }).await {
                    Ok(result) => result,
                    Err(join_err) => crate::model::TaskResult::failed(
                        crate::model::TaskId::from(task_id.clone()),
                        TaskType::Reduce,
                        executor.worker_id.clone(),
                        format!("task execution panicked: {join_err}"),
                        0.0,
                    ),
                };
                executor.record(result.clone());
                to_response(task_id, result)
            }
            Err(e) => malformed_task_data(e),
        },
    };
    Json(response)
}

fn malformed_task_data(e: serde_json::Error) -> TaskResponse {
    error!(error = %e, "task_data did not match the declared task_type");
    TaskResponse {
        task_id: "unknown".to_string(),
        status: TaskStatus::Failed,
        result: None,
        error: Some(format!("malformed task_data: {e}")),
    }
}

fn to_response(task_id: String, result: crate::model::TaskResult) -> TaskResponse {
    TaskResponse {
        task_id,
        status: result.status,
        error: result.error_message.clone(),
        result: matches!(result.status, TaskStatus::Completed).then_some(result),
    }
}

async fn task_status(State(executor): State<Arc<WorkerExecutor>>, Path(task_id): Path<String>) -> Result<impl IntoResponse, crate::error::Error> {
    let result = executor
        .status_of(&task_id)
        .ok_or_else(|| crate::error::Error::TaskNotFound(task_id.clone()))?;
    let progress = if matches!(result.status, TaskStatus::Completed | TaskStatus::Failed) { 100 } else { 50 };
    Ok(Json(TaskStatusResponse {
        task_id,
        status: result.status,
        progress,
        result: matches!(result.status, TaskStatus::Completed).then_some(result),
    }))
}
