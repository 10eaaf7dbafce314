use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Crate-wide error type, returned by fallible coordinator/worker/client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("worker {0} is lost")]
    WorkerLost(String),

    #[error("task {0} exhausted its retry budget")]
    RetryExhausted(String),

    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("invalid url `{0}`: {1}")]
    InvalidUrl(String, String),

    #[error("failed to load program from `{0}`: {1}")]
    ProgramLoad(String, String),

    #[error("job {0} was cancelled")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Translates a domain error into an HTTP status: 404 for not-found,
/// 400 for validation/malformed submissions, 500 for everything else
/// (transient transport, user code, load failures surfaced at the
/// control-plane boundary).
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::JobNotFound(_) | Error::TaskNotFound(_) | Error::WorkerNotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) | Error::InvalidUrl(_, _) => StatusCode::BAD_REQUEST,
            Error::Cancelled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
