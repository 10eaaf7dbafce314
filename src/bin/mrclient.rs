//! The client binary: submits a job, polls its status until it
//! reaches a terminal state, then prints the result.

use std::path::Path;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gridmr::config::ClientConfig;
use gridmr::model::JobStatus;

#[derive(Debug, Serialize)]
struct SubmitJobRequest {
    data_url: String,
    code_url: String,
    job_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: JobStatus,
    progress: f64,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResultResponse {
    result_url: String,
}

/// Converts a bare registry name (`wordcount`) or an already-qualified
/// URL through unchanged; a filesystem path becomes a `file://` URL
/// against its absolute form.
fn make_file_url(path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("file://") || path.starts_with("nfs://") {
        return path.to_string();
    }
    if !path.contains('/') && !path.contains('\\') {
        return path.to_string();
    }
    let p = Path::new(path);
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir().map(|dir| dir.join(p)).unwrap_or_else(|_| p.to_path_buf())
    };
    format!("file://{}", abs.display())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::parse();
    let base_url = if config.coordinator_addr.starts_with("http") {
        config.coordinator_addr.clone()
    } else {
        format!("http://{}", config.coordinator_addr)
    };

    let data_url = make_file_url(&config.data_url);
    let code_url = make_file_url(&config.code_url);
    info!(%base_url, %data_url, %code_url, "submitting job");

    let client = reqwest::Client::new();
    let submit_resp = client
        .post(format!("{base_url}/job/submit"))
        .json(&SubmitJobRequest {
            data_url,
            code_url,
            job_name: config.job_name.clone(),
        })
        .send()
        .await?;

    if !submit_resp.status().is_success() {
        let body = submit_resp.text().await.unwrap_or_default();
        eprintln!("job submission failed: {body}");
        std::process::exit(1);
    }

    let job_id = submit_resp.json::<SubmitJobResponse>().await?.job_id;
    println!("job submitted: {job_id}");

    let deadline = Instant::now() + Duration::from_secs(config.timeout_secs);
    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    loop {
        if Instant::now() >= deadline {
            eprintln!("job {job_id} timed out after {} seconds", config.timeout_secs);
            std::process::exit(1);
        }

        let status_resp = client.get(format!("{base_url}/job/status/{job_id}")).send().await?;
        if !status_resp.status().is_success() {
            warn!(%job_id, status = %status_resp.status(), "status poll failed, retrying");
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        let status = status_resp.json::<JobStatusResponse>().await?;
        println!("job {job_id}: {:?} - {:.1}%", status.status, status.progress);

        match status.status {
            JobStatus::Completed => break,
            JobStatus::Failed => {
                eprintln!("job {job_id} failed: {}", status.error_message.unwrap_or_else(|| "no error message".to_string()));
                std::process::exit(1);
            }
            JobStatus::Pending | JobStatus::Running => {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    let result_resp = client.get(format!("{base_url}/job/result/{job_id}")).send().await?;
    if !result_resp.status().is_success() {
        eprintln!("job {job_id} completed but result fetch returned {}", result_resp.status());
        std::process::exit(1);
    }
    let result = result_resp.json::<JobResultResponse>().await?;
    println!("job {job_id} completed, result at: {}", result.result_url);

    Ok(())
}
