//! The worker binary: parses `WorkerConfig`, registers with the
//! coordinator, starts the heartbeat loop, and serves the task
//! executor's HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use gridmr::config::WorkerConfig;
use gridmr::model::WorkerId;
use gridmr::pathrewrite::PathRewriter;
use gridmr::worker::{heartbeat, http, WorkerExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = WorkerConfig::parse();
    let worker_id = WorkerId::new();
    info!(%worker_id, port = config.port, coordinator = %config.coordinator_url(), "starting gridmr worker");

    let path_rewriter = PathRewriter::new(&config.storage.shared_root, &config.storage.local_mount, config.storage.use_nfs);
    let executor = Arc::new(WorkerExecutor::new(worker_id.clone(), path_rewriter));

    let http_client = reqwest::Client::new();
    let coordinator_url = config.coordinator_url();
    heartbeat::register(&http_client, &coordinator_url, &worker_id, config.port).await?;

    tokio::spawn(heartbeat::run_heartbeat_loop(
        http_client,
        coordinator_url,
        worker_id,
        Arc::clone(&executor),
        config.heartbeat_interval(),
    ));

    let app = http::router(executor);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "worker listening");

    axum::serve(listener, app).await?;
    Ok(())
}
