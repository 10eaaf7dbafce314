//! The coordinator binary: parses `CoordinatorConfig`, wires the
//! in-memory job/worker stores to the [`Scheduler`], and serves the
//! HTTP control plane.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use gridmr::config::CoordinatorConfig;
use gridmr::coordinator::{http, Scheduler};
use gridmr::store::{InMemoryJobStore, InMemoryWorkerRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CoordinatorConfig::parse();
    info!(
        port = config.port,
        reduce_fanout = config.reduce_fanout,
        retry_budget = config.retry_budget,
        "starting gridmr coordinator"
    );

    let jobs = Arc::new(InMemoryJobStore::default());
    let workers = Arc::new(InMemoryWorkerRegistry::default());
    let scheduler = Scheduler::new(config.clone(), jobs, workers);
    scheduler.clone().spawn_liveness_sweep();

    let app = http::router(scheduler);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "coordinator listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
