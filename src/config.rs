//! Per-process configuration, built from CLI flags with environment
//! variable fallback (`clap`'s `env` feature), grounded on the
//! corpus's `clap = { features = ["derive", "env"] }` convention.

use std::time::Duration;

use clap::Args;

pub const DEFAULT_REDUCE_FANOUT: u32 = 4;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_LOST_WORKER_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_RETRY_BUDGET: u32 = 3;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 1;
pub const DEFAULT_SHARED_ROOT: &str = "/shared/gridmr";
pub const DEFAULT_LOCAL_MOUNT: &str = "/mnt/gridmr";

/// Flags shared by coordinator and worker for the shared-storage path
/// rewriting convention.
#[derive(Debug, Clone, Args)]
pub struct SharedStorageArgs {
    /// Enable shared-storage path rewriting between SHARED_ROOT and LOCAL_MOUNT.
    #[arg(long, env = "GRIDMR_USE_NFS", default_value_t = false)]
    pub use_nfs: bool,

    /// The coordinator's canonical view of the shared-storage root.
    #[arg(long = "shared-root", env = "GRIDMR_SHARED_ROOT", default_value = DEFAULT_SHARED_ROOT)]
    pub shared_root: String,

    /// This process's local mount point for the same shared storage.
    #[arg(long = "nfs-mount", env = "GRIDMR_LOCAL_MOUNT", default_value = DEFAULT_LOCAL_MOUNT)]
    pub local_mount: String,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "gridmr-coordinator", about = "GridMR coordinator: job scheduler and HTTP control plane")]
pub struct CoordinatorConfig {
    /// Address to bind the coordinator's HTTP server to.
    #[arg(long, env = "GRIDMR_PORT", default_value_t = 8000)]
    pub port: u16,

    #[command(flatten)]
    pub storage: SharedStorageArgs,

    /// Number of reduce partitions (R).
    #[arg(long = "reduce-fanout", env = "GRIDMR_REDUCE_FANOUT", default_value_t = DEFAULT_REDUCE_FANOUT)]
    pub reduce_fanout: u32,

    /// Seconds between heartbeat-liveness sweeps.
    #[arg(long, env = "GRIDMR_HEARTBEAT_INTERVAL_SECS", default_value_t = DEFAULT_HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,

    /// Seconds without a heartbeat before a worker is declared lost.
    #[arg(long, env = "GRIDMR_LOST_WORKER_TIMEOUT_SECS", default_value_t = DEFAULT_LOST_WORKER_TIMEOUT_SECS)]
    pub lost_worker_timeout_secs: u64,

    /// Per-task retry budget before a job fails.
    #[arg(long, env = "GRIDMR_RETRY_BUDGET", default_value_t = DEFAULT_RETRY_BUDGET)]
    pub retry_budget: u32,

    /// Request timeout for a single dispatch call to a worker.
    #[arg(long, env = "GRIDMR_DISPATCH_TIMEOUT_SECS", default_value_t = DEFAULT_DISPATCH_TIMEOUT_SECS)]
    pub dispatch_timeout_secs: u64,

    /// Maximum in-flight tasks per worker.
    #[arg(long, env = "GRIDMR_WORKER_CONCURRENCY", default_value_t = DEFAULT_WORKER_CONCURRENCY)]
    pub worker_concurrency: usize,
}

impl CoordinatorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn lost_worker_timeout(&self) -> Duration {
        Duration::from_secs(self.lost_worker_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "gridmr-worker", about = "GridMR worker: task executor")]
pub struct WorkerConfig {
    /// Coordinator host to register and heartbeat with.
    pub coordinator_host: String,

    /// Coordinator port.
    pub coordinator_port: u16,

    /// Port this worker's HTTP server listens on.
    #[arg(long, env = "GRIDMR_PORT", default_value_t = 8001)]
    pub port: u16,

    #[command(flatten)]
    pub storage: SharedStorageArgs,

    /// Seconds between heartbeats sent to the coordinator.
    #[arg(long, env = "GRIDMR_HEARTBEAT_INTERVAL_SECS", default_value_t = DEFAULT_HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,
}

impl WorkerConfig {
    pub fn coordinator_url(&self) -> String {
        format!("http://{}:{}", self.coordinator_host, self.coordinator_port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "gridmr-client", about = "GridMR client: submit a job and await its result")]
pub struct ClientConfig {
    /// Coordinator address, `host:port`.
    pub coordinator_addr: String,

    /// URL or registry name for the input data set.
    pub data_url: String,

    /// URL or registry name for the mapper/reducer pair (legacy `code_url`).
    pub code_url: String,

    /// Optional informational job name.
    #[arg(long)]
    pub job_name: Option<String>,

    /// Seconds to poll before giving up on the job.
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Seconds between status polls.
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,
}
