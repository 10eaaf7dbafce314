//! The coordinator's job lifecycle and task scheduler: accepts
//! submissions, drives each job through its map and reduce phases,
//! dispatches tasks to workers from the [`WorkerRegistry`], retries
//! failures up to a configured budget, and assembles the final result.
//!
//! One `tokio::task` drives each job end-to-end, running as a
//! background task so a slow worker does not block other assignments;
//! within that task, every map (then every reduce) task is dispatched
//! from its own concurrently-spawned coroutine so that one straggling
//! worker never blocks sibling tasks
//! from starting.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::fs as tokio_fs;
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::model::{
    map_task_id, partition_from_filename, reduce_task_id, Job, JobId, JobStatus, MapTask, ReduceTask, TaskId, TaskResult, TaskStatus, TaskType, WorkerId,
    WorkerInfo,
};
use crate::store::{JobStore, WorkerRegistry};
use crate::worker::http::TaskResponse;

use super::input;

pub struct Scheduler {
    config: CoordinatorConfig,
    jobs: Arc<dyn JobStore>,
    workers: Arc<dyn WorkerRegistry>,
    http: reqwest::Client,
}

impl Scheduler {
    pub fn new(config: CoordinatorConfig, jobs: Arc<dyn JobStore>, workers: Arc<dyn WorkerRegistry>) -> Arc<Self> {
        let http = reqwest::Client::builder().build().expect("failed to build reqwest client");
        Arc::new(Self { config, jobs, workers, http })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn workers(&self) -> &Arc<dyn WorkerRegistry> {
        &self.workers
    }

    /// `submit`: enumerates inputs, builds one map task per input
    /// file, transitions the job to `running`, and returns immediately
    /// — the map/reduce phases run to completion on a background task.
    pub fn submit(self: &Arc<Self>, mapper_url: String, reducer_url: String, data_url: String, job_name: Option<String>) -> Result<JobId> {
        let input_files = input::resolve_input_files(&data_url)?;

        let job_id = JobId::new();
        let name = job_name.unwrap_or_else(|| format!("job_{job_id}"));
        let mut job = Job::new(job_id.clone(), name, mapper_url.clone(), reducer_url.clone(), data_url, input_files.clone());

        let partition_seed = seed_for(&job_id);
        let map_tasks: Vec<MapTask> = input_files
            .iter()
            .enumerate()
            .map(|(i, input_file)| MapTask {
                task_id: map_task_id(&job_id, i),
                job_id: job_id.clone(),
                input_file: input_file.clone(),
                output_dir: self.config.storage.shared_root.clone(),
                mapper_url: mapper_url.clone(),
                split_start: None,
                split_end: None,
                num_partitions: self.config.reduce_fanout,
                partition_seed,
                attempt: 0,
            })
            .collect();

        job.map_tasks = map_tasks.iter().map(|t| t.task_id.clone()).collect();
        job.status = JobStatus::Running;
        self.jobs.create(job);
        info!(job_id = %job_id, input_files = input_files.len(), "job submitted");

        let scheduler = Arc::clone(self);
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move { scheduler.run_job(spawned_job_id, map_tasks).await });

        Ok(job_id)
    }

    pub fn status(&self, job_id: &JobId) -> Result<Job> {
        self.jobs.get(job_id)
    }

    /// `cancel`: stops dispatch of further tasks. In-flight tasks
    /// finish, but [`run_job`] discards their contribution once it
    /// observes the job is no longer `running`.
    pub fn cancel(&self, job_id: &JobId) -> Result<()> {
        self.jobs.update(job_id, &mut |job| {
            if matches!(job.status, JobStatus::Pending | JobStatus::Running) {
                job.status = JobStatus::Failed;
                job.error_message = Some("cancelled".to_string());
            }
        })
    }

    pub fn register_worker(&self, worker_id: WorkerId, url: String) {
        info!(worker_id = %worker_id, url = %url, "worker registered");
        self.workers.create(WorkerInfo::new(worker_id, url));
    }

    pub fn heartbeat(&self, worker_id: &WorkerId) -> Result<()> {
        self.workers.heartbeat(worker_id)
    }

    /// Periodically marks workers `lost` once their heartbeat has gone
    /// silent past the configured timeout.
    pub fn spawn_liveness_sweep(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
            loop {
                ticker.tick().await;
                for worker_id in self.workers.sweep_lost(self.config.lost_worker_timeout()) {
                    warn!(worker_id = %worker_id, "worker marked lost: no heartbeat within timeout");
                }
            }
        });
    }

    fn is_cancelled(&self, job_id: &JobId) -> bool {
        self.jobs.get(job_id).map(|j| j.status != JobStatus::Running).unwrap_or(true)
    }

    fn fail_job(&self, job_id: &JobId, message: String) {
        let _ = self.jobs.update(job_id, &mut |job| {
            if job.status != JobStatus::Completed {
                job.status = JobStatus::Failed;
                job.error_message = Some(message.clone());
            }
        });
        warn!(job_id = %job_id, error = %message, "job failed");
    }

    async fn run_job(self: Arc<Self>, job_id: JobId, map_tasks: Vec<MapTask>) {
        info!(job_id = %job_id, total_map = map_tasks.len(), "starting map phase");

        let handles: Vec<_> = map_tasks
            .into_iter()
            .map(|task| {
                let me = Arc::clone(&self);
                tokio::spawn(async move { me.dispatch_map_task(task).await })
            })
            .collect();

        let mut map_outputs: Vec<String> = Vec::new();
        let mut failure: Option<String> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) => map_outputs.extend(result.output_files),
                Ok(Err(e)) => {
                    failure.get_or_insert_with(|| e.to_string());
                }
                Err(join_err) => {
                    failure.get_or_insert_with(|| join_err.to_string());
                }
            };
        }

        if self.is_cancelled(&job_id) {
            info!(job_id = %job_id, "job cancelled during map phase, discarding results");
            return;
        }
        if let Some(message) = failure {
            self.fail_job(&job_id, message);
            return;
        }

        let reduce_tasks = match self.build_reduce_tasks(&job_id, &map_outputs) {
            Ok(tasks) => tasks,
            Err(e) => {
                self.fail_job(&job_id, e.to_string());
                return;
            }
        };

        if let Err(e) = self.jobs.update(&job_id, &mut |job| {
            job.reduce_tasks = reduce_tasks.iter().map(|t| t.task_id.clone()).collect();
        }) {
            warn!(job_id = %job_id, error = %e, "job vanished before reduce phase could start");
            return;
        }

        info!(job_id = %job_id, total_reduce = reduce_tasks.len(), "starting reduce phase");

        let handles: Vec<_> = reduce_tasks
            .into_iter()
            .map(|task| {
                let me = Arc::clone(&self);
                tokio::spawn(async move { me.dispatch_reduce_task(task).await })
            })
            .collect();

        let mut reduce_outputs: Vec<(u32, String)> = Vec::new();
        let mut failure: Option<String> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok((partition_id, result))) => {
                    if let Some(path) = result.output_files.into_iter().next() {
                        reduce_outputs.push((partition_id, path));
                    }
                }
                Ok(Err(e)) => {
                    failure.get_or_insert_with(|| e.to_string());
                }
                Err(join_err) => {
                    failure.get_or_insert_with(|| join_err.to_string());
                }
            };
        }

        if self.is_cancelled(&job_id) {
            info!(job_id = %job_id, "job cancelled during reduce phase, discarding results");
            return;
        }
        if let Some(message) = failure {
            self.fail_job(&job_id, message);
            return;
        }

        if let Err(e) = self.finalize_job(&job_id, reduce_outputs).await {
            self.fail_job(&job_id, e.to_string());
        }
    }

    async fn dispatch_map_task(self: Arc<Self>, task: MapTask) -> Result<TaskResult> {
        let job_id = task.job_id.clone();
        let task_id = task.task_id.clone();
        let payload = serde_json::to_value(&task)?;
        let result = self.dispatch_with_retry(&job_id, &task_id, TaskType::Map, payload).await?;
        let _ = self.jobs.update(&job_id, &mut |job| {
            job.completed_map_tasks += 1;
            job.recompute_progress();
        });
        Ok(result)
    }

    async fn dispatch_reduce_task(self: Arc<Self>, task: ReduceTask) -> Result<(u32, TaskResult)> {
        let job_id = task.job_id.clone();
        let task_id = task.task_id.clone();
        let partition_id = task.partition_id;
        let payload = serde_json::to_value(&task)?;
        let result = self.dispatch_with_retry(&job_id, &task_id, TaskType::Reduce, payload).await?;
        let _ = self.jobs.update(&job_id, &mut |job| {
            job.completed_reduce_tasks += 1;
            job.recompute_progress();
        });
        Ok((partition_id, result))
    }

    /// The dispatch policy and retry policy combined: claim a
    /// worker under the concurrency limit, POST the task, and on
    /// transient transport failure or a `failed` task result, requeue
    /// by trying again — up to `retry_budget` attempts — against
    /// whichever worker is next available.
    async fn dispatch_with_retry(&self, job_id: &JobId, task_id: &TaskId, task_type: TaskType, payload: serde_json::Value) -> Result<TaskResult> {
        let mut attempt = 0u32;
        loop {
            if self.is_cancelled(job_id) {
                return Err(Error::Cancelled(job_id.to_string()));
            }

            let worker = self.acquire_worker(task_id).await;
            let outcome = self.try_dispatch(&worker, task_type, &payload).await;
            self.workers.release(&worker.worker_id, task_id);

            match outcome {
                Ok(result) if result.status == TaskStatus::Completed => return Ok(result),
                Ok(result) => {
                    warn!(task_id = %task_id, worker_id = %worker.worker_id, error = ?result.error_message, "task failed, will retry");
                }
                Err(e) => {
                    warn!(task_id = %task_id, worker_id = %worker.worker_id, error = %e, "dispatch transport failure, marking worker lost");
                    self.workers.mark_lost(&worker.worker_id);
                }
            }

            attempt += 1;
            if attempt >= self.config.retry_budget {
                return Err(Error::RetryExhausted(task_id.to_string()));
            }
        }
    }

    /// Blocks (polling at a short fixed interval) until a worker is
    /// available under the per-worker concurrency limit — a FIFO
    /// ready-queue expressed as a claim-or-wait loop over the worker
    /// registry rather than a separate queue data structure.
    async fn acquire_worker(&self, task_id: &TaskId) -> WorkerInfo {
        loop {
            if let Some(worker) = self.workers.try_claim(task_id, self.config.worker_concurrency) {
                return worker;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn try_dispatch(&self, worker: &WorkerInfo, task_type: TaskType, payload: &serde_json::Value) -> Result<TaskResult> {
        let resp = self
            .http
            .post(format!("{}/task/execute", worker.url))
            .json(&json!({ "task_type": task_type, "task_data": payload }))
            .timeout(self.config.dispatch_timeout())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::WorkerLost(worker.worker_id.to_string()));
        }

        let body: TaskResponse = resp.json().await?;
        match body.result {
            Some(result) => Ok(result),
            None => Ok(TaskResult::failed(
                TaskId::from(body.task_id),
                task_type,
                worker.worker_id.clone(),
                body.error.unwrap_or_else(|| "worker reported failure with no message".to_string()),
                0.0,
            )),
        }
    }

    /// Groups every map output by the `_part_<p>.` suffix in its
    /// filename and builds one `ReduceTask` per non-empty partition.
    /// `input_files` preserves the order map tasks were dispatched in,
    /// so reduce task construction sees a stable ordering of the
    /// coordinator-provided input files.
    fn build_reduce_tasks(&self, job_id: &JobId, map_outputs: &[String]) -> Result<Vec<ReduceTask>> {
        let job = self.jobs.get(job_id)?;
        let mut by_partition: HashMap<u32, Vec<String>> = HashMap::new();
        for path in map_outputs {
            match partition_from_filename(path) {
                Some(p) => by_partition.entry(p).or_default().push(path.clone()),
                None => warn!(path = %path, "map output doesn't match the *_part_<p>.* convention, dropping"),
            }
        }

        let mut partitions: Vec<u32> = by_partition.keys().copied().collect();
        partitions.sort_unstable();

        Ok(partitions
            .into_iter()
            .map(|p| ReduceTask {
                task_id: reduce_task_id(job_id, p),
                job_id: job_id.clone(),
                partition_id: p,
                input_files: by_partition.remove(&p).unwrap_or_default(),
                output_file: reduce_output_path(&self.config.storage.shared_root, job_id.as_str(), p),
                reducer_url: job.reducer_url.clone(),
                attempt: 0,
            })
            .collect())
    }

    /// Concatenates completed reduce outputs in ascending partition
    /// order into `jobs/<job_id>/result.txt` and marks the job
    /// `completed`.
    async fn finalize_job(&self, job_id: &JobId, mut reduce_outputs: Vec<(u32, String)>) -> Result<()> {
        reduce_outputs.sort_by_key(|(p, _)| *p);

        let result_path = format!("{}/result.txt", input::job_dir(&self.config.storage.shared_root, job_id.as_str()));
        if let Some(parent) = Path::new(&result_path).parent() {
            tokio_fs::create_dir_all(parent).await?;
        }

        let mut concatenated = String::new();
        for (partition_id, path) in &reduce_outputs {
            match tokio_fs::read_to_string(path).await {
                Ok(contents) => concatenated.push_str(&contents),
                Err(e) => warn!(partition_id, path = %path, error = %e, "reduce output missing at final concatenation"),
            }
        }
        tokio_fs::write(&result_path, concatenated).await?;

        self.jobs.update(job_id, &mut |job| {
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.result_path = Some(result_path.clone());
        })?;
        info!(job_id = %job_id, result_path = %result_path, "job completed");
        Ok(())
    }
}

fn reduce_output_path(shared_root: &str, job_id: &str, partition_id: u32) -> String {
    format!("{}/intermediate/reduce/part-{partition_id:05}.txt", input::job_dir(shared_root, job_id))
}

/// Mints a per-job partition-hash seed, deterministic for the job's
/// lifetime but not required to be stable across coordinator restarts
/// — derived from the job id itself rather than a random source, which
/// keeps the scheduler free of non-determinism in tests.
fn seed_for(job_id: &JobId) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    job_id.as_str().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_output_path_is_zero_padded() {
        assert_eq!(reduce_output_path("/shared/gridmr", "job1", 3), "/shared/gridmr/jobs/job1/intermediate/reduce/part-00003.txt");
    }

    #[test]
    fn seed_is_deterministic_per_job() {
        let job_id = JobId::from("job1");
        assert_eq!(seed_for(&job_id), seed_for(&job_id));
    }
}
