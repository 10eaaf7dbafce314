//! The wire data model shared by coordinator, worker, and client.
//!
//! Every type here is `serde`-derived so that the HTTP control plane
//! (coordinator<->client, coordinator<->worker) and the on-disk
//! intermediate files agree on shape without hand-written parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(JobId);
opaque_id!(TaskId);
opaque_id!(WorkerId);

/// A single intermediate (or final) record. Serialized on disk as
/// `<key><TAB><value><NEWLINE>`; neither field may contain a literal
/// tab or newline in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Renders one `key\tvalue\n` line. Panics in debug builds if the
    /// key or value would corrupt the line-oriented format.
    pub fn to_line(&self) -> String {
        debug_assert!(!self.key.contains(['\t', '\n']), "key must not contain tab/newline");
        debug_assert!(!self.value.contains(['\t', '\n']), "value must not contain tab/newline");
        format!("{}\t{}\n", self.key, self.value)
    }

    /// Parses a `key\tvalue` line (no trailing newline expected).
    pub fn parse_line(line: &str) -> Option<Self> {
        let (key, value) = line.split_once('\t')?;
        Some(Self::new(key, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Map,
    Reduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Available,
    Busy,
    Lost,
}

/// A job as tracked by the coordinator's in-memory job table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_name: String,
    pub mapper_url: String,
    pub reducer_url: String,
    pub data_url: String,
    pub status: JobStatus,
    /// 0-100, monotonically non-decreasing within a run.
    pub progress: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub input_files: Vec<String>,
    pub map_tasks: Vec<TaskId>,
    pub reduce_tasks: Vec<TaskId>,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    /// Internal bookkeeping for `progress`: not part of the minimal
    /// wire contract, but harmless to expose and saves the scheduler a
    /// rescan of `TaskResult`s on every status poll.
    #[serde(default)]
    pub completed_map_tasks: usize,
    #[serde(default)]
    pub completed_reduce_tasks: usize,
}

impl Job {
    pub fn new(
        job_id: JobId,
        job_name: String,
        mapper_url: String,
        reducer_url: String,
        data_url: String,
        input_files: Vec<String>,
    ) -> Self {
        Self {
            job_id,
            job_name,
            mapper_url,
            reducer_url,
            data_url,
            status: JobStatus::Pending,
            progress: 0.0,
            created_at: chrono::Utc::now(),
            input_files,
            map_tasks: Vec::new(),
            reduce_tasks: Vec::new(),
            result_path: None,
            error_message: None,
            completed_map_tasks: 0,
            completed_reduce_tasks: 0,
        }
    }

    /// `0.5 * completed_map/total_map + 0.5 * completed_reduce/total_reduce`,
    /// clamped to 100; the reduce term is zero before reduce tasks exist.
    pub fn recompute_progress(&mut self) {
        let map_frac = if self.map_tasks.is_empty() { 0.0 } else { self.completed_map_tasks as f64 / self.map_tasks.len() as f64 };
        let reduce_frac = if self.reduce_tasks.is_empty() { 0.0 } else { self.completed_reduce_tasks as f64 / self.reduce_tasks.len() as f64 };
        self.progress = (50.0 * map_frac + 50.0 * reduce_frac).min(100.0);
    }
}

/// `task_id = <job_id>_map_<i>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTask {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub input_file: String,
    /// Canonical (coordinator-view) output directory; rewritten to the
    /// worker's local mount before use.
    pub output_dir: String,
    pub mapper_url: String,
    pub split_start: Option<usize>,
    pub split_end: Option<usize>,
    /// Reduce fanout for this job; carried on the task so the worker's
    /// partitioner doesn't need a side-channel round trip.
    pub num_partitions: u32,
    /// Shared partition-hash seed, agreed cluster-wide for this job.
    pub partition_seed: u64,
    pub attempt: u32,
}

/// `task_id = <job_id>_reduce_<p>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceTask {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub partition_id: u32,
    /// Every map output whose filename matches `*_part_<p>.*`.
    pub input_files: Vec<String>,
    pub output_file: String,
    pub reducer_url: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub output_files: Vec<String>,
    pub error_message: Option<String>,
    pub execution_time_secs: Option<f64>,
    pub worker_id: Option<WorkerId>,
}

impl TaskResult {
    pub fn completed(task_id: TaskId, task_type: TaskType, worker_id: WorkerId, output_files: Vec<String>, execution_time_secs: f64) -> Self {
        Self {
            task_id,
            task_type,
            status: TaskStatus::Completed,
            output_files,
            error_message: None,
            execution_time_secs: Some(execution_time_secs),
            worker_id: Some(worker_id),
        }
    }

    pub fn failed(task_id: TaskId, task_type: TaskType, worker_id: WorkerId, error_message: String, execution_time_secs: f64) -> Self {
        Self {
            task_id,
            task_type,
            status: TaskStatus::Failed,
            output_files: Vec::new(),
            error_message: Some(error_message),
            execution_time_secs: Some(execution_time_secs),
            worker_id: Some(worker_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    pub url: String,
    pub capabilities: Vec<String>,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
    pub assigned_tasks: Vec<TaskId>,
    pub state: WorkerState,
    pub last_assigned_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WorkerInfo {
    pub fn new(worker_id: WorkerId, url: String) -> Self {
        Self {
            worker_id,
            url,
            capabilities: Vec::new(),
            last_heartbeat_at: chrono::Utc::now(),
            assigned_tasks: Vec::new(),
            state: WorkerState::Available,
            last_assigned_at: None,
        }
    }
}

pub fn map_task_id(job_id: &JobId, i: usize) -> TaskId {
    TaskId(format!("{job_id}_map_{i}"))
}

pub fn reduce_task_id(job_id: &JobId, partition: u32) -> TaskId {
    TaskId(format!("{job_id}_reduce_{partition}"))
}

/// Extracts the partition id from a map-output filename of the form
/// `..._part_<p>.<ext>`. Returns `None` if the filename doesn't match.
pub fn partition_from_filename(path: &str) -> Option<u32> {
    let filename = path.rsplit('/').next().unwrap_or(path);
    let after = filename.split("_part_").nth(1)?;
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_half_map_half_reduce() {
        let mut job = Job::new(JobId::new(), "j".into(), "m".into(), "r".into(), "d".into(), vec!["a".into()]);
        job.map_tasks = vec![TaskId::from("t0"), TaskId::from("t1")];
        job.reduce_tasks = vec![TaskId::from("r0")];
        job.completed_map_tasks = 1;
        job.recompute_progress();
        assert_eq!(job.progress, 25.0);
        job.completed_map_tasks = 2;
        job.completed_reduce_tasks = 1;
        job.recompute_progress();
        assert_eq!(job.progress, 100.0);
    }

    #[test]
    fn partition_from_filename_parses_suffix() {
        assert_eq!(partition_from_filename("map_job1_map_0_part_3.txt"), Some(3));
        assert_eq!(partition_from_filename("no_partition_here.txt"), None);
    }
}
