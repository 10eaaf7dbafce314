//! The worker task executor: runs a single map or reduce task to
//! completion or failure and reports a [`TaskResult`].

pub mod heartbeat;
pub mod http;

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::loader::ProgramLoader;
use crate::model::{KeyValue, MapTask, ReduceTask, TaskResult, TaskStatus, TaskType, WorkerId};
use crate::partition::partition_of;
use crate::pathrewrite::PathRewriter;
use crate::shuffle;

pub struct WorkerExecutor {
    pub worker_id: WorkerId,
    pub path_rewriter: PathRewriter,
    pub loader: ProgramLoader,
    pub tasks: Mutex<HashMap<String, TaskResult>>,
}

impl WorkerExecutor {
    pub fn new(worker_id: WorkerId, path_rewriter: PathRewriter) -> Self {
        Self {
            loader: ProgramLoader::new(path_rewriter.clone()),
            worker_id,
            path_rewriter,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, result: TaskResult) {
        self.tasks.lock().unwrap().insert(result.task_id.to_string(), result);
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskResult> {
        self.tasks.lock().unwrap().get(task_id).cloned()
    }

    /// Snapshot of every task this worker has seen, for the heartbeat
    /// payload's `current_tasks` field.
    pub fn in_flight_snapshot(&self) -> Vec<(String, TaskStatus)> {
        self.tasks.lock().unwrap().iter().map(|(id, r)| (id.clone(), r.status)).collect()
    }

    /// Executes a map task: rewrite paths, load the mapper, read the
    /// configured line window, partition + sort + write one file per
    /// non-empty bucket, rewrite outputs back to canonical paths.
    pub async fn execute_map_task(&self, task: &MapTask) -> TaskResult {
        let start = Instant::now();
        match self.try_execute_map_task(task).await {
            Ok(output_files) => TaskResult::completed(
                task.task_id.clone(),
                TaskType::Map,
                self.worker_id.clone(),
                output_files,
                start.elapsed().as_secs_f64(),
            ),
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "map task failed");
                TaskResult::failed(task.task_id.clone(), TaskType::Map, self.worker_id.clone(), e.to_string(), start.elapsed().as_secs_f64())
            }
        }
    }

    async fn try_execute_map_task(&self, task: &MapTask) -> Result<Vec<String>> {
        let input_file = self.path_rewriter.to_local(&task.input_file);
        let output_dir = self.path_rewriter.to_local(&task.output_dir);

        let intermediate_dir = Path::new(&output_dir)
            .join("jobs")
            .join(task.job_id.as_str())
            .join("intermediate")
            .join("map");
        fs::create_dir_all(&intermediate_dir)?;

        let mapper = self.loader.load_mapper(&task.mapper_url).await?;

        let contents = fs::read_to_string(&input_file)?;
        let lines: Vec<&str> = contents.lines().collect();
        let start = task.split_start.unwrap_or(0);
        let end = task.split_end.unwrap_or(lines.len()).min(lines.len());

        let mut buckets: HashMap<u32, Vec<KeyValue>> = HashMap::new();
        for (offset, line) in lines[start..end].iter().enumerate() {
            let line_number = (start + offset) as i64;
            for kv in mapper.apply(line_number, line) {
                let partition = partition_of(&kv.key, task.partition_seed, task.num_partitions);
                buckets.entry(partition).or_default().push(kv);
            }
        }

        debug!(task_id = %task.task_id, lines = end - start, partitions = buckets.len(), "map task produced buckets");

        let mut output_files = Vec::new();
        for (partition_id, mut kvs) in buckets {
            if kvs.is_empty() {
                continue;
            }
            kvs.sort_by(|a, b| a.key.cmp(&b.key));
            let output_path = intermediate_dir.join(format!("map_{}_part_{}.txt", task.task_id, partition_id));
            let mut f = fs::File::create(&output_path)?;
            for kv in &kvs {
                f.write_all(kv.to_line().as_bytes())?;
            }
            output_files.push(self.path_rewriter.to_canonical(output_path.to_str().unwrap()));
        }

        Ok(output_files)
    }

    /// Executes a reduce task: shuffle-and-sort the partition's map
    /// outputs, then apply the reducer to each key in sorted order.
    pub async fn execute_reduce_task(&self, task: &ReduceTask) -> TaskResult {
        let start = Instant::now();
        match self.try_execute_reduce_task(task).await {
            Ok(output_file) => TaskResult::completed(
                task.task_id.clone(),
                TaskType::Reduce,
                self.worker_id.clone(),
                vec![output_file],
                start.elapsed().as_secs_f64(),
            ),
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "reduce task failed");
                TaskResult::failed(task.task_id.clone(), TaskType::Reduce, self.worker_id.clone(), e.to_string(), start.elapsed().as_secs_f64())
            }
        }
    }

    async fn try_execute_reduce_task(&self, task: &ReduceTask) -> Result<String> {
        let input_files: Vec<String> = task.input_files.iter().map(|f| self.path_rewriter.to_local(f)).collect();
        let output_file = self.path_rewriter.to_local(&task.output_file);

        // output_file is `.../jobs/<job_id>/intermediate/reduce/part-NNNNN.txt`;
        // the shuffled file is its sibling under `intermediate/shuffled/`.
        let intermediate_dir = Path::new(&output_file)
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| crate::error::Error::Validation(format!("malformed reduce output path `{output_file}`")))?;
        let shuffled_dir = intermediate_dir.join("shuffled");
        fs::create_dir_all(&shuffled_dir)?;
        let shuffled_path = shuffled_dir.join(format!("shuffled_part_{}.txt", task.partition_id));

        info!(task_id = %task.task_id, partition = task.partition_id, "starting shuffle-and-sort");
        shuffle::shuffle_and_sort(&input_files, task.partition_id, shuffled_path.to_str().unwrap())?;

        let reducer = self.loader.load_reducer(&task.reducer_url).await?;
        let grouped = shuffle::read_shuffled_file(shuffled_path.to_str().unwrap())?;

        if let Some(parent) = Path::new(&output_file).parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&output_file)?;
        for (key, values) in grouped {
            for kv in reducer.apply(&key, &values) {
                out.write_all(kv.to_line().as_bytes())?;
            }
        }

        Ok(self.path_rewriter.to_canonical(&output_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobId, TaskId};
    use tempfile::tempdir;

    fn write_input(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn map_task_partitions_and_sorts_within_bucket() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path(), "input.txt", "to be or not to be\n");
        let job_id = JobId::from("job1");

        let executor = WorkerExecutor::new(WorkerId::from("w1"), PathRewriter::disabled());
        let task = MapTask {
            task_id: TaskId::from("job1_map_0"),
            job_id: job_id.clone(),
            input_file: input,
            output_dir: dir.path().to_str().unwrap().to_string(),
            mapper_url: "wordcount".to_string(),
            split_start: None,
            split_end: None,
            num_partitions: 4,
            partition_seed: 42,
            attempt: 0,
        };

        let result = executor.execute_map_task(&task).await;
        assert_eq!(result.status, TaskStatus::Completed);
        assert!(!result.output_files.is_empty());

        for file in &result.output_files {
            let contents = fs::read_to_string(file).unwrap();
            let keys: Vec<&str> = contents.lines().map(|l| l.split('\t').next().unwrap()).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(keys, sorted, "keys within one partition file must be sorted");
        }
    }

    #[tokio::test]
    async fn reduce_task_sums_word_counts() {
        let dir = tempdir().unwrap();
        let map_dir = dir.path().join("jobs").join("job1").join("intermediate").join("map");
        fs::create_dir_all(&map_dir).unwrap();
        let part0 = map_dir.join("map_job1_map_0_part_0.txt");
        fs::write(&part0, "be\t1\nbe\t1\nnot\t1\n").unwrap();

        let executor = WorkerExecutor::new(WorkerId::from("w1"), PathRewriter::disabled());
        let output_file = dir
            .path()
            .join("jobs")
            .join("job1")
            .join("intermediate")
            .join("reduce")
            .join("part-00000.txt");

        let task = ReduceTask {
            task_id: TaskId::from("job1_reduce_0"),
            job_id: JobId::from("job1"),
            partition_id: 0,
            input_files: vec![part0.to_str().unwrap().to_string()],
            output_file: output_file.to_str().unwrap().to_string(),
            reducer_url: "wordcount".to_string(),
            attempt: 0,
        };

        let result = executor.execute_reduce_task(&task).await;
        assert_eq!(result.status, TaskStatus::Completed);
        let contents = fs::read_to_string(&output_file).unwrap();
        assert!(contents.contains("be\t2"));
        assert!(contents.contains("not\t1"));
    }
}
