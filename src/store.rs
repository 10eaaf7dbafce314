//! The persistence seam between the scheduler and job/worker state.
//!
//! In-memory job state on a single coordinator is a single point of
//! failure, so the scheduler is kept separate from a persistence
//! backend behind a narrow interface: `{create, update, get, list}`.
//! `JobStore` and `WorkerRegistry` are that interface;
//! [`InMemoryJobStore`]/[`InMemoryWorkerRegistry`] are the only backend
//! this crate ships (durable recovery stays a non-goal), but the
//! scheduler never reaches past these traits, so a durable backend
//! could be swapped in without touching dispatch logic.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::model::{Job, JobId, TaskId, WorkerId, WorkerInfo, WorkerState};

pub trait JobStore: Send + Sync {
    fn create(&self, job: Job);
    fn update(&self, job_id: &JobId, f: &mut dyn FnMut(&mut Job)) -> Result<()>;
    fn get(&self, job_id: &JobId) -> Result<Job>;
    fn list(&self) -> Vec<Job>;
}

pub trait WorkerRegistry: Send + Sync {
    fn create(&self, worker: WorkerInfo);
    fn update(&self, worker_id: &WorkerId, f: &mut dyn FnMut(&mut WorkerInfo)) -> Result<()>;
    fn get(&self, worker_id: &WorkerId) -> Result<WorkerInfo>;
    fn list(&self) -> Vec<WorkerInfo>;

    /// Atomically selects an `available` worker under `limit` in-flight
    /// tasks (longest-since-last-assignment first as the tie-break),
    /// assigns `task_id` to it, and returns the claimed worker. A
    /// plain `list()` then `update()` would race with a concurrent
    /// claim from another dispatch coroutine; this method holds the
    /// registry's lock across selection and assignment to rule that
    /// out.
    fn try_claim(&self, task_id: &TaskId, limit: usize) -> Option<WorkerInfo>;

    /// Returns a task to its worker's free pool after that task's
    /// dispatch attempt concludes (success or failure alike).
    fn release(&self, worker_id: &WorkerId, task_id: &TaskId);

    /// Marks a worker `lost` after a transport failure or a missed
    /// heartbeat deadline; its in-flight tasks are no longer counted
    /// against its concurrency limit.
    fn mark_lost(&self, worker_id: &WorkerId);

    /// Records a heartbeat. A worker previously marked `lost` is
    /// revived to `available` only by re-registering, so a heartbeat
    /// from an unknown worker id is rejected rather than silently
    /// re-admitted.
    fn heartbeat(&self, worker_id: &WorkerId) -> Result<()>;

    /// Marks every worker whose last heartbeat is older than `timeout`
    /// as `lost` and returns their ids, so the scheduler can log and
    /// let in-flight dispatch coroutines discover the loss on their
    /// own next attempt.
    fn sweep_lost(&self, timeout: Duration) -> Vec<WorkerId>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.job_id.clone(), job);
    }

    fn update(&self, job_id: &JobId, f: &mut dyn FnMut(&mut Job)) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        f(job);
        Ok(())
    }

    fn get(&self, job_id: &JobId) -> Result<Job> {
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    fn list(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

#[derive(Default)]
pub struct InMemoryWorkerRegistry {
    workers: Mutex<HashMap<WorkerId, WorkerInfo>>,
}

impl WorkerRegistry for InMemoryWorkerRegistry {
    fn create(&self, worker: WorkerInfo) {
        self.workers.lock().unwrap().insert(worker.worker_id.clone(), worker);
    }

    fn update(&self, worker_id: &WorkerId, f: &mut dyn FnMut(&mut WorkerInfo)) -> Result<()> {
        let mut workers = self.workers.lock().unwrap();
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| Error::WorkerNotFound(worker_id.to_string()))?;
        f(worker);
        Ok(())
    }

    fn get(&self, worker_id: &WorkerId) -> Result<WorkerInfo> {
        self.workers
            .lock()
            .unwrap()
            .get(worker_id)
            .cloned()
            .ok_or_else(|| Error::WorkerNotFound(worker_id.to_string()))
    }

    fn list(&self) -> Vec<WorkerInfo> {
        self.workers.lock().unwrap().values().cloned().collect()
    }

    fn try_claim(&self, task_id: &TaskId, limit: usize) -> Option<WorkerInfo> {
        let mut workers = self.workers.lock().unwrap();
        let candidate_id = workers
            .values()
            .filter(|w| w.state == WorkerState::Available && w.assigned_tasks.len() < limit)
            .min_by_key(|w| w.last_assigned_at)
            .map(|w| w.worker_id.clone())?;

        let worker = workers.get_mut(&candidate_id)?;
        worker.assigned_tasks.push(task_id.clone());
        worker.last_assigned_at = Some(Utc::now());
        if worker.assigned_tasks.len() >= limit {
            worker.state = WorkerState::Busy;
        }
        Some(worker.clone())
    }

    fn release(&self, worker_id: &WorkerId, task_id: &TaskId) {
        let mut workers = self.workers.lock().unwrap();
        if let Some(worker) = workers.get_mut(worker_id) {
            worker.assigned_tasks.retain(|t| t != task_id);
            if worker.state == WorkerState::Busy {
                worker.state = WorkerState::Available;
            }
        }
    }

    fn mark_lost(&self, worker_id: &WorkerId) {
        let mut workers = self.workers.lock().unwrap();
        if let Some(worker) = workers.get_mut(worker_id) {
            worker.state = WorkerState::Lost;
            worker.assigned_tasks.clear();
        }
    }

    fn heartbeat(&self, worker_id: &WorkerId) -> Result<()> {
        let mut workers = self.workers.lock().unwrap();
        let worker = workers.get_mut(worker_id).ok_or_else(|| Error::WorkerNotFound(worker_id.to_string()))?;
        worker.last_heartbeat_at = Utc::now();
        if worker.state == WorkerState::Lost {
            return Err(Error::WorkerLost(worker_id.to_string()));
        }
        Ok(())
    }

    fn sweep_lost(&self, timeout: Duration) -> Vec<WorkerId> {
        let mut workers = self.workers.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        let mut newly_lost = Vec::new();
        for worker in workers.values_mut() {
            if worker.state != WorkerState::Lost && worker.last_heartbeat_at < cutoff {
                worker.state = WorkerState::Lost;
                worker.assigned_tasks.clear();
                newly_lost.push(worker.worker_id.clone());
            }
        }
        newly_lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    #[test]
    fn create_then_get_round_trips() {
        let store = InMemoryJobStore::default();
        let job = Job::new(
            JobId::new(),
            "demo".to_string(),
            "wordcount".to_string(),
            "wordcount".to_string(),
            "file:///tmp/input".to_string(),
            vec![],
        );
        let id = job.job_id.clone();
        store.create(job);
        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn update_mutates_in_place() {
        let store = InMemoryJobStore::default();
        let job = Job::new(JobId::new(), "demo".to_string(), "m".to_string(), "r".to_string(), "d".to_string(), vec![]);
        let id = job.job_id.clone();
        store.create(job);
        store.update(&id, &mut |j| j.status = JobStatus::Running).unwrap();
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn missing_job_is_an_error() {
        let store = InMemoryJobStore::default();
        assert!(store.get(&JobId::from("nope")).is_err());
    }

    #[test]
    fn try_claim_respects_concurrency_limit() {
        let registry = InMemoryWorkerRegistry::default();
        registry.create(WorkerInfo::new(WorkerId::from("w1"), "http://w1".to_string()));

        let claimed = registry.try_claim(&TaskId::from("t1"), 1).unwrap();
        assert_eq!(claimed.worker_id, WorkerId::from("w1"));
        assert!(registry.try_claim(&TaskId::from("t2"), 1).is_none(), "worker is at its concurrency limit");

        registry.release(&WorkerId::from("w1"), &TaskId::from("t1"));
        assert!(registry.try_claim(&TaskId::from("t2"), 1).is_some());
    }

    #[test]
    fn lost_worker_is_not_claimable_and_loses_its_tasks() {
        let registry = InMemoryWorkerRegistry::default();
        registry.create(WorkerInfo::new(WorkerId::from("w1"), "http://w1".to_string()));
        registry.try_claim(&TaskId::from("t1"), 4).unwrap();

        registry.mark_lost(&WorkerId::from("w1"));
        let worker = registry.get(&WorkerId::from("w1")).unwrap();
        assert_eq!(worker.state, WorkerState::Lost);
        assert!(worker.assigned_tasks.is_empty());
        assert!(registry.try_claim(&TaskId::from("t2"), 4).is_none());
    }

    #[test]
    fn heartbeat_from_lost_worker_is_rejected() {
        let registry = InMemoryWorkerRegistry::default();
        registry.create(WorkerInfo::new(WorkerId::from("w1"), "http://w1".to_string()));
        registry.mark_lost(&WorkerId::from("w1"));
        assert!(registry.heartbeat(&WorkerId::from("w1")).is_err());
    }

    #[test]
    fn sweep_lost_marks_stale_workers() {
        let registry = InMemoryWorkerRegistry::default();
        let mut worker = WorkerInfo::new(WorkerId::from("w1"), "http://w1".to_string());
        worker.last_heartbeat_at = Utc::now() - chrono::Duration::seconds(120);
        registry.create(worker);

        let lost = registry.sweep_lost(Duration::from_secs(90));
        assert_eq!(lost, vec![WorkerId::from("w1")]);
        assert_eq!(registry.get(&WorkerId::from("w1")).unwrap().state, WorkerState::Lost);
    }
}
