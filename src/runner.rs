//! Execution runner
//!
//! Runs one job's command and records its outcome as a task. A job never
//! has two executions in flight: the second attempt is skipped, not queued.

use crate::executor::CommandExecutor;
use crate::repository::JobRepository;
use crate::scheduler::SchedulerEvent;
use crate::types::{Job, JobPatch, JobState, Task, TaskStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// What happened to a run request
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Job disabled or already executing
    Skipped,
    /// Command ran; the finished task
    Completed(Task),
}

impl RunOutcome {
    pub fn task(&self) -> Option<&Task> {
        match self {
            RunOutcome::Skipped => None,
            RunOutcome::Completed(task) => Some(task),
        }
    }
}

/// Held for the duration of one execution
///
/// Dropping the guard releases the job for the next fire.
pub struct ExecutionGuard {
    job_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.job_id);
    }
}

/// Executes jobs and writes tasks and job state through the repository
#[derive(Clone)]
pub struct ExecutionRunner {
    repository: JobRepository,
    executor: Arc<dyn CommandExecutor>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    default_timeout: Option<Duration>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ExecutionRunner {
    pub fn new(
        repository: JobRepository,
        executor: Arc<dyn CommandExecutor>,
        event_tx: broadcast::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            repository,
            executor,
            event_tx,
            default_timeout: None,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Limit applied to jobs without their own `timeoutMs`
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Claim the job for one execution; `None` while another one is running
    pub fn try_acquire(&self, job_id: &str) -> Option<ExecutionGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(job_id.to_string()) {
            return None;
        }
        Some(ExecutionGuard {
            job_id: job_id.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_executing(&self, job_id: &str) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.contains(job_id)
    }

    /// Run the job in the background
    pub fn spawn(&self, job: Job) -> JoinHandle<RunOutcome> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(&job).await })
    }

    /// Run the job to completion
    ///
    /// Failures to record state are logged; this never returns an error.
    pub async fn run(&self, job: &Job) -> RunOutcome {
        if !job.enabled {
            tracing::debug!(job_id = %job.id, "Job disabled, not running");
            return RunOutcome::Skipped;
        }

        let Some(_guard) = self.try_acquire(&job.id) else {
            tracing::info!(job_id = %job.id, name = %job.name, "Job still executing, fire skipped");
            let _ = self.event_tx.send(SchedulerEvent::FireSkipped {
                job_id: job.id.clone(),
            });
            return RunOutcome::Skipped;
        };

        RunOutcome::Completed(self.execute(job).await)
    }

    async fn execute(&self, job: &Job) -> Task {
        let task = Task::new(&job.id);
        self.persist_task(&task).await;
        self.record_state(
            &job.id,
            JobPatch {
                last_state: Some(JobState::Running),
                last_run_at: Some(task.started_at),
                ..Default::default()
            },
        )
        .await;

        let task = task.start();
        self.persist_task(&task).await;
        let _ = self.event_tx.send(SchedulerEvent::TaskStarted {
            job_id: job.id.clone(),
            task_id: task.id.clone(),
        });
        tracing::info!(job_id = %job.id, task_id = %task.id, name = %job.name, "Executing job");

        let limit = job
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .or(self.default_timeout);

        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, self.executor.execute(&job.command))
                .await
                .map_err(|_| limit),
            None => Ok(self.executor.execute(&job.command).await),
        };

        let task = match result {
            Ok(Ok(output)) => task.complete(output.exit_code, output.stdout, output.stderr),
            Ok(Err(e)) => task.fail(format!("Failed to execute command: {}", e)),
            Err(limit) => {
                tracing::warn!(job_id = %job.id, limit_ms = limit.as_millis() as u64, "Job timed out");
                task.timeout(limit.as_millis() as u64)
            }
        };

        self.persist_task(&task).await;

        let state = if task.status == TaskStatus::Success {
            JobState::Success
        } else {
            JobState::Failure
        };
        self.record_state(&job.id, JobPatch::last_state(state)).await;

        match &task.error {
            None => {
                tracing::info!(job_id = %job.id, task_id = %task.id, duration_ms = task.duration_ms.unwrap_or(0), "Job succeeded");
                let _ = self.event_tx.send(SchedulerEvent::TaskSucceeded {
                    job_id: job.id.clone(),
                    task_id: task.id.clone(),
                });
            }
            Some(error) => {
                tracing::warn!(job_id = %job.id, task_id = %task.id, error = %error, "Job failed");
                let _ = self.event_tx.send(SchedulerEvent::TaskFailed {
                    job_id: job.id.clone(),
                    task_id: task.id.clone(),
                    error: error.clone(),
                });
            }
        }

        task
    }

    async fn persist_task(&self, task: &Task) {
        if let Err(e) = self.repository.save_task(task).await {
            tracing::error!(job_id = %task.job_id, task_id = %task.id, error = %e, "Failed to save task");
        }
    }

    async fn record_state(&self, job_id: &str, patch: JobPatch) {
        if let Err(e) = self.repository.record_state(job_id, &patch).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, ShellExecutor};
    use crate::store::MemoryJobStore;
    use crate::types::NewJob;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Blocks every command until released
    struct GateExecutor {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl CommandExecutor for GateExecutor {
        async fn execute(&self, _command: &str) -> std::io::Result<CommandOutput> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(CommandOutput {
                exit_code: Some(0),
                stdout: "done".into(),
                stderr: String::new(),
            })
        }
    }

    struct FailingSpawn;

    #[async_trait]
    impl CommandExecutor for FailingSpawn {
        async fn execute(&self, _command: &str) -> std::io::Result<CommandOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no shell"))
        }
    }

    fn setup(
        executor: Arc<dyn CommandExecutor>,
    ) -> (ExecutionRunner, JobRepository, broadcast::Receiver<SchedulerEvent>) {
        let repository = JobRepository::new(Arc::new(MemoryJobStore::new()));
        let (event_tx, event_rx) = broadcast::channel(64);
        let runner = ExecutionRunner::new(repository.clone(), executor, event_tx);
        (runner, repository, event_rx)
    }

    async fn create(repository: &JobRepository, command: &str) -> Job {
        repository
            .create(NewJob::new("test", "* * * * *", command))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_success() {
        let (runner, repository, mut events) = setup(Arc::new(ShellExecutor::new()));
        let job = create(&repository, "echo hello").await;

        let outcome = runner.run(&job).await;
        let task = outcome.task().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.exit_code, Some(0));
        assert_eq!(task.output.trim(), "hello");
        assert!(task.finished_at.is_some());

        let stored = repository.get(&job.id).await.unwrap();
        assert_eq!(stored.last_state, JobState::Success);
        assert_eq!(stored.last_run_at, Some(task.started_at));

        let tasks = repository.list_tasks(&job.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(&tasks[0], task);

        assert!(matches!(events.try_recv().unwrap(), SchedulerEvent::TaskStarted { .. }));
        assert!(matches!(events.try_recv().unwrap(), SchedulerEvent::TaskSucceeded { .. }));
        assert!(!runner.is_executing(&job.id));
    }

    #[tokio::test]
    async fn test_run_failure() {
        let (runner, repository, _events) = setup(Arc::new(ShellExecutor::new()));
        let job = create(&repository, "echo broken >&2; exit 1").await;

        let task = runner.run(&job).await.task().cloned().unwrap();
        assert_eq!(task.status, TaskStatus::Failure);
        assert_eq!(task.exit_code, Some(1));
        assert!(task.error.unwrap().contains("broken"));

        let stored = repository.get(&job.id).await.unwrap();
        assert_eq!(stored.last_state, JobState::Failure);
    }

    #[tokio::test]
    async fn test_spawn_error_is_failure() {
        let (runner, repository, _events) = setup(Arc::new(FailingSpawn));
        let job = create(&repository, "anything").await;

        let task = runner.run(&job).await.task().cloned().unwrap();
        assert_eq!(task.status, TaskStatus::Failure);
        assert!(task.exit_code.is_none());
        assert!(task.error.unwrap().starts_with("Failed to execute command"));
    }

    #[tokio::test]
    async fn test_timeout_releases_guard() {
        let (runner, repository, _events) = setup(Arc::new(ShellExecutor::new()));
        let job = create(&repository, "sleep 5").await.with_timeout(100);

        let task = runner.run(&job).await.task().cloned().unwrap();
        assert_eq!(task.status, TaskStatus::Failure);
        assert!(task.error.unwrap().contains("timed out"));
        assert!(runner.try_acquire(&job.id).is_some());

        let stored = repository.get(&job.id).await.unwrap();
        assert_eq!(stored.last_state, JobState::Failure);
    }

    #[tokio::test]
    async fn test_disabled_job_is_skipped() {
        let (runner, repository, _events) = setup(Arc::new(ShellExecutor::new()));
        let job = create(&repository, "echo hi").await.with_enabled(false);

        assert_eq!(runner.run(&job).await, RunOutcome::Skipped);
        assert!(repository.list_tasks(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (runner, repository, mut events) = setup(Arc::new(GateExecutor {
            started: started.clone(),
            release: release.clone(),
        }));
        let job = create(&repository, "long").await;

        let first = runner.spawn(job.clone());
        started.notified().await;
        assert!(runner.is_executing(&job.id));

        assert_eq!(runner.run(&job).await, RunOutcome::Skipped);
        // The skipped attempt leaves the running state alone
        let stored = repository.get(&job.id).await.unwrap();
        assert_eq!(stored.last_state, JobState::Running);

        release.notify_one();
        let outcome = first.await.unwrap();
        assert_eq!(outcome.task().unwrap().status, TaskStatus::Success);
        assert_eq!(repository.list_tasks(&job.id).await.unwrap().len(), 1);

        let mut saw_skip = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SchedulerEvent::FireSkipped { ref job_id } if *job_id == job.id) {
                saw_skip = true;
            }
        }
        assert!(saw_skip);
    }

    #[tokio::test]
    async fn test_deleted_job_still_records_task() {
        let (runner, repository, _events) = setup(Arc::new(ShellExecutor::new()));
        let job = create(&repository, "true").await;
        repository.delete(&job.id).await.unwrap();

        let outcome = runner.run(&job).await;
        assert_eq!(outcome.task().unwrap().status, TaskStatus::Success);
        assert!(repository.find(&job.id).await.unwrap().is_none());
        assert_eq!(repository.list_tasks(&job.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_guard_released_on_drop() {
        let repository = JobRepository::new(Arc::new(MemoryJobStore::new()));
        let (event_tx, _) = broadcast::channel(4);
        let runner = ExecutionRunner::new(repository, Arc::new(ShellExecutor::new()), event_tx);

        let guard = runner.try_acquire("a").unwrap();
        assert!(runner.try_acquire("a").is_none());
        assert!(runner.try_acquire("b").is_some());
        drop(guard);
        assert!(runner.try_acquire("a").is_some());
    }
}
