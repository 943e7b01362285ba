//! Scheduler controller
//!
//! Owns the schedule registry and the execution runner, and is the only
//! entry point for job mutations. Every mutation and every timer fire for a
//! job runs under that job's lock, so a fire can never observe a half-applied
//! update.

use crate::error::{JobError, Result};
use crate::executor::CommandExecutor;
use crate::parser::next_fire_after;
use crate::query::ListParams;
use crate::registry::{Fire, ScheduleRegistry};
use crate::repository::JobRepository;
use crate::runner::{ExecutionRunner, RunOutcome};
use crate::types::{DeleteResult, Job, JobPatch, NewJob, Task};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Default capacity of the event channel
const EVENT_CAPACITY: usize = 256;

/// Default period between store resyncs
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduler events for monitoring
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Scheduler started
    Started,
    /// Scheduler stopped
    Stopped,
    /// Timer armed for a job
    JobArmed {
        job_id: String,
        next_fire: DateTime<Utc>,
    },
    /// Timer removed
    JobDisarmed { job_id: String },
    /// Command started
    TaskStarted { job_id: String, task_id: String },
    /// Command exited with status zero
    TaskSucceeded { job_id: String, task_id: String },
    /// Command failed, could not be spawned or timed out
    TaskFailed {
        job_id: String,
        task_id: String,
        error: String,
    },
    /// Fire dropped because the previous execution is still running
    FireSkipped { job_id: String },
}

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Limit for jobs without their own `timeoutMs`
    pub default_timeout: Option<Duration>,
    pub event_capacity: usize,
    /// How often a running scheduler re-reads the store for jobs changed
    /// by other processes; `None` turns resyncing off
    pub resync_interval: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            default_timeout: None,
            event_capacity: EVENT_CAPACITY,
            resync_interval: Some(RESYNC_INTERVAL),
        }
    }
}

type LockMap = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// One async mutex per job id
#[derive(Default)]
struct JobLocks {
    locks: LockMap,
}

impl JobLocks {
    async fn lock(&self, job_id: &str) -> JobGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(job_id.to_string()).or_default().clone()
        };
        JobGuard {
            guard: Some(lock.lock_owned().await),
            job_id: job_id.to_string(),
            locks: self.locks.clone(),
        }
    }
}

/// Held job lock; the map entry goes away with the last holder or waiter
struct JobGuard {
    guard: Option<OwnedMutexGuard<()>>,
    job_id: String,
    locks: LockMap,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.job_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.job_id);
        }
    }
}

struct Inner {
    repository: JobRepository,
    runner: ExecutionRunner,
    registry: Mutex<ScheduleRegistry>,
    locks: JobLocks,
    event_tx: broadcast::Sender<SchedulerEvent>,
    running: RwLock<bool>,
    shutdown: Arc<Notify>,
    resync_interval: Option<Duration>,
    fire_rx: Mutex<Option<mpsc::UnboundedReceiver<Fire>>>,
    fire_loop: Mutex<Option<JoinHandle<mpsc::UnboundedReceiver<Fire>>>>,
}

/// Job scheduler
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a stopped scheduler
    pub fn new(
        repository: JobRepository,
        executor: Arc<dyn CommandExecutor>,
        options: SchedulerOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(options.event_capacity.max(1));
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let runner = ExecutionRunner::new(repository.clone(), executor, event_tx.clone())
            .with_default_timeout(options.default_timeout);

        Self {
            inner: Arc::new(Inner {
                repository,
                runner,
                registry: Mutex::new(ScheduleRegistry::new(fire_tx)),
                locks: JobLocks::default(),
                event_tx,
                running: RwLock::new(false),
                shutdown: Arc::new(Notify::new()),
                resync_interval: options.resync_interval.filter(|d| !d.is_zero()),
                fire_rx: Mutex::new(Some(fire_rx)),
                fire_loop: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Arm every enabled job and begin handling fires
    pub async fn start(&self) -> Result<()> {
        let jobs = {
            let mut running = self.inner.running.write().await;
            if *running {
                return Ok(());
            }

            let jobs = self.inner.repository.list_enabled().await?;
            let fire_rx = self
                .inner
                .fire_rx
                .lock()
                .await
                .take()
                .ok_or_else(|| JobError::Execution("fire channel unavailable".to_string()))?;

            let handle = spawn_fire_loop(
                Arc::downgrade(&self.inner),
                self.inner.shutdown.clone(),
                self.inner.resync_interval,
                fire_rx,
            );
            *self.inner.fire_loop.lock().await = Some(handle);
            *running = true;
            jobs
        };

        let _ = self.inner.event_tx.send(SchedulerEvent::Started);
        tracing::info!(jobs = jobs.len(), "Scheduler started");

        join_all(jobs.iter().map(|job| self.inner.load(&job.id))).await;
        Ok(())
    }

    /// Disarm every job and stop handling fires
    ///
    /// Executions already in flight run to completion.
    pub async fn stop(&self) {
        {
            let mut running = self.inner.running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }

        let disarmed = self.inner.registry.lock().await.disarm_all();
        self.inner.shutdown.notify_one();

        if let Some(handle) = self.inner.fire_loop.lock().await.take() {
            match handle.await {
                Ok(fire_rx) => *self.inner.fire_rx.lock().await = Some(fire_rx),
                Err(e) => tracing::error!(error = %e, "Fire loop ended abnormally"),
            }
        }

        let _ = self.inner.event_tx.send(SchedulerEvent::Stopped);
        tracing::info!(disarmed, "Scheduler stopped");
    }

    /// Check if scheduler is running
    pub async fn is_running(&self) -> bool {
        *self.inner.running.read().await
    }

    /// Validate, persist and (when enabled) arm a new job
    pub async fn create_job(&self, data: NewJob) -> Result<Job> {
        let job = self.inner.repository.prepare(data)?;
        check_schedulable(&job.expression)?;

        let _guard = self.inner.locks.lock(&job.id).await;
        self.inner.repository.insert(&job).await?;
        tracing::info!(job_id = %job.id, name = %job.name, expression = %job.expression, "Created job");

        self.inner.reconcile(&job).await;
        Ok(job)
    }

    /// Apply a partial update and re-arm or disarm as needed
    pub async fn update_job(&self, id: &str, mut patch: JobPatch) -> Result<Job> {
        self.inner.repository.validate_patch(id, &patch)?;
        if let Some(expression) = patch.expression.as_mut() {
            *expression = expression.trim().to_string();
            check_schedulable(expression)?;
        }

        let _guard = self.inner.locks.lock(id).await;
        let job = self.inner.repository.update(id, &patch).await?;
        tracing::info!(job_id = %job.id, name = %job.name, "Updated job");

        if patch.touches_schedule() {
            self.inner.reconcile(&job).await;
        }
        Ok(job)
    }

    /// Delete a job and its task history, cancelling its timer
    pub async fn delete_job(&self, id: &str) -> Result<DeleteResult> {
        let _guard = self.inner.locks.lock(id).await;
        let result = self.inner.repository.delete(id).await?;
        self.inner.disarm(id).await;
        tracing::info!(job_id = %id, "Deleted job");
        Ok(result)
    }

    pub async fn list_jobs(&self, params: &ListParams) -> Result<Vec<Job>> {
        self.inner.repository.list(params).await
    }

    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.inner.repository.get(id).await
    }

    /// Task history for a job, most recent first
    pub async fn list_tasks(&self, job_id: &str) -> Result<Vec<Task>> {
        self.inner.repository.list_tasks(job_id).await
    }

    /// Run a job immediately and wait for it
    ///
    /// Subject to the same single-flight rule as timer fires.
    pub async fn run_now(&self, id: &str) -> Result<RunOutcome> {
        let job = self.inner.repository.get(id).await?;
        Ok(self.inner.runner.run(&job).await)
    }

    /// Next fire instant of an armed job
    pub async fn next_fire(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.registry.lock().await.next_fire(id)
    }

    pub async fn is_armed(&self, id: &str) -> bool {
        self.inner.registry.lock().await.is_armed(id)
    }

    pub async fn armed_count(&self) -> usize {
        self.inner.registry.lock().await.armed_count()
    }
}

impl Inner {
    /// Re-read a job under its lock and bring its timer in line
    async fn load(&self, job_id: &str) {
        let _guard = self.locks.lock(job_id).await;
        match self.repository.find(job_id).await {
            Ok(Some(job)) => self.reconcile(&job).await,
            Ok(None) => self.disarm(job_id).await,
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Failed to load job"),
        }
    }

    /// Arm an enabled job, disarm a disabled one
    ///
    /// Leaves an already armed timer alone when the expression is unchanged.
    async fn reconcile(&self, job: &Job) {
        // Held until armed; stop() waits on it
        let running = self.running.read().await;
        if !(*running && job.enabled) {
            self.disarm(&job.id).await;
            return;
        }

        let mut registry = self.registry.lock().await;
        if registry.expression(&job.id) == Some(job.expression.as_str()) {
            return;
        }

        match registry.arm(&job.id, &job.expression) {
            Ok(next_fire) => {
                tracing::info!(job_id = %job.id, next_fire = %next_fire, "Armed job");
                let _ = self.event_tx.send(SchedulerEvent::JobArmed {
                    job_id: job.id.clone(),
                    next_fire,
                });
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, expression = %job.expression, error = %e, "Failed to arm job");
            }
        }
    }

    /// Bring timers in line with jobs changed in the store by other processes
    async fn resync(&self) {
        if !*self.running.read().await {
            return;
        }
        let jobs = match self.repository.list_enabled().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resync jobs");
                return;
            }
        };

        let changed: Vec<String> = {
            let registry = self.registry.lock().await;
            let enabled: HashSet<&str> = jobs.iter().map(|job| job.id.as_str()).collect();
            let changed = jobs
                .iter()
                .filter(|job| registry.expression(&job.id) != Some(job.expression.as_str()))
                .map(|job| job.id.clone())
                .chain(
                    registry
                        .armed_ids()
                        .into_iter()
                        .filter(|id| !enabled.contains(id.as_str())),
                )
                .collect();
            changed
        };
        if changed.is_empty() {
            return;
        }

        tracing::debug!(jobs = changed.len(), "Resyncing changed jobs");
        join_all(changed.iter().map(|id| self.load(id))).await;
    }

    async fn disarm(&self, job_id: &str) {
        if self.registry.lock().await.disarm(job_id) {
            tracing::info!(job_id = %job_id, "Disarmed job");
            let _ = self.event_tx.send(SchedulerEvent::JobDisarmed {
                job_id: job_id.to_string(),
            });
        }
    }

    async fn handle_fire(&self, fire: Fire) {
        let _guard = self.locks.lock(&fire.job_id).await;

        if !self.registry.lock().await.is_current(&fire) {
            tracing::debug!(job_id = %fire.job_id, generation = fire.generation, "Dropped stale fire");
            return;
        }

        let job = self.repository.find(&fire.job_id).await;

        let mut registry = self.registry.lock().await;
        // Stopped while the job was being read
        if !registry.is_current(&fire) {
            return;
        }

        let job = match job {
            Ok(Some(job)) if job.enabled => job,
            Ok(_) => {
                registry.disarm(&fire.job_id);
                drop(registry);
                tracing::info!(job_id = %fire.job_id, "Job missing or disabled, disarmed");
                let _ = self.event_tx.send(SchedulerEvent::JobDisarmed {
                    job_id: fire.job_id.clone(),
                });
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %fire.job_id, error = %e, "Failed to load fired job");
                if let Err(e) = registry.rearm_after_fire(&fire) {
                    tracing::error!(job_id = %fire.job_id, error = %e, "Failed to re-arm job");
                }
                return;
            }
        };

        match registry.rearm_after_fire(&fire) {
            Ok(next_fire) => {
                let _ = self.event_tx.send(SchedulerEvent::JobArmed {
                    job_id: job.id.clone(),
                    next_fire,
                });
            }
            Err(e) => {
                registry.disarm(&job.id);
                tracing::error!(job_id = %job.id, error = %e, "Failed to re-arm job");
            }
        }
        drop(registry);

        tracing::debug!(job_id = %job.id, scheduled_for = %fire.scheduled_for, "Job fired");
        self.runner.spawn(job);
    }
}

fn check_schedulable(expression: &str) -> Result<()> {
    next_fire_after(expression, None)
        .map(|_| ())
        .map_err(|e| JobError::Scheduling(e.to_string()))
}

fn spawn_fire_loop(
    inner: Weak<Inner>,
    shutdown: Arc<Notify>,
    resync_interval: Option<Duration>,
    mut fire_rx: mpsc::UnboundedReceiver<Fire>,
) -> JoinHandle<mpsc::UnboundedReceiver<Fire>> {
    let mut resync = resync_interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                fire = fire_rx.recv() => {
                    let (Some(fire), Some(inner)) = (fire, inner.upgrade()) else {
                        break;
                    };
                    tokio::spawn(async move { inner.handle_fire(fire).await });
                }
                _ = tick(&mut resync) => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    tokio::spawn(async move { inner.resync().await });
                }
            }
        }
        fire_rx
    })
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
