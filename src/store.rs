//! Document store for jobs and task history
//!
//! Provides pluggable storage backends behind the [`JobStore`] trait.
//! Updates are find-and-modify operations returning the updated document,
//! or `None` when the job does not exist.

use crate::error::{JobError, Result};
use crate::query::JobQuery;
use crate::types::{Job, JobPatch, Task};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Job storage trait
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job; fails if the id is taken
    async fn insert_job(&self, job: &Job) -> Result<()>;

    /// Find jobs matching a query
    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<Job>>;

    /// Load a job by ID
    async fn find_job(&self, id: &str) -> Result<Option<Job>>;

    /// Apply a patch to an existing job and return the updated document
    async fn update_job(
        &self,
        id: &str,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>>;

    /// Delete a job and its task history; returns the deleted count
    async fn delete_job(&self, id: &str) -> Result<u64>;

    /// Insert or replace a task record
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Task history for a job, most recent first
    async fn find_tasks(&self, job_id: &str, limit: usize) -> Result<Vec<Task>>;

    /// Delete all tasks for a job
    async fn delete_tasks(&self, job_id: &str) -> Result<u64>;
}

// ============================================================================
// File-based Store
// ============================================================================

/// File-based job store
///
/// Stores jobs and tasks as JSON files:
/// ```text
/// <data_dir>/
///   jobs.json           # All job definitions
///   history/
///     {job-id}/
///       {task-id}.json  # Task records
/// ```
pub struct FileJobStore {
    /// Jobs file path
    jobs_file: PathBuf,
    /// History directory path
    history_dir: PathBuf,
    /// Serializes read-modify-write cycles on the jobs file
    write_lock: Mutex<()>,
}

impl FileJobStore {
    /// Create a new file-based store rooted at `data_dir`
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let base_dir = data_dir.as_ref().to_path_buf();
        let jobs_file = base_dir.join("jobs.json");
        let history_dir = base_dir.join("history");

        fs::create_dir_all(&base_dir).await?;
        fs::create_dir_all(&history_dir).await?;

        if !jobs_file.exists() {
            let empty: Vec<Job> = Vec::new();
            fs::write(&jobs_file, serde_json::to_string_pretty(&empty)?).await?;
        }

        Ok(Self {
            jobs_file,
            history_dir,
            write_lock: Mutex::new(()),
        })
    }

    async fn load_all_jobs(&self) -> Result<Vec<Job>> {
        let content = fs::read_to_string(&self.jobs_file).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_all_jobs(&self, jobs: &[Job]) -> Result<()> {
        let json = serde_json::to_string_pretty(jobs)?;
        write_atomic(&self.jobs_file, json.as_bytes()).await
    }

    fn job_history_dir(&self, job_id: &str) -> PathBuf {
        let safe_id = job_id.replace(['/', '\\'], "_").replace("..", "_");
        self.history_dir.join(safe_id)
    }
}

/// Write via temp file + rename so readers never see a partial document
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.load_all_jobs().await?;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(JobError::Storage(format!("Duplicate job id: {}", job.id)));
        }
        jobs.push(job.clone());
        self.save_all_jobs(&jobs).await
    }

    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<Job>> {
        Ok(query.apply(self.load_all_jobs().await?))
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        let jobs = self.load_all_jobs().await?;
        Ok(jobs.into_iter().find(|j| j.id == id))
    }

    async fn update_job(
        &self,
        id: &str,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.load_all_jobs().await?;
        let updated = match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.apply(patch, now);
                job.clone()
            }
            None => return Ok(None),
        };
        self.save_all_jobs(&jobs).await?;
        Ok(Some(updated))
    }

    async fn delete_job(&self, id: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.load_all_jobs().await?;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let deleted = (before - jobs.len()) as u64;

        if deleted > 0 {
            self.save_all_jobs(&jobs).await?;
            self.delete_tasks(id).await?;
        }

        Ok(deleted)
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let job_dir = self.job_history_dir(&task.job_id);
        fs::create_dir_all(&job_dir).await?;

        let path = job_dir.join(format!("{}.json", task.id));
        let json = serde_json::to_string_pretty(task)?;
        write_atomic(&path, json.as_bytes()).await
    }

    async fn find_tasks(&self, job_id: &str, limit: usize) -> Result<Vec<Task>> {
        let job_dir = self.job_history_dir(job_id);

        if !job_dir.exists() {
            return Ok(Vec::new());
        }

        let mut tasks = Vec::new();
        let mut entries = fs::read_dir(&job_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path).await?;
                match serde_json::from_str::<Task>(&content) {
                    Ok(task) => tasks.push(task),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable task record");
                    }
                }
            }
        }

        tasks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        tasks.truncate(limit);

        Ok(tasks)
    }

    async fn delete_tasks(&self, job_id: &str) -> Result<u64> {
        let job_dir = self.job_history_dir(job_id);

        if !job_dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = fs::read_dir(&job_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        fs::remove_dir_all(&job_dir).await?;

        Ok(count)
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory job store for tests and embedding
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
    tasks: RwLock<HashMap<String, Vec<Task>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(JobError::Storage(format!("Duplicate job id: {}", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(query.apply(jobs.values().cloned()))
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(id).cloned())
    }

    async fn update_job(
        &self,
        id: &str,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs.get_mut(id).map(|job| {
            job.apply(patch, now);
            job.clone()
        }))
    }

    async fn delete_job(&self, id: &str) -> Result<u64> {
        let removed = self.jobs.write().await.remove(id);
        if removed.is_none() {
            return Ok(0);
        }
        self.tasks.write().await.remove(id);
        Ok(1)
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let history = tasks.entry(task.job_id.clone()).or_default();
        match history.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => history.push(task.clone()),
        }
        Ok(())
    }

    async fn find_tasks(&self, job_id: &str, limit: usize) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut result = tasks.get(job_id).cloned().unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn delete_tasks(&self, job_id: &str) -> Result<u64> {
        let removed = self.tasks.write().await.remove(job_id);
        Ok(removed.map_or(0, |tasks| tasks.len() as u64))
    }
}
