//! Job store adapter
//!
//! Translates between the upward job operations and the document store:
//! identifiers are validated before any store access, required fields are
//! checked on create, and absent documents become `NotFound`. State written
//! by the runner goes through [`JobRepository::record_state`], which drops
//! writes for jobs that no longer exist instead of failing.

use crate::error::{JobError, Result};
use crate::query::{JobQuery, ListParams};
use crate::store::JobStore;
use crate::types::{DeleteResult, Job, JobPatch, NewJob, Task};
use crate::validate::{is_object_id, FieldErrors};
use chrono::Utc;
use std::sync::Arc;

/// Resource name reported in field errors
pub const RESOURCE: &str = "job";

/// Default number of tasks returned by [`JobRepository::list_tasks`]
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Validated access to persisted jobs and tasks
#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn JobStore>,
    history_limit: usize,
}

impl JobRepository {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Set how many tasks `list_tasks` returns
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Check required fields and build the job document without storing it
    pub fn prepare(&self, data: NewJob) -> Result<Job> {
        let mut errors = FieldErrors::new(RESOURCE);
        errors.require("name", data.name.as_deref());
        errors.require("expression", data.expression.as_deref());
        errors.require("command", data.command.as_deref());
        if !errors.is_empty() {
            return Err(JobError::Validation(errors.into_vec()));
        }

        let mut job = Job::new(
            data.name.unwrap_or_default(),
            data.expression.unwrap_or_default().trim(),
            data.command.unwrap_or_default(),
        )
        .with_enabled(data.enabled.unwrap_or(true));
        job.timeout_ms = data.timeout_ms;
        Ok(job)
    }

    /// Persist a prepared job
    pub async fn insert(&self, job: &Job) -> Result<()> {
        self.store.insert_job(job).await
    }

    /// Validate and persist in one step
    pub async fn create(&self, data: NewJob) -> Result<Job> {
        let job = self.prepare(data)?;
        self.insert(&job).await?;
        Ok(job)
    }

    pub async fn list(&self, params: &ListParams) -> Result<Vec<Job>> {
        self.store
            .find_jobs(&JobQuery::from_params(params.clone()))
            .await
    }

    pub async fn list_enabled(&self) -> Result<Vec<Job>> {
        self.store.find_jobs(&JobQuery::enabled()).await
    }

    /// Get a job, rejecting malformed ids and absent documents
    pub async fn get(&self, id: &str) -> Result<Job> {
        check_id(id)?;
        self.store
            .find_job(id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("job {}", id)))
    }

    /// Lookup without validation; `None` when absent
    pub async fn find(&self, id: &str) -> Result<Option<Job>> {
        self.store.find_job(id).await
    }

    /// Reject malformed ids and blank replacement values
    pub fn validate_patch(&self, id: &str, patch: &JobPatch) -> Result<()> {
        check_id(id)?;
        let mut errors = FieldErrors::new(RESOURCE);
        errors.non_blank_if_present("name", patch.name.as_deref());
        errors.non_blank_if_present("expression", patch.expression.as_deref());
        errors.non_blank_if_present("command", patch.command.as_deref());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(JobError::Validation(errors.into_vec()))
        }
    }

    /// Apply a patch, refreshing `updatedAt`
    pub async fn update(&self, id: &str, patch: &JobPatch) -> Result<Job> {
        self.validate_patch(id, patch)?;
        self.store
            .update_job(id, patch, Utc::now())
            .await?
            .ok_or_else(|| JobError::NotFound(format!("job {}", id)))
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteResult> {
        check_id(id)?;
        let deleted_count = self.store.delete_job(id).await?;
        if deleted_count == 0 {
            return Err(JobError::NotFound(format!("job {}", id)));
        }
        Ok(DeleteResult { deleted_count })
    }

    /// Conditional write used by the runner
    ///
    /// Returns `Ok(None)` when the job has been deleted in the meantime.
    pub async fn record_state(&self, id: &str, patch: &JobPatch) -> Result<Option<Job>> {
        let updated = self.store.update_job(id, patch, Utc::now()).await?;
        if updated.is_none() {
            tracing::debug!(job_id = %id, "Dropped state write for missing job");
        }
        Ok(updated)
    }

    pub async fn save_task(&self, task: &Task) -> Result<()> {
        self.store.save_task(task).await
    }

    /// Task history for a job, most recent first
    pub async fn list_tasks(&self, job_id: &str) -> Result<Vec<Task>> {
        check_id(job_id)?;
        self.store.find_tasks(job_id, self.history_limit).await
    }
}

fn check_id(id: &str) -> Result<()> {
    if is_object_id(id) {
        Ok(())
    } else {
        Err(JobError::invalid_field(RESOURCE, "_id"))
    }
}
