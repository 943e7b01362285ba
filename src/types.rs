//! Core records: jobs, tasks and their closed status sets

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Maximum bytes of captured output kept on a task
pub const MAX_OUTPUT_LEN: usize = 10_000;

/// Generate a 24-character hex identifier
///
/// Layout mirrors a document-store object id: 4 bytes of unix seconds
/// followed by 8 random bytes.
pub fn new_object_id() -> String {
    let secs = Utc::now().timestamp().max(0) as u32;
    let random = Uuid::new_v4().simple().to_string();
    format!("{:08x}{}", secs, &random[..16])
}

/// Last observed outcome of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Never executed
    #[default]
    Unknown,
    /// An execution is in flight
    Running,
    Success,
    Failure,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Unknown => write!(f, "unknown"),
            JobState::Running => write!(f, "running"),
            JobState::Success => write!(f, "success"),
            JobState::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(JobState::Unknown),
            "running" => Ok(JobState::Running),
            "success" => Ok(JobState::Success),
            "failure" => Ok(JobState::Failure),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

/// A scheduled job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// 24-hex identifier
    #[serde(rename = "_id")]
    pub id: String,

    /// Human-readable job name
    pub name: String,

    /// Cron expression (5 fields: min hour day month weekday)
    pub expression: String,

    /// Command to execute
    pub command: String,

    /// Whether the job is scheduled
    pub enabled: bool,

    /// Outcome of the most recent execution
    #[serde(default)]
    pub last_state: JobState,

    /// Per-job execution limit in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Start of the most recent execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create an enabled job stamped with the current time
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_object_id(),
            name: name.into(),
            expression: expression.into(),
            command: command.into(),
            enabled: true,
            last_state: JobState::Unknown,
            timeout_ms: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-job timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Apply a patch and refresh `updated_at`
    pub fn apply(&mut self, patch: &JobPatch, now: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(expression) = &patch.expression {
            self.expression = expression.clone();
        }
        if let Some(command) = &patch.command {
            self.command = command.clone();
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(state) = patch.last_state {
            self.last_state = state;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            self.timeout_ms = Some(timeout_ms);
        }
        if let Some(last_run_at) = patch.last_run_at {
            self.last_run_at = Some(last_run_at);
        }
        self.touch(now);
    }

    /// Advance `updated_at`, keeping it strictly increasing
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = now.max(floor);
    }
}

/// Input for job creation
///
/// Every field is optional so that missing ones can be reported together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub name: Option<String>,
    pub expression: Option<String>,
    pub command: Option<String>,
    pub enabled: Option<bool>,
    pub timeout_ms: Option<u64>,
}

impl NewJob {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            expression: Some(expression.into()),
            command: Some(command.into()),
            enabled: None,
            timeout_ms: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// Partial update of a job; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<JobState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn expression(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Default::default()
        }
    }

    pub fn last_state(state: JobState) -> Self {
        Self {
            last_state: Some(state),
            ..Default::default()
        }
    }

    /// Whether applying this patch can change the job's timer
    pub fn touches_schedule(&self) -> bool {
        self.expression.is_some() || self.enabled.is_some()
    }
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, command not yet started
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failure" => Ok(TaskStatus::Failure),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Record of one execution attempt of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,

    /// Owning job
    pub job_id: String,

    pub status: TaskStatus,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Captured standard output (truncated if too long)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a pending task for a job
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            id: new_object_id(),
            job_id: job_id.into(),
            status: TaskStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            exit_code: None,
            output: String::new(),
            error: None,
        }
    }

    /// pending → running
    pub fn start(mut self) -> Self {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
        }
        self
    }

    /// Record a finished process; exit code zero is a success
    pub fn complete(mut self, exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        if self.status.is_terminal() {
            return self;
        }
        self.finish();
        self.exit_code = exit_code;
        self.output = truncate_output(stdout, MAX_OUTPUT_LEN);
        if exit_code == Some(0) {
            self.status = TaskStatus::Success;
        } else {
            self.status = TaskStatus::Failure;
            let detail = match exit_code {
                Some(code) => format!("Command exited with status {}", code),
                None => "Command terminated by signal".to_string(),
            };
            self.error = Some(if stderr.trim().is_empty() {
                detail
            } else {
                format!("{}: {}", detail, truncate_output(stderr, MAX_OUTPUT_LEN))
            });
        }
        self
    }

    /// Record a failure that produced no exit status
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        if self.status.is_terminal() {
            return self;
        }
        self.finish();
        self.status = TaskStatus::Failure;
        self.error = Some(error.into());
        self
    }

    /// Record that the command exceeded its limit
    pub fn timeout(self, limit_ms: u64) -> Self {
        self.fail(format!("Execution timed out after {}ms", limit_ms))
    }

    fn finish(&mut self) {
        let finished_at = Utc::now().max(self.started_at);
        self.finished_at = Some(finished_at);
        self.duration_ms = Some((finished_at - self.started_at).num_milliseconds().max(0) as u64);
    }
}

/// Result of a delete operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Truncate output to a maximum length on a char boundary
fn truncate_output(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end])
}
