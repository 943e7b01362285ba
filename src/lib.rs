//! # chartjobs
//!
//! Cron-driven job scheduling and execution for the chart/report backend.
//!
//! ## Overview
//!
//! A job pairs a five-field cron expression with a shell command. While the
//! scheduler runs, every enabled job holds one armed timer; when it fires the
//! job is re-armed for its next occurrence and its command runs in the
//! background. Each run is recorded as a task, and the job's `lastState`
//! follows the outcome.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chartjobs::{JobRepository, MemoryJobStore, NewJob, Scheduler, SchedulerOptions, ShellExecutor};
//!
//! # async fn example() -> chartjobs::Result<()> {
//! let repository = JobRepository::new(Arc::new(MemoryJobStore::new()));
//! let scheduler = Scheduler::new(
//!     repository,
//!     Arc::new(ShellExecutor::new()),
//!     SchedulerOptions::default(),
//! );
//! scheduler.start().await?;
//!
//! let job = scheduler
//!     .create_job(NewJob::new("Extract data", "0 0 * * *", "./extract.sh"))
//!     .await?;
//! println!("Next run: {:?}", scheduler.next_fire(&job.id).await);
//!
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **CronExpression** — parses expressions and computes fire instants
//! - **JobStore** trait — document storage (in-memory or JSON files)
//! - **JobRepository** — validated job/task access on top of a store
//! - **ScheduleRegistry** — one armed timer per enabled job
//! - **ExecutionRunner** — single-flight command execution and task records
//! - **Scheduler** — owns the above and serializes work per job

pub mod cli;
pub mod config;
pub mod dirs;
pub mod error;
pub mod executor;
pub mod parser;
pub mod query;
pub mod registry;
pub mod repository;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod validate;

// Re-export core types
pub use config::SchedulerConfig;
pub use error::{FieldError, FieldErrorCode, JobError, Result};
pub use executor::{CommandExecutor, CommandOutput, ShellExecutor};
pub use parser::{next_fire_after, CronExpression};
pub use query::{JobQuery, ListParams, SortField, SortOrder};
pub use registry::{Fire, ScheduleRegistry};
pub use repository::JobRepository;
pub use runner::{ExecutionGuard, ExecutionRunner, RunOutcome};
pub use scheduler::{Scheduler, SchedulerEvent, SchedulerOptions};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use types::{DeleteResult, Job, JobPatch, JobState, NewJob, Task, TaskStatus};
