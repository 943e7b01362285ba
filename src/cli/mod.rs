pub mod add;
pub mod list;
pub mod next;
pub mod remove;
pub mod run;
pub mod serve;
pub mod show;
pub mod tasks;
pub mod update;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chartjobs - cron job scheduler for report generation
#[derive(Debug, Parser)]
#[command(name = "chartjobs", version, about)]
pub struct Cli {
    /// Config file (default: $CHARTJOBS_HOME/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Serve,

    /// Create a job
    Add {
        /// Display name
        name: String,

        /// Five-field cron expression (e.g. "0 0 * * *")
        expression: String,

        /// Shell command to run
        command: String,

        /// Create the job disabled
        #[arg(long)]
        disabled: bool,

        /// Kill the command after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List jobs
    List {
        /// Free-text filter over name and command
        #[arg(long)]
        q: Option<String>,

        /// Sort field: createdAt, updatedAt or name
        #[arg(long)]
        sort: Option<String>,

        /// Sort order: asc or desc
        #[arg(long)]
        order: Option<String>,

        /// Maximum number of jobs
        #[arg(long)]
        limit: Option<usize>,

        /// 1-based position of the first job
        #[arg(long)]
        start: Option<usize>,
    },

    /// Show a job
    Show {
        /// Job id
        id: String,
    },

    /// Change fields of a job
    Update {
        /// Job id
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        expression: Option<String>,

        #[arg(long)]
        command: Option<String>,

        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Enable a job
    Enable {
        /// Job id
        id: String,
    },

    /// Disable a job
    Disable {
        /// Job id
        id: String,
    },

    /// Delete a job and its history
    Remove {
        /// Job id
        id: String,
    },

    /// Run a job now and wait for it
    Run {
        /// Job id
        id: String,
    },

    /// Show a job's task history
    Tasks {
        /// Job id
        id: String,
    },

    /// Print upcoming fire times of an expression
    Next {
        /// Five-field cron expression
        expression: String,

        /// Number of fire times
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}
