use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::types::JobPatch;

/// Execute the `update` command: apply the given fields to a job.
pub async fn execute(id: &str, patch: JobPatch, scheduler: &Scheduler) -> Result<()> {
    let job = scheduler.update_job(id, patch).await?;

    println!("Updated job '{}'", job.name);
    super::show::print_job(&job);
    Ok(())
}

/// Execute the `enable` / `disable` commands.
pub async fn set_enabled(id: &str, enabled: bool, scheduler: &Scheduler) -> Result<()> {
    let job = scheduler.update_job(id, JobPatch::enabled(enabled)).await?;

    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{} job '{}' ({})", verb, job.name, job.id);
    Ok(())
}
