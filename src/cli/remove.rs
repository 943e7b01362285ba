use crate::error::Result;
use crate::scheduler::Scheduler;

/// Execute the `remove` command: delete a job and its history.
pub async fn execute(id: &str, scheduler: &Scheduler) -> Result<()> {
    let job = scheduler.get_job(id).await?;
    scheduler.delete_job(id).await?;

    println!("Deleted job '{}' ({})", job.name, job.id);
    Ok(())
}
