use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::types::NewJob;

/// Execute the `add` command: create a job.
pub async fn execute(
    name: &str,
    expression: &str,
    command: &str,
    disabled: bool,
    timeout_ms: Option<u64>,
    scheduler: &Scheduler,
) -> Result<()> {
    let data = NewJob {
        timeout_ms,
        ..NewJob::new(name, expression, command).enabled(!disabled)
    };
    let job = scheduler.create_job(data).await?;

    println!("Created job '{}'", job.name);
    super::show::print_job(&job);
    Ok(())
}
