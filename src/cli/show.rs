use crate::error::Result;
use crate::parser::CronExpression;
use crate::scheduler::Scheduler;
use crate::types::Job;

/// Execute the `show` command: display a job in detail.
pub async fn execute(id: &str, scheduler: &Scheduler) -> Result<()> {
    let job = scheduler.get_job(id).await?;
    print_job(&job);
    Ok(())
}

pub(crate) fn print_job(job: &Job) {
    println!("Job: {}", job.id);
    println!("Name: {}", job.name);
    match CronExpression::parse(&job.expression) {
        Ok(expr) => println!("Schedule: {} ({})", job.expression, expr.describe()),
        Err(_) => println!("Schedule: {}", job.expression),
    }
    println!("Command: {}", job.command);
    println!("Enabled: {}", job.enabled);
    println!("Last state: {}", job.last_state);
    if let Some(timeout_ms) = job.timeout_ms {
        println!("Timeout: {timeout_ms}ms");
    }
    if let Some(last_run_at) = job.last_run_at {
        println!("Last run: {}", last_run_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if job.enabled {
        if let Ok(next) = crate::parser::next_fire_after(&job.expression, None) {
            println!("Next run: {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    println!("Created: {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Updated: {}", job.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
}
