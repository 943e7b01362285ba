use crate::error::Result;
use crate::scheduler::Scheduler;

/// Execute the `tasks` command: display a job's execution history.
pub async fn execute(id: &str, scheduler: &Scheduler) -> Result<()> {
    let tasks = scheduler.list_tasks(id).await?;

    if tasks.is_empty() {
        println!("No tasks recorded for job {id}.");
        return Ok(());
    }

    println!("{:<26} {:<10} {:<20} {:<10} EXIT", "ID", "STATUS", "STARTED", "DURATION");
    for task in &tasks {
        let duration = task
            .duration_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        let exit = task
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<10} {:<20} {:<10} {}",
            task.id,
            task.status.to_string(),
            task.started_at.format("%Y-%m-%d %H:%M:%S"),
            duration,
            exit,
        );
    }

    println!("\n{} task(s)", tasks.len());
    Ok(())
}
