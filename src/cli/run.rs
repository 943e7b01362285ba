use crate::error::Result;
use crate::runner::RunOutcome;
use crate::scheduler::Scheduler;

/// Execute the `run` command: run a job in the foreground.
pub async fn execute(id: &str, scheduler: &Scheduler) -> Result<()> {
    match scheduler.run_now(id).await? {
        RunOutcome::Skipped => {
            println!("Job {id} was not run (disabled or already running)");
        }
        RunOutcome::Completed(task) => {
            println!("Task {} finished: {}", task.id, task.status);
            if let Some(code) = task.exit_code {
                println!("Exit code: {code}");
            }
            if let Some(ms) = task.duration_ms {
                println!("Duration: {ms}ms");
            }
            if !task.output.is_empty() {
                println!("\n{}", task.output.trim_end());
            }
            if let Some(error) = &task.error {
                eprintln!("\nError: {error}");
            }
        }
    }
    Ok(())
}
