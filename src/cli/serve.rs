use tokio::sync::broadcast;

use crate::error::Result;
use crate::scheduler::{Scheduler, SchedulerEvent};

/// Execute the `serve` command: run the scheduler until Ctrl+C.
pub async fn execute(scheduler: &Scheduler) -> Result<()> {
    let mut events = scheduler.subscribe();
    scheduler.start().await?;

    println!(
        "chartjobs scheduler running with {} armed job(s)",
        scheduler.armed_count().await
    );
    println!("Press Ctrl+C to stop");

    let log_events = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                SchedulerEvent::TaskFailed { job_id, task_id, error } => {
                    eprintln!("[{job_id}] task {task_id} failed: {error}");
                }
                SchedulerEvent::TaskSucceeded { job_id, task_id } => {
                    println!("[{job_id}] task {task_id} succeeded");
                }
                SchedulerEvent::Stopped => break,
                _ => {}
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    scheduler.stop().await;
    let _ = log_events.await;
    Ok(())
}
