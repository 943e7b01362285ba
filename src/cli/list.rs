use crate::error::Result;
use crate::query::ListParams;
use crate::scheduler::Scheduler;

/// Query options accepted by `list`
#[derive(Debug, Default)]
pub struct ListArgs {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub start: Option<usize>,
}

impl ListArgs {
    fn params(&self) -> ListParams {
        let mut pairs = Vec::new();
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(order) = &self.order {
            pairs.push(("order", order.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(start) = self.start {
            pairs.push(("start", start.to_string()));
        }
        ListParams::from_pairs(pairs)
    }
}

/// Execute the `list` command: display jobs.
pub async fn execute(args: &ListArgs, scheduler: &Scheduler) -> Result<()> {
    let jobs = scheduler.list_jobs(&args.params()).await?;

    if jobs.is_empty() {
        println!("No jobs found.");
        println!("Use `chartjobs add <name> <expression> <command>` to create one.");
        return Ok(());
    }

    println!(
        "{:<26} {:<24} {:<16} {:<8} STATE",
        "ID", "NAME", "SCHEDULE", "ENABLED"
    );
    for job in &jobs {
        println!(
            "{:<26} {:<24} {:<16} {:<8} {}",
            job.id, job.name, job.expression, job.enabled, job.last_state,
        );
    }

    println!("\n{} job(s)", jobs.len());
    Ok(())
}
