use chrono::Utc;

use crate::error::{JobError, Result};
use crate::parser::CronExpression;

/// Execute the `next` command: print upcoming fire times.
pub fn execute(expression: &str, count: usize) -> Result<()> {
    let expr = CronExpression::parse(expression)?;
    let upcoming = expr.upcoming(Utc::now(), count.max(1));
    if upcoming.is_empty() {
        return Err(JobError::InvalidExpression(format!(
            "'{}' never fires",
            expression
        )));
    }

    println!("{} ({})", expr, expr.describe());
    for at in upcoming {
        println!("  {}", at.format("%Y-%m-%d %H:%M %a UTC"));
    }
    Ok(())
}
