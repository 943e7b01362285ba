//! Schedule registry
//!
//! Holds one armed timer per job id. A timer is a tokio task that sleeps
//! until the job's next fire instant and then delivers a [`Fire`] message on
//! the scheduler's channel. Every arm gets a fresh generation number, so a
//! fire that was already queued when its timer got replaced can be told
//! apart from the current one.

use crate::error::{JobError, Result};
use crate::parser::next_fire_after;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A timer expiry delivered to the scheduler loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fire {
    pub job_id: String,
    pub generation: u64,
    /// The fire instant the timer was armed for
    pub scheduled_for: DateTime<Utc>,
}

struct ArmedTimer {
    expression: String,
    next_fire: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

/// In-memory set of armed timers keyed by job id
pub struct ScheduleRegistry {
    timers: HashMap<String, ArmedTimer>,
    fire_tx: mpsc::UnboundedSender<Fire>,
    generation: u64,
}

impl ScheduleRegistry {
    /// Create an empty registry delivering fires on `fire_tx`
    pub fn new(fire_tx: mpsc::UnboundedSender<Fire>) -> Self {
        Self {
            timers: HashMap::new(),
            fire_tx,
            generation: 0,
        }
    }

    /// Arm (or re-arm) a job for its next occurrence after now
    ///
    /// Any existing timer for the id is replaced. If the expression cannot be
    /// scheduled the existing timer is left untouched.
    pub fn arm(&mut self, job_id: &str, expression: &str) -> Result<DateTime<Utc>> {
        self.arm_after(job_id, expression, Utc::now())
    }

    /// Re-arm after a fire, relative to the later of now and the fired instant
    pub fn rearm_after_fire(&mut self, fire: &Fire) -> Result<DateTime<Utc>> {
        let expression = self
            .timers
            .get(&fire.job_id)
            .map(|t| t.expression.clone())
            .ok_or_else(|| JobError::NotFound(format!("timer for job {}", fire.job_id)))?;
        let reference = Utc::now().max(fire.scheduled_for);
        self.arm_after(&fire.job_id, &expression, reference)
    }

    fn arm_after(
        &mut self,
        job_id: &str,
        expression: &str,
        reference: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let next_fire = next_fire_after(expression, Some(reference))?;

        self.disarm(job_id);
        self.generation += 1;

        let fire = Fire {
            job_id: job_id.to_string(),
            generation: self.generation,
            scheduled_for: next_fire,
        };
        let handle = spawn_timer(self.fire_tx.clone(), fire);

        self.timers.insert(
            job_id.to_string(),
            ArmedTimer {
                expression: expression.to_string(),
                next_fire,
                generation: self.generation,
                handle,
            },
        );

        Ok(next_fire)
    }

    /// Cancel a job's timer; returns whether one was armed
    pub fn disarm(&mut self, job_id: &str) -> bool {
        match self.timers.remove(job_id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer; returns how many were armed
    pub fn disarm_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        count
    }

    pub fn is_armed(&self, job_id: &str) -> bool {
        self.timers.contains_key(job_id)
    }

    /// Whether a fire belongs to the timer currently armed for its job
    pub fn is_current(&self, fire: &Fire) -> bool {
        self.timers
            .get(&fire.job_id)
            .is_some_and(|t| t.generation == fire.generation)
    }

    pub fn next_fire(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.timers.get(job_id).map(|t| t.next_fire)
    }

    /// Expression the job is currently armed with
    pub fn expression(&self, job_id: &str) -> Option<&str> {
        self.timers.get(job_id).map(|t| t.expression.as_str())
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Ids of every armed job
    pub fn armed_ids(&self) -> Vec<String> {
        self.timers.keys().cloned().collect()
    }
}

impl Drop for ScheduleRegistry {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

fn spawn_timer(fire_tx: mpsc::UnboundedSender<Fire>, fire: Fire) -> JoinHandle<()> {
    tokio::spawn(async move {
        let wait = (fire.scheduled_for - Utc::now())
            .to_std()
            .unwrap_or_default();
        tokio::time::sleep(wait).await;
        // Receiver is gone once the scheduler has shut down
        let _ = fire_tx.send(fire);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};

    fn registry() -> (ScheduleRegistry, mpsc::UnboundedReceiver<Fire>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ScheduleRegistry::new(tx), rx)
    }

    #[tokio::test]
    async fn test_arm_records_next_fire() {
        let (mut registry, _rx) = registry();
        let before = Utc::now();

        let next = registry.arm("job-1", "0 0 * * *").unwrap();
        assert!(next > before);
        assert_eq!((next.hour(), next.minute()), (0, 0));
        assert!(next - before <= Duration::days(1));

        assert!(registry.is_armed("job-1"));
        assert_eq!(registry.next_fire("job-1"), Some(next));
        assert_eq!(registry.expression("job-1"), Some("0 0 * * *"));
        assert_eq!(registry.armed_count(), 1);
    }

    #[tokio::test]
    async fn test_armed_ids() {
        let (mut registry, _rx) = registry();
        registry.arm("job-1", "* * * * *").unwrap();
        registry.arm("job-2", "0 * * * *").unwrap();
        registry.disarm("job-1");

        assert_eq!(registry.armed_ids(), vec!["job-2".to_string()]);
    }

    #[tokio::test]
    async fn test_arm_rejects_bad_expression() {
        let (mut registry, _rx) = registry();
        registry.arm("job-1", "*/5 * * * *").unwrap();

        assert!(registry.arm("job-1", "bad cron").is_err());
        assert!(registry.arm("job-2", "0 0 31 4 *").is_err());

        // The previous timer survives a failed re-arm
        assert_eq!(registry.expression("job-1"), Some("*/5 * * * *"));
        assert!(!registry.is_armed("job-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_delivers_fire() {
        let (mut registry, mut rx) = registry();
        let next = registry.arm("job-1", "* * * * *").unwrap();

        let fire = rx.recv().await.unwrap();
        assert_eq!(fire.job_id, "job-1");
        assert_eq!(fire.scheduled_for, next);
        assert!(registry.is_current(&fire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_timer() {
        let (mut registry, mut rx) = registry();
        registry.arm("job-1", "* * * * *").unwrap();
        registry.arm("job-1", "* * * * *").unwrap();
        assert_eq!(registry.armed_count(), 1);

        let fire = rx.recv().await.unwrap();
        assert!(registry.is_current(&fire));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let (mut registry, mut rx) = registry();
        registry.arm("job-1", "* * * * *").unwrap();

        assert!(registry.disarm("job-1"));
        assert!(!registry.disarm("job-1"));
        assert!(!registry.is_armed("job-1"));

        let waited = tokio::time::timeout(std::time::Duration::from_secs(180), rx.recv()).await;
        assert!(waited.is_err(), "disarmed timer must not fire");
    }

    #[tokio::test]
    async fn test_rearm_after_early_fire_moves_forward() {
        let (mut registry, _rx) = registry();
        let first = registry.arm("job-1", "* * * * *").unwrap();
        let generation = registry.timers["job-1"].generation;

        // A wakeup that arrives before the scheduled instant
        let fire = Fire {
            job_id: "job-1".into(),
            generation,
            scheduled_for: first,
        };
        let second = registry.rearm_after_fire(&fire).unwrap();
        assert_eq!(second, first + Duration::minutes(1));
        assert!(!registry.is_current(&fire));
    }

    #[tokio::test]
    async fn test_stale_fire_is_not_current() {
        let (mut registry, _rx) = registry();
        registry.arm("job-1", "* * * * *").unwrap();
        let stale = Fire {
            job_id: "job-1".into(),
            generation: 0,
            scheduled_for: Utc::now(),
        };
        assert!(!registry.is_current(&stale));
        assert!(registry.rearm_after_fire(&Fire {
            job_id: "missing".into(),
            ..stale
        })
        .is_err());
    }

    #[tokio::test]
    async fn test_disarm_all() {
        let (mut registry, _rx) = registry();
        registry.arm("a", "* * * * *").unwrap();
        registry.arm("b", "0 * * * *").unwrap();
        assert_eq!(registry.disarm_all(), 2);
        assert_eq!(registry.armed_count(), 0);
    }
}
