//! Delivery worker tuning.

use crate::error::{OutboxError, OutboxResult};
use std::time::Duration;

/// Outreach outbox configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutreachConfig {
    /// Bound of the in-memory queue; admissions beyond it are dropped.
    pub queue_capacity: usize,
    /// How long one dequeue waits before re-checking the stop signal.
    pub dequeue_timeout: Duration,
    /// Global floor between two sends, across all conversations.
    pub min_send_interval: Duration,
    /// Send attempts per job, first one included.
    pub max_attempts: u32,
    /// Sleep after failed attempt N is `backoff_schedule[N - 1]`; the last
    /// value repeats if the schedule is shorter than `max_attempts`.
    pub backoff_schedule: Vec<Duration>,
    /// Wait before asking again when settings or activation cannot be read.
    /// Does not consume an attempt.
    pub recheck_delay: Duration,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            dequeue_timeout: Duration::from_secs(1),
            min_send_interval: Duration::from_secs(1),
            max_attempts: 3,
            backoff_schedule: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(120),
            ],
            recheck_delay: Duration::from_secs(10),
        }
    }
}

impl OutreachConfig {
    pub fn validate(&self) -> OutboxResult<()> {
        if self.queue_capacity == 0 {
            return Err(OutboxError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(OutboxError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_attempts > 1 && self.backoff_schedule.is_empty() {
            return Err(OutboxError::InvalidConfig(
                "backoff_schedule is empty but retries are enabled".to_string(),
            ));
        }
        if self.dequeue_timeout.is_zero() {
            return Err(OutboxError::InvalidConfig(
                "dequeue_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff slept after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_schedule
            .get(index)
            .or_else(|| self.backoff_schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}
