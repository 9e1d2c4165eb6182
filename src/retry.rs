use std::time::Duration;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

/// Bounded retry policy: a fixed attempt budget plus an exponential backoff
/// schedule for the waits between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay_ms: u64,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 100,
            max_delay: Duration::from_secs(10),
        }
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delays to sleep between attempts; one fewer than the attempt budget.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay_ms)
            .factor(2)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_attempts - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(5)
    }
}
