//! Shared bounded-retry policy.
//!
//! One policy type covers the reconciliation poller, the materializer's
//! store-retry path and receipt email dispatch, instead of ad hoc sleep
//! loops at each call site. Budgets are hard upper bounds: `max_attempts`
//! attempts total, exponential backoff capped at `max_delay`.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy (multiplier of 1).
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        (current * self.multiplier).min(self.max_delay)
    }

    /// Runs `op`, retrying on `Err` until it succeeds or the attempt budget
    /// is exhausted. The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut delay = self.initial_delay;
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    debug!(attempt, error = %err, "operation failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("retry loop returns within the attempt budget")
    }

    /// Polls `op` until it yields `Ok(Some(_))` or the budget is exhausted.
    ///
    /// Exhaustion returns `Ok(None)` — "not yet available", which callers
    /// must keep distinct from "does not exist". Errors propagate
    /// immediately.
    pub async fn poll<T, E, F, Fut>(&self, mut op: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut delay = self.initial_delay;
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            if let Some(value) = op().await? {
                return Ok(Some(value));
            }
            if attempt < attempts {
                debug!(attempt, "poll target not yet available, retrying");
                tokio::time::sleep(delay).await;
                delay = self.next_delay(delay);
            }
        }
        Ok(None)
    }
}
