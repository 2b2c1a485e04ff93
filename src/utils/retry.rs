// tablevault/src/utils/retry.rs
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::warn;

use crate::errors::{DbToolError, Result};

/// Decides how often and how long a failing operation is re-attempted.
///
/// A policy may bound the number of attempts, the total time spent, both,
/// or neither. A policy with neither bound retries until the operation
/// succeeds or the process is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    max_elapsed: Option<Duration>,
    delay: Duration,
}

impl RetryPolicy {
    pub const fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            delay,
        }
    }

    /// `max_attempts` counts the first attempt; values below 1 are treated as 1.
    pub const fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(if max_attempts == 0 { 1 } else { max_attempts }),
            max_elapsed: None,
            delay,
        }
    }

    /// Waits for the database to come back, for at most ten minutes.
    pub fn connection_default() -> Self {
        Self::unbounded(Duration::from_secs(2)).with_max_elapsed(Duration::from_secs(600))
    }

    /// Three attempts, five seconds apart.
    pub fn restore_default() -> Self {
        Self::bounded(3, Duration::from_secs(5))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_max_elapsed(mut self, limit: Duration) -> Self {
        self.max_elapsed = Some(limit);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_elapsed.is_none()
    }

    fn allows_another(&self, attempts_made: u32, waited: Duration) -> bool {
        if let Some(max) = self.max_attempts {
            if attempts_made >= max {
                return false;
            }
        }
        if let Some(limit) = self.max_elapsed {
            if waited + self.delay > limit {
                return false;
            }
        }
        true
    }

    /// Runs `op` until it succeeds or the policy is exhausted.
    ///
    /// `op` receives the 1-based attempt number. The first attempt starts
    /// immediately; every later attempt is preceded by the policy delay.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.allows_another(attempt, started.elapsed()) {
                        return Err(DbToolError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    warn!(
                        operation = label,
                        attempt,
                        retry_in_secs = self.delay.as_secs_f64(),
                        "{}",
                        err
                    );
                    sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
