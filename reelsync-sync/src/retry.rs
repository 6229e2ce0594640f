//! Bounded exponential backoff with jitter.
//!
//! ```text
//! ATTEMPT --ok--------------------------------> DONE
//! ATTEMPT --err, retryable, attempt < max----> WAIT --> ATTEMPT
//! ATTEMPT --err, retryable, attempt == max---> FAILED (SyncError::Operation)
//! ATTEMPT --err, not retryable---------------> returned as-is
//! WAIT    --sleep strategy errs--------------> returned as-is
//! ```
//!
//! The loop is sequential and blocking. Waiting goes through an injected
//! [`Sleep`] strategy: tests record delays instead of sleeping, and callers
//! can cancel a pending retry by returning an error from `sleep`.

use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Sleep strategy
// ---------------------------------------------------------------------------

/// How the executor waits between attempts.
pub trait Sleep {
    fn sleep(&self, delay: Duration) -> Result<(), SyncError>;
}

/// Blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, delay: Duration) -> Result<(), SyncError> {
        std::thread::sleep(delay);
        Ok(())
    }
}

impl<F> Sleep for F
where
    F: Fn(Duration) -> Result<(), SyncError>,
{
    fn sleep(&self, delay: Duration) -> Result<(), SyncError> {
        self(delay)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs fallible operations under a [`RetryPolicy`].
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Box<dyn Sleep + Send + Sync>,
}

impl RetryExecutor {
    /// Executor that really sleeps between attempts.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Box::new(ThreadSleep),
        }
    }

    /// Replace the sleep strategy.
    pub fn with_sleep(mut self, sleeper: impl Sleep + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wait after the `attempt`-th failure: backoff plus `uniform(0, jitter)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.policy.backoff(attempt);
        if self.policy.jitter.is_zero() {
            return backoff;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.policy.jitter.as_secs_f64());
        backoff + Duration::from_secs_f64(extra)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `operation` names the call in logs and in
    /// the resulting [`SyncError::Operation`].
    pub fn execute<T, F>(&self, operation: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Result<T, SyncError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("retry.recovered operation={operation} attempts={attempt}");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::error!(
                    "retry.exhausted operation={operation} attempts={attempt} error={err}"
                );
                return Err(SyncError::Operation {
                    operation: operation.to_owned(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                "retry operation={operation} attempts={attempt} delay_ms={} error={err}",
                delay.as_millis()
            );
            self.sleeper.sleep(delay)?;
        }
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
