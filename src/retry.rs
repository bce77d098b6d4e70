//! Retry-with-exponential-backoff for external model calls.
//!
//! Every attempt runs under a request-level timeout. A timed-out attempt
//! surfaces [`Error::Timeout`] and is not retried; only errors for which
//! [`Error::is_retryable`] holds are attempted again.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// No backoff delay; used by tests and by callers that rate-limit elsewhere.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

/// Run `op` under `policy`, labelling log lines and timeout errors with `service`.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, service: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                service,
                seconds: policy.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(service, attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                debug!(service, attempt, error = %err, "giving up");
                return Err(err);
            }
        }
    }
}
