//! Retry with exponential backoff for remote CRM calls.
//!
//! Only errors that [`CrmError::is_transient`] accepts are retried. The
//! delay before retry `n` (zero-based) is `base_delay * 2^n`, clamped to
//! `max_delay`, so the default policy waits 1 s, 2 s, 4 s, ...

use crate::error::{CrmError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before the retry that follows failed attempt `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_MAX_RETRIES)
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "{} failed, retrying",
                    label
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_transient() {
                    error!(attempt, error = %e, "{} failed after all retries", label);
                }
                return Err(e);
            }
        }
    }
}

/// A transient error for tests and fakes that need to simulate a rate limit.
pub fn rate_limited(service: &str) -> CrmError {
    CrmError::Api {
        service: service.to_string(),
        status: 429,
        message: "rate limited".to_string(),
    }
}
