//! Bounded exponential backoff driven by error classification.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{AppError, ErrorKind};
use crate::runtime::Runtime;

/// When and how long to wait before another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub retry_validation: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: config.initial_delay,
            retry_validation: config.retry_validation,
        }
    }

    /// Whether `error` deserves another attempt after `retries_done` retries.
    pub fn should_retry(&self, error: &AppError, retries_done: u32) -> bool {
        if retries_done >= self.max_retries || !error.retryable {
            return false;
        }
        self.retry_validation || error.kind != ErrorKind::Validation
    }

    /// Delay before retry number `retries_done + 1`: `initial_delay * 2^retries_done`.
    pub fn delay(&self, retries_done: u32) -> Duration {
        2u32.checked_pow(retries_done)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

/// Runs `operation` until it succeeds, the policy gives up, or the error is
/// not retryable. Delays go through `runtime` so they can be observed.
pub async fn with_backoff<R, F, Fut, T>(
    runtime: &R,
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, AppError>
where
    R: Runtime + ?Sized,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut retries_done = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !policy.should_retry(&e, retries_done) {
                    debug!(
                        "{}: giving up after {} attempt(s): {}",
                        operation_name,
                        retries_done.saturating_add(1),
                        e
                    );
                    return Err(e);
                }

                let delay = policy.delay(retries_done);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                    operation_name,
                    retries_done.saturating_add(1),
                    policy.max_retries.saturating_add(1),
                    e,
                    delay.as_millis()
                );
                runtime.sleep(delay).await;
                retries_done += 1;
            }
        }
    }
}
