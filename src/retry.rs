//! Cancellable retry loop
//!
//! Runs an async operation again and again until a condition is met or a
//! cancellation token fires. The supervisor builds its refresh scheduling
//! from two nested loops:
//!
//! ```text
//! retry(forever, delay = entry_timeout)        refresh before the lease runs out
//!   └─ retry(until success, delay = retry_delay)   open until it works
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// When and how often an operation is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wait between two attempts
    pub delay: Duration,

    /// Give up after this many attempts (None = unlimited)
    pub max_attempts: Option<u32>,

    /// Keep going after a successful attempt
    pub ignore_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(10),
            max_attempts: None,
            ignore_errors: false,
        }
    }
}

impl RetryPolicy {
    /// Retry failed attempts every `delay` until one succeeds
    pub fn until_success(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Run every `delay` until cancelled, whatever the outcome
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            ignore_errors: true,
            ..Default::default()
        }
    }

    /// Set the delay between attempts
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Limit the number of attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Keep going after successful attempts
    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    /// Run `op` according to this policy.
    ///
    /// Returns `Ok` after the first success (unless errors are ignored), the
    /// last result once the attempts are exhausted, or `Error::Cancelled`
    /// when `token` fires.
    pub async fn run<F, Fut>(&self, token: &CancellationToken, mut op: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut attempts: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let result = op().await;
            attempts = attempts.saturating_add(1);

            if result.is_ok() && !self.ignore_errors {
                return result;
            }
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                return result;
            }

            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}
