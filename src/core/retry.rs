//! Retry logic with a fixed delay
//!
//! This module provides a bounded retry loop for network operations and
//! other potentially transient failures. Each invocation of the operation
//! receives a [`RetryState`] so it can report progress in its own logs.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Options for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Total number of attempts, including the first one
    pub num_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl RetryOptions {
    pub fn new(num_attempts: u32, delay: Duration) -> Self {
        Self {
            num_attempts,
            delay,
        }
    }

    /// Budget used for `npm publish`
    pub fn publish() -> Self {
        Self::new(5, Duration::from_millis(10_000))
    }

    /// Budget used while polling the registry for a freshly published tarball
    pub fn availability() -> Self {
        Self::new(10, Duration::from_millis(3_000))
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::publish()
    }
}

/// Progress of a single retry loop, handed to the operation on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Zero-based attempt index
    pub attempt: u32,
    /// Attempts left including this one
    pub remaining: u32,
    /// Configured number of attempts
    pub total: u32,
}

/// Retry manager for executing operations with a fixed delay between attempts
///
/// # Examples
///
/// ```no_run
/// use mirror_publisher::core::{RetryManager, RetryOptions};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let manager = RetryManager::new(RetryOptions::new(3, Duration::from_secs(1)));
///
///     let result = manager
///         .retry(|state| async move {
///             println!("attempt {} of {}", state.attempt + 1, state.total);
///             Ok::<_, anyhow::Error>("success")
///         })
///         .await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    /// Create a new RetryManager with the given options
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> RetryOptions {
        self.options
    }

    /// Execute the given async operation until it succeeds or the attempt
    /// budget is spent. The last error is returned on exhaustion.
    pub async fn retry<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut(RetryState) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_when(operation, |_| true).await
    }

    /// Like [`retry`](Self::retry), but an error for which `is_retryable`
    /// returns false is returned immediately.
    pub async fn retry_when<F, Fut, T, E, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(RetryState) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let total = self.options.num_attempts.max(1);
        let mut attempt = 0;

        loop {
            let state = RetryState {
                attempt,
                remaining: total - attempt,
                total,
            };

            match operation(state).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !is_retryable(&error) {
                        return Err(error);
                    }

                    attempt += 1;
                    if attempt >= total {
                        tracing::warn!(attempts = total, "giving up: {error}");
                        return Err(error);
                    }

                    tracing::warn!(
                        attempt,
                        remaining = total - attempt,
                        total,
                        delay_ms = self.options.delay.as_millis() as u64,
                        "attempt failed, retrying: {error}"
                    );
                    sleep(self.options.delay).await;
                }
            }
        }
    }
}
