//! Bounded retry with backoff for connection establishment.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;
use std::time::Duration;

/// Notified before each wait between connection attempts.
pub trait RetryCallback {
    /// `attempt` is the 1-indexed attempt that just failed with `error`;
    /// the next one starts after `delay`.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Ignores retries.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &Error, _delay: Duration) {}
}

/// Logs each retry as a warning.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "Connection attempt {}/{} failed: {}. Reconnecting in {:.1}s",
            attempt,
            max_attempts,
            error,
            delay.as_secs_f64()
        );
    }
}

/// Run `attempt_once` until it succeeds, fails with an error that is not
/// [retryable](Error::is_retryable), or `config.max_attempts` is used up.
///
/// At least one attempt is always made. The error of the last attempt is
/// returned unchanged.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut attempt_once: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match attempt_once() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !error.is_retryable() || attempt >= max_attempts {
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt - 1);
        if let Some(cb) = callback {
            cb.on_retry(attempt, max_attempts, &error, delay);
        }
        thread::sleep(delay);
        attempt += 1;
    }
}
