use crate::metrics::Metrics;
use crate::models::{Backoff, RetrySettings};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by [`RetryPolicy::run`]
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Bounded retry for file system writes.
///
/// Runs synchronously; callers hold the write lock for the whole retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
    metrics: Option<Arc<Metrics>>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
            metrics: None,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.delay(), settings.backoff)
    }

    /// Single attempt, no delay.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Backoff::Fixed)
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Run `action` until it succeeds or the attempts are used up.
    pub fn run<T, F>(&self, operation: &str, mut action: F) -> Result<T, RetryError>
    where
        F: FnMut() -> std::io::Result<T>,
    {
        let mut attempt = 1;
        loop {
            match action() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    tracing::error!("{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_write_retry();
                    }
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
