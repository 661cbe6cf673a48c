//! Retry strategy with a recovery step between attempts.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use reportsync_common::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay (cap for exponential growth).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Add random jitter of +/- 25%
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for RetryConfig {
    /// A single retry: the stale handle is rebuilt once, then the failure is final.
    fn default() -> Self {
        Self::new(1)
    }
}

/// Failure of an operation run through [`RetryExecutor`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// First attempt failed with an error that is not worth retrying.
    #[error("{0}")]
    Failed(Error),
    /// Every allowed attempt failed; carries the last error.
    #[error("failed after reinitialization: {source}")]
    Exhausted { attempts: u32, source: Error },
    /// The recovery step between two attempts failed.
    #[error("reinitialization failed: {0}")]
    Recovery(Error),
}

impl RetryError {
    /// The underlying error, without the retry context.
    pub fn into_inner(self) -> Error {
        match self {
            RetryError::Failed(err) | RetryError::Recovery(err) => err,
            RetryError::Exhausted { source, .. } => source,
        }
    }

    /// Whether at least one retry was attempted.
    pub fn retried(&self) -> bool {
        !matches!(self, RetryError::Failed(_))
    }
}

impl From<RetryError> for Error {
    fn from(err: RetryError) -> Self {
        err.into_inner()
    }
}

/// Retry executor for running operations with retry logic.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation, running `recover` before each retry.
    ///
    /// Only errors accepted by `should_retry` trigger a retry. Once a retry
    /// has happened, any further failure ends the loop as
    /// [`RetryError::Exhausted`] as soon as the budget is used up or the new
    /// error is not retryable.
    pub async fn execute_with_recovery<F, Fut, T, C, R, RFut>(
        &self,
        operation: F,
        should_retry: C,
        recover: R,
    ) -> std::result::Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> bool,
        R: Fn() -> RFut,
        RFut: Future<Output = Result<()>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !should_retry(&err) || attempt >= self.config.max_retries {
                        if attempt == 0 {
                            return Err(RetryError::Failed(err));
                        }
                        warn!("Operation failed after {} attempts: {}", attempt + 1, err);
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            source: err,
                        });
                    }

                    attempt += 1;
                    let delay = self.config.delay_for_attempt(attempt - 1);
                    warn!(
                        "Attempt {} failed: {}. Recovering and retrying in {:?}...",
                        attempt, err, delay
                    );
                    sleep(delay).await;

                    recover().await.map_err(RetryError::Recovery)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            jitter: false,
            ..RetryConfig::new(max_retries).with_initial_delay(Duration::from_millis(1))
        })
    }

    fn closed() -> Error {
        Error::ConnectionClosed("test".to_string())
    }

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig {
            backoff_multiplier: 2.0,
            jitter: false,
            ..RetryConfig::new(3).with_initial_delay(Duration::from_secs(1))
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 10.0,
            jitter: false,
            ..RetryConfig::new(10).with_initial_delay(Duration::from_secs(1))
        };

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[test]
    fn test_default_retries_once() {
        assert_eq!(RetryConfig::default().max_retries, 1);
    }

    #[tokio::test]
    async fn test_recovers_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let recoveries = Arc::new(AtomicU32::new(0));

        let result = fast(1)
            .execute_with_recovery(
                || {
                    let attempts = attempts.clone();
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(closed())
                        } else {
                            Ok(42)
                        }
                    }
                },
                Error::is_connection_invalidated,
                || {
                    let recoveries = recoveries.clone();
                    async move {
                        recoveries.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = fast(1)
            .execute_with_recovery(
                || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(Error::NotFound("doc".to_string()))
                    }
                },
                Error::is_connection_invalidated,
                || async { Ok(()) },
            )
            .await;

        let err = result.unwrap_err();
        assert!(!err.retried());
        assert_eq!(err.to_string(), "Not found: doc");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_failure_is_terminal() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = fast(1)
            .execute_with_recovery(
                || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(closed())
                    }
                },
                Error::is_connection_invalidated,
                || async { Ok(()) },
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.retried());
        assert!(err.to_string().starts_with("failed after reinitialization: "));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recovery_failure_stops_retrying() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = fast(3)
            .execute_with_recovery(
                || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(closed())
                    }
                },
                Error::is_connection_invalidated,
                || async { Err(Error::Network("unreachable".to_string())) },
            )
            .await;

        assert!(matches!(result, Err(RetryError::Recovery(Error::Network(_)))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
