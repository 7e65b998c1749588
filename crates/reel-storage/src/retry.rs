//! Retry utilities with exponential backoff.
//!
//! Provides bounded retry for operations against potentially flaky remote
//! storage (downloads, uploads, existence probes).

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Metric incremented once per retry (not per attempt).
pub const STORAGE_RETRIES_TOTAL: &str = "pagereel_storage_retries_total";

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of attempts (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Same policy under a different operation name.
    pub fn named(&self, operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..self.clone()
        }
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }
}

/// Execute an async operation with retry logic.
///
/// Every error is retried until `max_attempts` is reached; the last error is
/// returned on exhaustion.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new("upload_video").with_max_attempts(3);
/// let result = retry_async(&config, || async {
///     store.put(&key, data.clone(), "video/mp4").await
/// }).await;
/// ```
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async_if(config, operation, |_| true).await
}

/// Like [`retry_async`], but only errors accepted by `should_retry` are
/// retried; others are returned immediately.
pub async fn retry_async_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = %config.operation_name,
                        attempt,
                        "{} succeeded after retry", config.operation_name
                    );
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = %config.operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    "{} attempt {}/{} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, max_attempts, delay, e
                );
                metrics::counter!(STORAGE_RETRIES_TOTAL, "operation" => config.operation_name.clone())
                    .increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(
                        operation = %config.operation_name,
                        attempts = attempt,
                        "{} failed after {} attempts: {}",
                        config.operation_name, attempt, e
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(name: &str) -> RetryConfig {
        RetryConfig::new(name).with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        let config = RetryConfig::new("test")
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        let delays: Vec<_> = (1..=40).map(|a| config.delay_for_attempt(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(RetryConfig::new("t").with_max_attempts(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_async_immediate_success() {
        let config = fast("test");
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_async_eventual_success() {
        // Fails k = 2 < max_attempts = 3 times, then succeeds.
        let config = fast("test");
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_exhaustion_returns_last_error() {
        let config = fast("test").with_max_attempts(4);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_async(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {}", n)) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_async_waits_between_attempts() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(10));
        let start = std::time::Instant::now();

        let _: Result<(), &str> = retry_async(&config, || async { Err("down") }).await;

        // 10ms + 20ms of backoff for three attempts
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_retry_async_if_stops_on_permanent_error() {
        let config = fast("test");
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async_if(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("not found") }
            },
            |e| *e != "not found",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
