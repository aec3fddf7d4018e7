use rand::Rng;
use std::time::Duration;
use swipe_core::{Error, Result};
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Lower bound of the randomized delay between attempts
    pub min_delay: Duration,
    /// Upper bound of the randomized delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Tag updates on freshly written objects: a first attempt plus three
    /// retries, 20-30 s apart, to ride out request-rate throttling.
    pub fn tag_update() -> Self {
        Self {
            max_attempts: 4,
            min_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(30),
        }
    }

    /// A random delay within the configured bounds
    pub fn delay(&self) -> Duration {
        jittered(self.min_delay, self.max_delay)
    }
}

/// Uniformly random duration in `[min, max]`
pub fn jittered(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Check if this error should trigger a retry
    fn is_retryable(&self) -> bool;
}

impl RetryableError for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // A missing object stays missing
            Error::ObjectStore { .. } => !self.is_not_found(),
            Error::FileSystem { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Execute an async operation, sleeping a jittered delay between failed attempts
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: Into<Error> + RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= config.max_attempts || !err.is_retryable() {
                    return Err(err.into());
                }

                let delay = config.delay();
                tracing::warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %err,
                    delay_secs = delay.as_secs_f64(),
                    "attempt failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use swipe_core::StoreErrorKind;

    fn throttled() -> Error {
        Error::object_store("s3://b/k", "put_tags", StoreErrorKind::Throttled, "SlowDown")
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let min = Duration::from_secs(20);
        let max = Duration::from_secs(30);
        for _ in 0..100 {
            let d = jittered(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(jittered(max, min), max);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_async(&RetryConfig::tag_update(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(throttled())
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<()> = retry_async(&RetryConfig::tag_update(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(throttled())
        })
        .await;

        assert!(result.unwrap_err().is_throttled());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_async(&RetryConfig::tag_update(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::not_found("s3://b/k", "get_tags"))
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
