//! Bounded retry with exponential backoff for delete-like sandbox calls.
//!
//! A 404 means the resource is already gone and counts as success. 429, any 5xx,
//! and failures that carry no HTTP status at all are retried after
//! `base_delay * 2^(attempt-1)`. Every other client error fails immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RetryConfig;
use crate::error::ApiError;

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    AlreadyAbsent,
    Retry,
    Fail,
}

/// Result of a retried operation that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Completed(T),
    /// The server answered 404: the target was already deleted.
    AlreadyAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Classify a failure.
    pub fn classify(error: &ApiError) -> RetryDecision {
        match error.status() {
            Some(404) => RetryDecision::AlreadyAbsent,
            Some(429) | Some(500..=599) | None => RetryDecision::Retry,
            Some(_) => RetryDecision::Fail,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, reports the target absent, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<RetryOutcome<T>, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            let error = match op().await {
                Ok(value) => return Ok(RetryOutcome::Completed(value)),
                Err(e) => e,
            };

            match Self::classify(&error) {
                RetryDecision::AlreadyAbsent => {
                    debug!(error = %error, "Target already absent, treating as success");
                    return Ok(RetryOutcome::AlreadyAbsent);
                }
                RetryDecision::Fail => return Err(error),
                RetryDecision::Retry if attempt >= self.max_attempts => {
                    debug!(attempts = attempt, "Retry attempts exhausted");
                    return Err(error);
                }
                RetryDecision::Retry => {
                    let wait = self.delay_for(attempt);
                    info!(
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failed(status: u16) -> ApiError {
        ApiError::RequestFailed {
            method: "DELETE".into(),
            path: "/v1/files/f-1".into(),
            status,
            body: "boom".into(),
        }
    }

    fn transport() -> ApiError {
        ApiError::Transport {
            method: "DELETE".into(),
            path: "/v1/files/f-1".into(),
            message: "connection reset".into(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(RetryPolicy::classify(&failed(404)), RetryDecision::AlreadyAbsent);
        assert_eq!(RetryPolicy::classify(&failed(429)), RetryDecision::Retry);
        assert_eq!(RetryPolicy::classify(&failed(500)), RetryDecision::Retry);
        assert_eq!(RetryPolicy::classify(&failed(599)), RetryDecision::Retry);
        assert_eq!(RetryPolicy::classify(&transport()), RetryDecision::Retry);
        assert_eq!(RetryPolicy::classify(&failed(400)), RetryDecision::Fail);
        assert_eq!(RetryPolicy::classify(&failed(403)), RetryDecision::Fail);
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_500_attempts_three_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let counter = calls.clone();
        let result: Result<RetryOutcome<()>, _> = RetryPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(failed(500))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = RetryPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    match counter.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err(failed(500)),
                        _ => Ok("deleted"),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, RetryOutcome::Completed("deleted"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: RetryOutcome<()> = RetryPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(failed(404))
                }
            })
            .await
            .unwrap();

        assert_eq!(result, RetryOutcome::AlreadyAbsent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<RetryOutcome<()>, _> = RetryPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(failed(403))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(403));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = RetryPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(transport())
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, RetryOutcome::Completed(()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
