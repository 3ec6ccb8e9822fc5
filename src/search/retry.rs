//! Retry policy / 重试策略
//!
//! The single retry loop used by every sub-request. Each attempt and each
//! back-off sleep is raced against the cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Retry policy / 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one / 总尝试次数(含首次)
    pub max_attempts: u32,
    /// Sleep between attempts / 重试间隔
    pub backoff: Duration,
    /// Which errors are worth another attempt / 可重试错误判定
    pub retryable: fn(&TransportError) -> bool,
}

/// Why the loop gave up / 重试终止原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// Non-retryable error, or budget exhausted / 不可重试或次数用尽
    Failed { error: TransportError, attempts: u32 },
    Cancelled,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::on_timeout(3, Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// Retry timeouts only, sleeping `timeout / 6` in between / 仅重试超时
    pub fn on_timeout(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: timeout / 6,
            retryable: TransportError::is_timeout,
        }
    }

    /// Sleep before attempt number `attempt` (1-based) / 第attempt次尝试前的等待
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.backoff
    }

    /// Run `op` until it succeeds, fails for good, or is cancelled / 执行并按策略重试
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
                result = op(attempt) => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_attempts && (self.retryable)(&error) => {
                    tracing::warn!(
                        "attempt {}/{} failed: {}, retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        error,
                        self.delay_before(attempt + 1)
                    );
                }
                Err(error) => return Err(RetryFailure::Failed { error, attempts: attempt }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::on_timeout(max_attempts, Duration::from_secs(6))
    }

    #[test]
    fn test_delays() {
        let fixed = policy(3);
        assert_eq!(fixed.delay_before(1), Duration::ZERO);
        assert_eq!(fixed.delay_before(2), Duration::from_secs(1));
        assert_eq!(fixed.delay_before(3), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_timeouts_until_exhausted() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = policy(3)
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::Timeout { attempts: 1 }) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result,
            Err(RetryFailure::Failed { error: TransportError::Timeout { attempts: 1 }, attempts: 3 })
        );
        // 两次退避 / two back-offs of 1s
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_on_connection_error() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = policy(3)
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::Connection("refused".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryFailure::Failed { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_timeout() {
        let cancel = CancellationToken::new();
        let result = policy(3)
            .run(&cancel, |attempt| async move {
                if attempt == 1 {
                    Err(TransportError::Timeout { attempts: 1 })
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let result: Result<(), _> = policy(3)
            .run(&cancel, |_| async { Err(TransportError::Timeout { attempts: 1 }) })
            .await;
        assert_eq!(result, Err(RetryFailure::Cancelled));
    }
}
