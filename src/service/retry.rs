//! Exponential backoff around fallible async calls
//!
//! One combinator shared by the validator and corrector clients. Callers decide
//! which errors are worth another attempt; anything else is returned at once.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: E },

    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the call failed
    pub fn into_inner(self) -> E {
        match self {
            Self::ExhaustedRetries { last_error, .. } => last_error,
            Self::Fatal(e) => e,
        }
    }
}

/// Longest single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based), capped at [`MAX_RETRY_DELAY`]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempts run out
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        self.execute_with_sleep(operation_name, operation, is_retryable, tokio::time::sleep)
            .await
    }

    /// Same as [`execute`](Self::execute) with a caller-supplied sleep
    pub async fn execute_with_sleep<T, E, F, Fut, P, S, SFut>(
        &self,
        operation_name: &str,
        mut operation: F,
        is_retryable: P,
        mut sleep: S,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
        S: FnMut(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt = attempt,
                            "Call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !is_retryable(&error) {
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    "Call failed with non-retryable error"
                );
                return Err(RetryError::Fatal(error));
            }

            if attempt >= self.max_attempts {
                tracing::error!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = 0u64,
                    error = %error,
                    "All attempts failed"
                );
                return Err(RetryError::ExhaustedRetries {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.delay_after(attempt);
            tracing::warn!(
                operation = operation_name,
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Call failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn retryable(e: &TestError) -> bool {
        matches!(e, TestError::Flaky)
    }

    #[tokio::test]
    async fn test_succeeds_after_failures_with_growing_delays() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), 2.0);
        let calls = RefCell::new(0u32);
        let sleeps = RefCell::new(Vec::new());

        let result = policy
            .execute_with_sleep(
                "flaky",
                || {
                    *calls.borrow_mut() += 1;
                    let n = *calls.borrow();
                    async move { if n < 4 { Err(TestError::Flaky) } else { Ok(n) } }
                },
                retryable,
                |d| {
                    sleeps.borrow_mut().push(d);
                    async {}
                },
            )
            .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(
            *sleeps.borrow(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 2.0);
        let sleeps = RefCell::new(0);

        let result: Result<(), _> = policy
            .execute_with_sleep(
                "down",
                || async { Err(TestError::Flaky) },
                retryable,
                |_| {
                    *sleeps.borrow_mut() += 1;
                    async {}
                },
            )
            .await;

        match result {
            Err(RetryError::ExhaustedRetries { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, TestError::Flaky);
            }
            other => panic!("unexpected result: {:?}", other.map_err(|e| e.to_string())),
        }
        assert_eq!(*sleeps.borrow(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), 2.0);
        let calls = RefCell::new(0);

        let result: Result<(), _> = policy
            .execute_with_sleep(
                "broken",
                || {
                    *calls.borrow_mut() += 1;
                    async { Err(TestError::Broken) }
                },
                retryable,
                |_: Duration| -> std::future::Ready<()> { panic!("must not sleep") },
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(TestError::Broken))));
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_never_sleeps() {
        let policy = RetryPolicy::new(0, Duration::from_secs(60), 2.0);
        assert_eq!(policy.max_attempts(), 1);

        let result: Result<(), _> = policy
            .execute_with_sleep(
                "once",
                || async { Err(TestError::Flaky) },
                retryable,
                |_: Duration| -> std::future::Ready<()> { panic!("must not sleep") },
            )
            .await;
        assert!(matches!(
            result,
            Err(RetryError::ExhaustedRetries { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_uses_tokio_clock() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1), 2.0);
        let start = tokio::time::Instant::now();
        let calls = RefCell::new(0);

        let result = policy
            .execute(
                "clock",
                || {
                    *calls.borrow_mut() += 1;
                    let n = *calls.borrow();
                    async move { if n == 1 { Err(TestError::Flaky) } else { Ok(()) } }
                },
                retryable,
            )
            .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(u64::MAX / 2), 1e300);
        assert_eq!(policy.delay_after(1), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_after(4), MAX_RETRY_DELAY);

        let steep = RetryPolicy::new(50, Duration::from_millis(500), 10.0);
        assert_eq!(steep.delay_after(2), Duration::from_secs(5));
        assert_eq!(steep.delay_after(40), MAX_RETRY_DELAY);
    }
}
