//! Bounded retry with backoff
//!
//! Used for broker writes (a fixed budget per published event) and for
//! topic provisioning at startup. Only errors the caller classifies as
//! retryable are retried; anything else is returned after one attempt.

use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential increase: delay * 2^attempt
    Exponential,
    /// Exponential with up to 10% jitter
    ExponentialWithJitter,
}

impl BackoffStrategy {
    /// Delay before retry number `retry` (0 = first retry)
    pub fn calculate_delay(
        &self,
        retry: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Duration {
        use rand::Rng;

        let delay = match self {
            BackoffStrategy::Fixed => initial_delay,
            BackoffStrategy::Exponential => {
                initial_delay.saturating_mul(2u32.saturating_pow(retry))
            }
            BackoffStrategy::ExponentialWithJitter => {
                let base = initial_delay.saturating_mul(2u32.saturating_pow(retry));
                let jitter =
                    (base.as_millis() as f64 * 0.1 * rand::thread_rng().gen::<f64>()) as u64;
                base.saturating_add(Duration::from_millis(jitter))
            }
        };

        delay.min(max_delay)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// How delays grow
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// Exponential backoff, 3 attempts, 100ms doubling up to 30s
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Set total attempts. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Add jitter to exponential delays
    pub fn with_jitter(mut self) -> Self {
        self.strategy = BackoffStrategy::ExponentialWithJitter;
        self
    }

    /// Delay before retry number `retry` (0 = first retry)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        self.strategy
            .calculate_delay(retry, self.initial_delay, self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with an error `retryable`
    /// rejects, or the attempt budget is spent.
    pub async fn execute_when<F, Fut, T, E, R>(
        &self,
        retryable: R,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return RetryResult {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    if attempt >= self.max_attempts.max(1) || !retryable(&err) {
                        return RetryResult {
                            result: Err(err),
                            attempts: attempt,
                        };
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    tracing::debug!(attempt, ?delay, "retrying after failure");
                    tokio::time::sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }
}

/// Outcome of a retried operation
#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    /// Final result (success or last failure)
    pub result: Result<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl<T, E> RetryResult<T, E> {
    /// Get the result
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(Duration::ZERO).with_max_attempts(attempts)
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential().with_max_delay(Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10));
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(policy.calculate_delay(5), Duration::from_millis(10));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::exponential().with_jitter();
        for retry in 0..4 {
            let base = Duration::from_millis(100) * 2u32.pow(retry);
            let delay = policy.calculate_delay(retry);
            assert!(delay >= base);
            assert!(delay <= base + base / 10 + Duration::from_millis(1));
        }
    }

    #[test]
    fn test_attempts_never_below_one() {
        assert_eq!(RetryPolicy::exponential().with_max_attempts(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let outcome = quick(5)
            .execute_when(
                |_: &&str| true,
                |_| {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n < 3 {
                            Err("transient")
                        } else {
                            Ok(n)
                        }
                    }
                },
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result(), Ok(3));
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let outcome = quick(4)
            .execute_when(|_: &&str| true, |_| async { Err::<(), _>("down") })
            .await;
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.into_result(), Err("down"));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let outcome = quick(10)
            .execute_when(
                |err: &&str| *err != "fatal",
                |_| async { Err::<(), _>("fatal") },
            )
            .await;
        assert_eq!(outcome.attempts, 1);
    }
}
