use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with jitter for retryable API failures.
///
/// Attempt `n` (0-based) that fails with a retryable error is followed by a
/// pause of `base_delay * 2^n + uniform(0, max_jitter)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt`, with `jitter_fraction` in `[0, 1]`.
    pub fn delay_for(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
            + self.max_jitter.mul_f64(jitter_fraction.clamp(0.0, 1.0))
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..=1.0);
        self.delay_for(attempt, jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `sleep` is awaited between attempts.
    pub async fn run<T, Op, OpFut, Sleep, SleepFut>(&self, mut op: Op, mut sleep: Sleep) -> Result<T>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T>>,
        Sleep: FnMut(Duration) -> SleepFut,
        SleepFut: Future<Output = ()>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "[transport] request failed ({}), retrying in {:.2}s (attempt {}/{})",
                        e,
                        delay.as_secs_f64(),
                        attempt + 1,
                        max_attempts
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!("[transport] giving up after {} attempts: {}", max_attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LiumError;
    use std::sync::{Arc, Mutex};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(50),
        }
    }

    fn recording_sleep(
        log: Arc<Mutex<Vec<Duration>>>,
    ) -> impl FnMut(Duration) -> std::future::Ready<()> {
        move |d| {
            log.lock().unwrap().push(d);
            std::future::ready(())
        }
    }

    #[test]
    fn delay_is_exponential_plus_jitter() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for(0, 0.0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, 0.0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, 1.0), Duration::from_millis(850));
        assert_eq!(policy.delay_for(2, 7.0), Duration::from_millis(450));
    }

    #[tokio::test]
    async fn rate_limited_three_times_then_ok() {
        let policy = fast_policy();
        let slept = Arc::new(Mutex::new(vec![]));
        let mut calls = 0;

        let result = policy
            .run(
                || {
                    calls += 1;
                    let outcome = if calls <= 3 {
                        Err(LiumError::from_status(429, ""))
                    } else {
                        Ok("done")
                    };
                    std::future::ready(outcome)
                },
                recording_sleep(slept.clone()),
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 4);
        let slept = slept.lock().unwrap();
        assert_eq!(slept.len(), 3);
        for (attempt, d) in slept.iter().enumerate() {
            let floor = Duration::from_millis(100) * 2u32.pow(attempt as u32);
            assert!(*d >= floor && *d <= floor + Duration::from_millis(50));
        }
        assert!(slept.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let slept = Arc::new(Mutex::new(vec![]));
        let mut calls = 0;
        let result: Result<()> = fast_policy()
            .run(
                || {
                    calls += 1;
                    std::future::ready(Err(LiumError::from_status(401, "")))
                },
                recording_sleep(slept.clone()),
            )
            .await;
        assert!(matches!(result, Err(LiumError::Authentication { .. })));
        assert_eq!(calls, 1);
        assert!(slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let slept = Arc::new(Mutex::new(vec![]));
        let mut calls = 0;
        let result: Result<()> = fast_policy()
            .run(
                || {
                    calls += 1;
                    std::future::ready(Err(LiumError::from_status(500 + calls, "")))
                },
                recording_sleep(slept.clone()),
            )
            .await;
        assert!(matches!(result, Err(LiumError::Server { status: 506, .. })));
        assert_eq!(calls, 6);
        assert_eq!(slept.lock().unwrap().len(), 5);
    }
}
