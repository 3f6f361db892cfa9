use pf_core::GameResult;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule for retrying lock contention during parallel AI
/// submissions. Retries only retryable failures (lock timeouts and
/// transient store errors); anything else fails fast.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-based): exponential, capped, with
    /// jitter in `[0.5, 1.5)` of the nominal delay to break up herds.
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.jitter {
            let factor = 0.5 + rand::rng().random_range(0.0..1.0);
            nominal.mul_f64(factor)
        } else {
            nominal
        }
    }
}

/// Run an operation with exponential backoff on retryable failures.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> GameResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GameResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                log::warn!(
                    "[retry] {} failed (attempt {}/{}), retrying in {:.2}s: {}",
                    operation_name,
                    attempt + 1,
                    policy.max_retries + 1,
                    delay.as_secs_f64(),
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt >= policy.max_retries && error.is_retryable() {
                    log::error!(
                        "[retry] {} failed after {} attempts, giving up: {}",
                        operation_name,
                        attempt + 1,
                        error
                    );
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::GameError;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: false,
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(4), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = RetryPolicy {
            jitter: true,
            ..fast_policy()
        };
        for attempt in 0..3 {
            let nominal = RetryPolicy {
                jitter: false,
                ..policy
            }
            .delay(attempt);
            let jittered = policy.delay(attempt);
            assert!(jittered >= nominal.mul_f64(0.5));
            assert!(jittered < nominal.mul_f64(1.5));
        }
    }

    #[tokio::test]
    async fn retries_lock_timeouts_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff("test", fast_policy(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GameError::LockTimeout("player:p2".into()))
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
    async fn fails_fast_on_domain_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: GameResult<()> = retry_with_backoff("test", fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GameError::InsufficientBalance)
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: GameResult<()> = retry_with_backoff("test", fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GameError::LockTimeout("player:p2".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
