use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("retry limit lapsed")]
    LimitLapsed,
}

/// Config for [`retry`].
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub retry_wait: Duration,
    pub retry_limit: u32,
    pub backoff_multiply: f64,
}

/// Repeatedly invokes `predicate`, returning `Ok` at the first `true`. On
/// `false`, sleeps `retry_wait` then multiplies the wait by
/// `backoff_multiply`. After `retry_limit` consecutive falses, fails with
/// [`Error::LimitLapsed`].
///
/// `predicate` must tolerate being called multiple times; vendor adapters
/// use this to poll for write confirmation.
pub async fn retry<F, Fut>(config: RetryConfig, mut predicate: F) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut limit = config.retry_limit;
    let mut wait = config.retry_wait;

    while limit > 0 {
        if predicate().await {
            return Ok(());
        }
        limit -= 1;
        tokio::time::sleep(wait).await;
        wait = Duration::from_secs_f64(wait.as_secs_f64() * config.backoff_multiply);
    }

    Err(Error::LimitLapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_true() {
        let calls = AtomicU32::new(0);
        let result = retry(
            RetryConfig {
                retry_wait: Duration::from_millis(1),
                retry_limit: 3,
                backoff_multiply: 2.0,
            },
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fails_after_retry_limit_consecutive_falses() {
        let calls = AtomicU32::new(0);
        let result = retry(
            RetryConfig {
                retry_wait: Duration::from_millis(1),
                retry_limit: 3,
                backoff_multiply: 1.0,
            },
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            },
        )
        .await;
        assert!(matches!(result, Err(Error::LimitLapsed)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_once_predicate_flips_true() {
        let calls = AtomicU32::new(0);
        let result = retry(
            RetryConfig {
                retry_wait: Duration::from_millis(1),
                retry_limit: 5,
                backoff_multiply: 2.0,
            },
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                n >= 2
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
