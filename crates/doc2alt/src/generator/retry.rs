//! Retry as a pure policy function (§4.3.2), not a decorator around the
//! model-call method: the classification of what is retryable is carried
//! through an explicit discriminant rather than inspected from an
//! exception type.

use std::future::Future;

use crate::config::RetryPolicy;
use crate::error::Error;

/// Whether a failed operation may be retried, decided by the caller before
/// handing the error to [`with_backoff`].
pub trait Classified {
    fn is_retryable(&self) -> bool;
}

impl Classified for Error {
    fn is_retryable(&self) -> bool {
        matches!(self, Error::Api { retryable: true, .. })
    }
}

/// Run `operation` with exponential backoff per `policy`. `operation` is
/// called at least once; on a retryable error it is retried up to
/// `policy.max_retries` additional times, sleeping `policy.delay_for_attempt
/// (k)` between attempts. The final error (retryable or not) is returned
/// once the budget is exhausted.
pub async fn with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Classified,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(attempt, delay_seconds = delay, "retrying after transient error");
                tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl Classified for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { max_retries: 3, initial_delay_seconds: 0.0, backoff_base: 2.0, max_delay_seconds: 0.0 }
    }

    #[tokio::test]
    async fn exhausts_retries_and_reraises_last_error_for_all_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: true }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn succeeds_on_third_call_after_two_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError { retryable: true })
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
    async fn aborts_immediately_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { retryable: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
