//! Exponential-backoff retry helper (spec.md §9 "Retry discipline"): base 1s,
//! factor 2, cap 30s, max 3 attempts. A helper, not a component; workers
//! never retry internally, the Manager or an external caller decides to
//! re-submit a failed task.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

pub fn backoff() -> ExponentialBuilder {
    // `with_max_times` counts retries after the first attempt; 2 retries +
    // the initial call gives 3 attempts total (spec.md §9).
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_factor(2.0)
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(2)
}

/// Runs `f` under the exponential backoff policy in [`backoff`]. Cancellation is the caller's
/// responsibility: wrap the returned future in `tokio::select!` against a
/// cancellation signal to abort immediately, as `backon` itself has no
/// context-awareness.
pub async fn with_backoff<T, E, F, Fut>(f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    f.retry(backoff()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_until_success_within_max_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<(), &'static str> = with_backoff(|| {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<(), &'static str> = with_backoff(|| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("always fails")
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
