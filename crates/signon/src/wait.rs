//! Bounded condition polling.
//!
//! Every wait in a sign-in run goes through [`poll_until`]: the check runs at
//! least once, then every `interval` until it yields a value or `timeout`
//! elapses. There is no unbounded variant.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Repeatedly run `check` until it returns `Some`, or give up after `timeout`.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = check().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!(attempts, ?timeout, "condition not met before deadline");
            return None;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_success() {
        let calls = AtomicU32::new(0);
        let found = poll_until(Duration::from_secs(5), Duration::from_millis(100), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { (n == 3).then_some(n) }
        })
        .await;
        assert_eq!(found, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_deadline() {
        let start = Instant::now();
        let found: Option<()> =
            poll_until(Duration::from_secs(3), Duration::from_millis(250), || async { None }).await;
        assert!(found.is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_checks_once() {
        let calls = AtomicU32::new(0);
        let found: Option<()> = poll_until(Duration::ZERO, Duration::from_millis(250), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;
        assert!(found.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
