//! Polling helpers for work that completes after the call that started it.

use std::future::Future;
use std::time::Duration;

/// A generous upper bound for detached work in tests.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Returns `true` if the condition was observed to hold.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// Like [`eventually`], for conditions that need to await (e.g. an async lock).
pub async fn eventually_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_eventually_observes_background_work() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.store(true, Ordering::SeqCst);
        });

        assert!(eventually(DEFAULT_WAIT, || flag.load(Ordering::SeqCst)).await);
    }

    #[tokio::test]
    async fn test_eventually_times_out() {
        assert!(!eventually(Duration::from_millis(30), || false).await);
    }

    #[tokio::test]
    async fn test_eventually_async() {
        let ready = Arc::new(tokio::sync::Mutex::new(true));
        let ok = eventually_async(DEFAULT_WAIT, || {
            let ready = Arc::clone(&ready);
            async move { *ready.lock().await }
        })
        .await;
        assert!(ok);
    }
}
