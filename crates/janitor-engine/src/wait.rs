//! Waiting on reference data before scheduled work starts.
//!
//! Agents that depend on a reference cache poll it at a fixed interval until
//! it reports loaded. The wait only blocks the calling task and can be
//! cancelled, e.g. when cluster membership goes down mid-wait.

use crate::collaborators::{CacheStatus, ReferenceCache};
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Poll `check` every `interval` until it returns `true`.
///
/// # Returns
/// * `Ok(attempts)` - Condition met after that many checks
/// * `Err` - Cancelled before the condition held
pub async fn poll_until<F, Fut>(
    interval: Duration,
    cancel: &CancellationToken,
    check: F,
    what: &str,
) -> Result<u32>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            anyhow::bail!("Wait for {} cancelled", what);
        }

        attempts += 1;
        if check().await {
            debug!(what, attempts, "Ready");
            return Ok(attempts);
        }

        debug!(
            what,
            attempt = attempts,
            delay_ms = interval.as_millis(),
            "Not ready, polling again"
        );

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                anyhow::bail!("Wait for {} cancelled", what);
            }
        }
    }
}

/// Block until `cache` reports [`CacheStatus::Loaded`]
pub async fn wait_for_cache(
    cache: &dyn ReferenceCache,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<u32> {
    poll_until(
        interval,
        cancel,
        || async { cache.status().await == CacheStatus::Loaded },
        "reference cache",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockReferenceCache;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_loaded() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut cache = MockReferenceCache::new();
        let counter = calls.clone();
        cache.expect_status().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                CacheStatus::Loading
            } else {
                CacheStatus::Loaded
            }
        });

        let cancel = CancellationToken::new();
        let attempts = wait_for_cache(&cache, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_loading() {
        let mut cache = MockReferenceCache::new();
        cache.expect_status().returning(|| CacheStatus::Loading);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let result = wait_for_cache(&cache, Duration::from_secs(5), &cancel).await;
        assert!(result.unwrap_err().to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_checks() {
        let mut cache = MockReferenceCache::new();
        cache.expect_status().never();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(
            wait_for_cache(&cache, Duration::from_millis(10), &cancel)
                .await
                .is_err()
        );
    }
}
