/// Pass-based retry (spec.md §4.8's fan-out retry policy).
///
/// Unlike the teacher's exponential-backoff helper (`resilience.rs`), the
/// shard fan-out/download/delete operations retry over a small fixed number
/// of *passes* at a fixed interval: each pass re-attempts every item still
/// pending, and an item is dropped from the pending set as soon as it
/// succeeds. This mirrors `original_source/api/apiserv.go`'s placement loop,
/// which loops over the full peer list a bounded number of times rather than
/// backing off a single peer exponentially.
use std::time::Duration;

use tracing::warn;

/// Runs `attempt` against every element of `items` for up to `passes`
/// rounds, sleeping `interval` between rounds. An item is removed from
/// future passes once `attempt` returns `Ok`. Returns the items that never
/// succeeded, in their original relative order.
pub async fn retry_passes<T, F, Fut, E>(
    items: Vec<T>,
    passes: usize,
    interval: Duration,
    mut attempt: F,
) -> Vec<T>
where
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut pending = items;
    for pass in 0..passes {
        if pending.is_empty() {
            break;
        }
        let mut still_pending = Vec::with_capacity(pending.len());
        for item in pending {
            match attempt(item.clone()).await {
                Ok(()) => {}
                Err(e) => {
                    warn!("pass {} attempt failed: {}", pass + 1, e);
                    still_pending.push(item);
                }
            }
        }
        pending = still_pending;
        if !pending.is_empty() && pass + 1 < passes {
            tokio::time::sleep(interval).await;
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_within_budget_leaves_nothing_pending() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let items = vec![1, 2, 3];
        let remaining = retry_passes(items, 3, Duration::from_millis(1), |item| {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                // item 2 fails on its first attempt, succeeds thereafter.
                if item == 2 && n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn exhausting_passes_returns_stragglers() {
        let items = vec![1, 2];
        let remaining = retry_passes(items, 2, Duration::from_millis(1), |_item| async move {
            Err::<(), String>("always fails".to_string())
        })
        .await;
        assert_eq!(remaining, vec![1, 2]);
    }
}
