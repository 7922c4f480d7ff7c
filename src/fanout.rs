//! Bounded parallel application of an operation over a batch of items.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ResultOkLogExt;

/// Runs one operation per item on a bounded set of tokio tasks.
///
/// At most `min(len(items), max_parallelism)` operations run at the same time. Failures stay
/// local to their item: an operation returning an error or panicking yields `None` for that
/// item and never aborts the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    max_parallelism: usize,
}

impl FanOut {
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
        }
    }

    /// Number of workers used for a batch of `items` items.
    pub fn workers_for(&self, items: usize) -> usize {
        items.clamp(1, self.max_parallelism)
    }

    /// Applies `operation` to every item and pairs each item with its result, in input order.
    pub async fn apply<T, R, E, F, Fut>(
        &self,
        name: &'static str,
        items: Vec<T>,
        operation: F,
    ) -> Vec<(T, Option<R>)>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        E: std::error::Error + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let workers = self.workers_for(items.len());
        log::trace!("{name}: {} items on {workers} workers", items.len());
        let semaphore = Arc::new(Semaphore::new(workers));
        let operation = Arc::new(operation);
        let mut tasks = JoinSet::new();
        for (index, item) in items.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let operation = Arc::clone(&operation);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, operation(item).await)
            });
        }

        let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None)
            .take(items.len())
            .collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    results[index] = result.ok_log(format_args!("{name} failed for item #{index}"));
                }
                Err(err) => log::error!("{name} worker did not finish: {}", err),
            }
        }

        items.into_iter().zip(results).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("item {0} failed")]
    struct ItemError(u32);

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let fan_out = FanOut::new(4);
        let results = fan_out
            .apply("double", vec![5u32, 1, 3, 2], |item| async move {
                tokio::time::sleep(Duration::from_millis(u64::from(item))).await;
                Ok::<_, ItemError>(item * 2)
            })
            .await;
        assert_eq!(
            results,
            vec![(5, Some(10)), (1, Some(2)), (3, Some(6)), (2, Some(4))]
        );
    }

    #[tokio::test]
    async fn test_failures_are_marked_absent() {
        let fan_out = FanOut::new(8);
        let results = fan_out
            .apply("odd only", (0u32..6).collect(), |item| async move {
                if item % 2 == 0 {
                    Err(ItemError(item))
                } else {
                    Ok(item)
                }
            })
            .await;
        assert_eq!(results.len(), 6);
        for (item, result) in results {
            if item % 2 == 0 {
                assert_eq!(result, None);
            } else {
                assert_eq!(result, Some(item));
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_item_does_not_abort_batch() {
        let fan_out = FanOut::new(2);
        let results = fan_out
            .apply("panicky", vec![1u32, 2, 3], |item| async move {
                if item == 2 {
                    panic!("boom");
                }
                Ok::<_, ItemError>(item)
            })
            .await;
        assert_eq!(results, vec![(1, Some(1)), (2, None), (3, Some(3))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallelism_is_capped() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let fan_out = FanOut::new(3);
        let results = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            fan_out
                .apply("sleepy", (0u32..10).collect(), move |item| {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ItemError>(item)
                    }
                })
                .await
        };
        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|(item, result)| *result == Some(*item)));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let fan_out = FanOut::new(3);
        let results = fan_out
            .apply("nothing", Vec::<u32>::new(), |item| async move {
                Ok::<_, ItemError>(item)
            })
            .await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_workers_for() {
        let fan_out = FanOut::new(64);
        assert_eq!(fan_out.workers_for(0), 1);
        assert_eq!(fan_out.workers_for(10), 10);
        assert_eq!(fan_out.workers_for(5000), 64);
        assert_eq!(FanOut::new(0).workers_for(10), 1);
    }
}
