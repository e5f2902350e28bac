// src/import/fetch.rs

//! Fixed-size worker pool used to retrieve admitted entries.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Run `f` over every item with at most `workers` calls in flight.
///
/// Items are queued with their position and drained by a fixed set of
/// workers sharing the queue. Each result lands in a pre-sized slot at the
/// item's position, so the output order is the input order no matter which
/// call finishes first. A `None` slot means `f` returned `None` or its
/// worker panicked.
pub async fn fetch_in_order<T, R, F, Fut>(items: Vec<T>, workers: usize, f: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<R>> + Send + 'static,
{
    let len = items.len();
    if len == 0 {
        return Vec::new();
    }

    let (tx, rx) = mpsc::unbounded_channel::<(usize, T)>();
    for work in items.into_iter().enumerate() {
        // The receiver is alive until the workers below finish.
        let _ = tx.send(work);
    }
    drop(tx);

    let queue = Arc::new(tokio::sync::Mutex::new(rx));
    let slots: Arc<Mutex<Vec<Option<R>>>> =
        Arc::new(Mutex::new((0..len).map(|_| None).collect()));
    let f = Arc::new(f);

    let pool = workers.clamp(1, len);
    debug!(items = len, workers = pool, "starting fetch workers");

    let mut set = JoinSet::new();
    for worker in 0..pool {
        let queue = Arc::clone(&queue);
        let slots = Arc::clone(&slots);
        let f = Arc::clone(&f);

        set.spawn(async move {
            loop {
                let next = queue.lock().await.recv().await;
                let Some((index, item)) = next else {
                    break;
                };
                let result = f(index, item).await;
                if let Ok(mut slots) = slots.lock() {
                    slots[index] = result;
                }
            }
            debug!(worker, "fetch worker finished");
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "fetch worker failed");
        }
    }

    // Every worker has finished, so this is the last reference.
    match Arc::try_unwrap(slots) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
        Err(shared) => {
            let mut guard = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn keeps_input_order_when_completion_order_differs() {
        let items: Vec<u64> = vec![50, 5, 30, 1, 20];
        let out = fetch_in_order(items.clone(), 3, |_, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Some(delay * 10)
        })
        .await;
        let expected: Vec<Option<u64>> = items.iter().map(|d| Some(d * 10)).collect();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn failed_items_leave_empty_slots() {
        let out = fetch_in_order(vec![1, 2, 3, 4], 8, |i, v| async move {
            (i % 2 == 0).then_some(v)
        })
        .await;
        assert_eq!(out, vec![Some(1), None, Some(3), None]);
    }

    #[tokio::test]
    async fn never_exceeds_worker_count() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&in_flight), Arc::clone(&peak));

        let out = fetch_in_order((0..20).collect::<Vec<u32>>(), 4, move |_, v| {
            let in_flight = Arc::clone(&a);
            let peak = Arc::clone(&b);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Some(v)
            }
        })
        .await;

        assert_eq!(out.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn empty_input_spawns_nothing() {
        let out: Vec<Option<u8>> = fetch_in_order(Vec::<u8>::new(), 8, |_, v| async move { Some(v) }).await;
        assert!(out.is_empty());
    }
}
