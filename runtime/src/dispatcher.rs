//! Keyed, bounded fan-out of per-message work.
//!
//! A consumer loop reads one message at a time, but handling a message
//! includes a multi-second processing delay. Handling inline would serialize
//! that delay across every order read by the loop. [`KeyedDispatcher`] moves
//! each message onto its own task instead, with two guarantees:
//!
//! - work for the same key (order id) runs strictly in submission order, so
//!   per-partition ordering from the broker survives the fan-out
//! - at most `max_in_flight` tasks are admitted; when the bound is reached
//!   [`dispatch`](KeyedDispatcher::dispatch) waits, pushing back on the
//!   consumer instead of growing without limit
//!
//! ```text
//!             ┌──── key 1: job a ─► job c ─► ...
//! consumer ───┼──── key 2: job b ─► ...
//!             └──── key 3: job d
//! ```

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, oneshot};

/// Tail of one key's chain: the generation that owns it and the signal that
/// fires when that job finishes.
type Tail = (u64, oneshot::Receiver<()>);

/// Runs futures concurrently across keys and sequentially within a key.
#[derive(Clone)]
pub struct KeyedDispatcher {
    permits: Arc<Semaphore>,
    max_in_flight: u32,
    tails: Arc<DashMap<String, Tail>>,
    generation: Arc<AtomicU64>,
}

impl KeyedDispatcher {
    /// Create a dispatcher admitting at most `max_in_flight` jobs at a time.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = u32::try_from(max_in_flight.clamp(1, Semaphore::MAX_PERMITS))
            .unwrap_or(u32::MAX);
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight as usize)),
            max_in_flight,
            tails: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Jobs currently admitted (running or waiting on their key).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_in_flight as usize - self.permits.available_permits()
    }

    /// Keys with admitted work.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.tails.len()
    }

    /// Admit `job` for `key`.
    ///
    /// Waits while the in-flight bound is reached, then returns as soon as the
    /// job is spawned. The job starts once every earlier job for the same key
    /// has finished.
    pub async fn dispatch<F>(&self, key: String, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // The semaphore is never closed, so acquisition only fails if that invariant breaks.
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            tracing::error!(key = %key, "Dispatcher permits closed, dropping job");
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.tails.insert(key.clone(), (generation, done_rx));
        let tails = Arc::clone(&self.tails);

        tokio::spawn(async move {
            if let Some((_, predecessor)) = previous {
                // An error only means the predecessor task is gone, which also ends the wait.
                let _ = predecessor.await;
            }

            job.await;

            let _ = done_tx.send(());
            tails.remove_if(&key, |_, (owner, _)| *owner == generation);
            drop(permit);
        });
    }

    /// Wait until every admitted job has finished, or `timeout` elapses.
    ///
    /// Returns `true` if the dispatcher drained completely.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let all = self.max_in_flight;
        match tokio::time::timeout(timeout, self.permits.acquire_many(all)).await {
            Ok(Ok(permits)) => {
                drop(permits);
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }
}

impl std::fmt::Debug for KeyedDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDispatcher")
            .field("max_in_flight", &self.max_in_flight)
            .field("in_flight", &self.in_flight())
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn same_key_runs_in_order() {
        let dispatcher = KeyedDispatcher::new(16);
        let log = Arc::new(Mutex::new(Vec::new()));

        for step in 0..5u64 {
            let log = Arc::clone(&log);
            dispatcher
                .dispatch("order-1".to_string(), async move {
                    // Later steps sleep less; ordering must still hold.
                    tokio::time::sleep(Duration::from_millis(10 * (5 - step))).await;
                    log.lock().unwrap().push(step);
                })
                .await;
        }

        assert!(dispatcher.drain(Duration::from_secs(5)).await);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(dispatcher.active_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_overlap() {
        let dispatcher = KeyedDispatcher::new(16);
        let started = tokio::time::Instant::now();

        for key in 0..10 {
            dispatcher
                .dispatch(key.to_string(), async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                })
                .await;
        }

        assert!(dispatcher.drain(Duration::from_secs(60)).await);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn admission_is_bounded() {
        let dispatcher = KeyedDispatcher::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for key in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            dispatcher
                .dispatch(key.to_string(), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            assert!(dispatcher.in_flight() <= 2);
        }

        assert!(dispatcher.drain(Duration::from_secs(5)).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_work() {
        let dispatcher = KeyedDispatcher::new(4);
        dispatcher
            .dispatch("slow".to_string(), async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .await;

        assert!(!dispatcher.drain(Duration::from_secs(1)).await);
    }
}
