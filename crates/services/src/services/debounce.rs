//! Timer combinators for coalescing bursts of work.
//!
//! - [`Debouncer`] owns a timer task and a pending-invocation slot: triggers
//!   reset the timer, the action runs once the triggers stop.
//! - [`Throttled`] coalesces concurrent calls with the same key into one
//!   shared in-flight future.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::{sync::mpsc, task::JoinHandle, time};

pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the timer task. `cooldown` is slept after each run before the
    /// next burst is considered; triggers arriving meanwhile are kept and
    /// produce exactly one follow-up run.
    pub fn spawn<F, Fut>(delay: Duration, cooldown: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                loop {
                    match time::timeout(delay, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_elapsed) => break,
                    }
                }
                action().await;
                if !cooldown.is_zero() {
                    time::sleep(cooldown).await;
                }
            }
        });
        Self { tx, task }
    }

    pub fn trigger(&self) {
        // Fails only once the task is gone, at which point nothing is pending.
        let _ = self.tx.send(());
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type InFlight<T> = (u64, Shared<BoxFuture<'static, T>>);

pub struct Throttled<K, T>
where
    T: Clone,
{
    in_flight: Mutex<HashMap<K, InFlight<T>>>,
    next_id: Mutex<u64>,
}

impl<K, T> Default for Throttled<K, T>
where
    T: Clone,
{
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K, T> Throttled<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight call for `key`, or start one with `make`.
    pub async fn call<F>(&self, key: K, make: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (id, shared) = {
            let mut map = lock(&self.in_flight);
            match map.get(&key) {
                Some((id, shared)) => (*id, shared.clone()),
                None => {
                    let id = {
                        let mut next = lock(&self.next_id);
                        *next += 1;
                        *next
                    };
                    let shared = make().shared();
                    map.insert(key.clone(), (id, shared.clone()));
                    (id, shared)
                }
            }
        };

        let output = shared.await;

        let mut map = lock(&self.in_flight);
        if map.get(&key).is_some_and(|(current, _)| *current == id) {
            map.remove(&key);
        }
        output
    }

    /// Detach the in-flight call for `key`; callers already awaiting it
    /// still get its output, later calls start afresh.
    pub fn forget(&self, key: &K) {
        lock(&self.in_flight).remove(key);
    }

    pub fn forget_all(&self) {
        lock(&self.in_flight).clear();
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Debouncer::spawn(Duration::from_secs(1), Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for _ in 0..5 {
            debouncer.trigger();
            time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_defers_follow_up() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Debouncer::spawn(
            Duration::from_secs(1),
            Duration::from_secs(5),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        debouncer.trigger();
        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Arrives during the cooldown
        debouncer.trigger();
        debouncer.trigger();
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_result() {
        let throttled: Arc<Throttled<&'static str, usize>> = Arc::new(Throttled::new());
        let starts = Arc::new(AtomicUsize::new(0));

        let make = |starts: Arc<AtomicUsize>| {
            move || -> BoxFuture<'static, usize> {
                async move {
                    let n = starts.fetch_add(1, Ordering::SeqCst) + 1;
                    time::sleep(Duration::from_millis(50)).await;
                    n
                }
                .boxed()
            }
        };

        let (a, b) = tokio::join!(
            throttled.call("k", make(starts.clone())),
            throttled.call("k", make(starts.clone())),
        );
        assert_eq!((a, b), (1, 1));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(throttled.in_flight(), 0);

        let c = throttled.call("k", make(starts.clone())).await;
        assert_eq!(c, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_starts_fresh_call() {
        let throttled: Arc<Throttled<&'static str, usize>> = Arc::new(Throttled::new());
        let starts = Arc::new(AtomicUsize::new(0));

        let make = |starts: Arc<AtomicUsize>| {
            move || -> BoxFuture<'static, usize> {
                async move {
                    let n = starts.fetch_add(1, Ordering::SeqCst) + 1;
                    time::sleep(Duration::from_millis(50)).await;
                    n
                }
                .boxed()
            }
        };

        let (a, b) = tokio::join!(throttled.call("k", make(starts.clone())), async {
            time::sleep(Duration::from_millis(10)).await;
            throttled.forget(&"k");
            throttled.call("k", make(starts.clone())).await
        });
        assert_eq!((a, b), (1, 2));
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(throttled.in_flight(), 0);
    }
}
