//! Collapses concurrent identical operations into one.
//! The first caller for a key spawns the operation as its own task and
//! registers a shared handle to it; later callers for the same key await that
//! handle and receive a clone of its output. The task runs to completion even
//! if every caller goes away, and removes its registration as soon as it
//! settles, whatever the outcome, so the next call starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::error;

type InFlight<T> = Shared<BoxFuture<'static, Result<T, Aborted>>>;

/// The spawned operation ended without producing an output (it panicked or
/// the runtime shut down under it).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("in-flight operation aborted: {0}")]
pub struct Aborted(String);

pub struct Deduplicator<K, T: Clone> {
    pending: Arc<Mutex<HashMap<K, (u64, InFlight<T>)>>>,
    next_id: AtomicU64,
}

/// Whether a call started the operation or joined one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl<K, T> Deduplicator<K, T>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `operation` for `key`, or join the run already in flight.
    /// `operation` is only invoked by the leader. Must be called from within
    /// a tokio runtime.
    pub async fn run<F, Fut>(&self, key: K, operation: F) -> (Result<T, Aborted>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (shared, role) = {
            let mut pending = self.pending.lock();
            if let Some((_, shared)) = pending.get(&key) {
                (shared.clone(), Role::Follower)
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.pending);
                let registered_key = key.clone();
                let fut = operation();
                let handle = tokio::spawn(async move {
                    let _registration = Registration {
                        registry,
                        key: registered_key,
                        id,
                    };
                    fut.await
                });
                let shared = handle
                    .map(|joined| {
                        joined.map_err(|e| {
                            error!(error = %e, "in-flight operation aborted");
                            Aborted(e.to_string())
                        })
                    })
                    .boxed()
                    .shared();
                pending.insert(key, (id, shared.clone()));
                (shared, Role::Leader)
            }
        };
        (shared.await, role)
    }

    /// Number of keys with an operation currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Removes the run's entry when the spawned task finishes or unwinds.
/// A newer run registered under the same key is left alone.
struct Registration<K: Hash + Eq, T: Clone> {
    registry: Arc<Mutex<HashMap<K, (u64, InFlight<T>)>>>,
    key: K,
    id: u64,
}

impl<K: Hash + Eq, T: Clone> Drop for Registration<K, T> {
    fn drop(&mut self) {
        let mut pending = self.registry.lock();
        if matches!(pending.get(&self.key), Some((owner, _)) if *owner == self.id) {
            pending.remove(&self.key);
        }
    }
}

impl<K, T> Default for Deduplicator<K, T>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    async fn slow_op(calls: Arc<AtomicUsize>, output: Result<u32, String>) -> Result<u32, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        output
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_run() {
        let dedup: Deduplicator<&str, Result<u32, String>> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run("k", || slow_op(Arc::clone(&calls), Ok(7))),
            dedup.run("k", || slow_op(Arc::clone(&calls), Ok(8))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.0, Ok(Ok(7)));
        assert_eq!(b.0, Ok(Ok(7)));
        assert_eq!((a.1, b.1), (Role::Leader, Role::Follower));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_shared_and_cleared() {
        let dedup: Deduplicator<&str, Result<u32, String>> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run("k", || slow_op(Arc::clone(&calls), Err("boom".into()))),
            dedup.run("k", || slow_op(Arc::clone(&calls), Ok(1))),
        );
        assert_eq!(a.0, Ok(Err("boom".to_string())));
        assert_eq!(b.0, Ok(Err("boom".to_string())));
        assert_eq!(dedup.in_flight(), 0);

        let (c, role) = dedup.run("k", || slow_op(Arc::clone(&calls), Ok(2))).await;
        assert_eq!(c, Ok(Ok(2)));
        assert_eq!(role, Role::Leader);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_run_independently() {
        let dedup: Deduplicator<&str, Result<u32, String>> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run("a", || slow_op(Arc::clone(&calls), Ok(1))),
            dedup.run("b", || slow_op(Arc::clone(&calls), Ok(2))),
        );
        assert_eq!((a.0, b.0), (Ok(Ok(1)), Ok(Ok(2))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_completes_and_deregisters_without_waiters() {
        let dedup: Deduplicator<&str, Result<u32, String>> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&finished);
        let counted = Arc::clone(&calls);
        let first = dedup.run("k", move || async move {
            let out = slow_op(counted, Ok(3)).await;
            done.fetch_add(1, Ordering::SeqCst);
            out
        });
        // Start the run, then drop the only waiter.
        let _ = tokio::time::timeout(Duration::from_millis(1), first).await;
        assert_eq!(dedup.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);

        let (out, role) = dedup.run("k", || slow_op(Arc::clone(&calls), Ok(4))).await;
        assert_eq!((out, role), (Ok(Ok(4)), Role::Leader));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_operation_reports_aborted() {
        let dedup: Deduplicator<&str, Result<u32, String>> = Deduplicator::new();
        let (out, _) = dedup
            .run("k", || async {
                if true {
                    panic!("operation blew up");
                }
                Ok(0)
            })
            .await;
        assert!(out.is_err());
        assert_eq!(dedup.in_flight(), 0);
    }
}
