//! Per-project mutual exclusion with FIFO-fair handoff.
//!
//! One project never has two pipelines mutating its workspace or shared
//! branches concurrently. Contention is per key: pipelines for distinct
//! projects never serialize on each other.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Default)]
struct KeyState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Default)]
struct LockTable {
    keys: Mutex<HashMap<String, KeyState>>,
}

/// Keyed async mutex granting exclusive access per project id.
///
/// `acquire` returns an RAII [`ProjectGuard`]; dropping the guard releases
/// the lock, so every exit path of a holder (including error returns)
/// releases. Waiters for the same key are granted strictly in arrival
/// order: release hands the lock directly to the oldest waiter still
/// listening.
#[derive(Clone, Default)]
pub struct ProjectLock {
    table: Arc<LockTable>,
}

impl ProjectLock {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder exists for `project_id`, then grants
    /// exclusive access until the returned guard is dropped.
    pub async fn acquire(&self, project_id: &str) -> ProjectGuard {
        let waiter = {
            let mut keys = self.table.keys.lock();
            let state = keys.entry(project_id.to_string()).or_default();
            if state.held {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.held = true;
                None
            }
        };

        if let Some(rx) = waiter {
            // The releasing holder keeps `held` set and sends ownership
            // directly, so no third party can barge in between.
            let _ = rx.await;
        }

        ProjectGuard {
            table: Arc::clone(&self.table),
            key: project_id.to_string(),
        }
    }

    /// Returns true if some holder currently owns `project_id`.
    #[must_use]
    pub fn is_locked(&self, project_id: &str) -> bool {
        self.table
            .keys
            .lock()
            .get(project_id)
            .is_some_and(|state| state.held)
    }

    /// Number of acquirers currently queued behind the holder.
    #[must_use]
    pub fn waiter_count(&self, project_id: &str) -> usize {
        self.table
            .keys
            .lock()
            .get(project_id)
            .map_or(0, |state| state.waiters.len())
    }
}

/// Exclusive hold on one project id; releases on drop.
pub struct ProjectGuard {
    table: Arc<LockTable>,
    key: String,
}

impl ProjectGuard {
    /// The project id this guard holds.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.key
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        let mut keys = self.table.keys.lock();
        let Some(state) = keys.get_mut(&self.key) else {
            return;
        };
        // Hand off to the oldest waiter whose receiver is still alive;
        // cancelled waiters are skipped.
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        keys.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let lock = ProjectLock::new();
        assert!(!lock.is_locked("p1"));

        let guard = lock.acquire("p1").await;
        assert!(lock.is_locked("p1"));
        assert_eq!(guard.project_id(), "p1");

        drop(guard);
        assert!(!lock.is_locked("p1"));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let lock = ProjectLock::new();
        let _g1 = lock.acquire("p1").await;
        // Would hang if p2 contended with p1.
        let _g2 = lock.acquire("p2").await;
        assert!(lock.is_locked("p1"));
        assert!(lock.is_locked("p2"));
    }

    #[tokio::test]
    async fn test_mutual_exclusion_no_overlap() {
        let lock = ProjectLock::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lock = lock.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = lock.acquire("busy").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiters_granted_in_arrival_order() {
        let lock = ProjectLock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let holder = lock.acquire("p1").await;

        let mut handles = Vec::new();
        for i in 0..5usize {
            let task_lock = lock.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _guard = task_lock.acquire("p1").await;
                order.lock().push(i);
            }));
            // Give each task time to enqueue before the next arrives.
            while lock.waiter_count("p1") <= i {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        assert_eq!(lock.waiter_count("p1"), 5);
        drop(holder);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let lock = ProjectLock::new();
        let holder = lock.acquire("p1").await;

        let abandoned = {
            let lock = lock.clone();
            tokio::spawn(async move {
                let _guard = lock.acquire("p1").await;
            })
        };
        while lock.waiter_count("p1") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        abandoned.abort();
        let _ = abandoned.await;

        drop(holder);
        // The abandoned waiter must not strand the key as held.
        let _guard = lock.acquire("p1").await;
    }
}
