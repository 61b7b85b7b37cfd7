//! Bounded-concurrency intake queue for inbound events.
//!
//! Generic over one registered async handler; the queue knows nothing
//! about pipelines. The owning process wires the handler to
//! `PipelineEngine` create + run.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify, Semaphore};

use crate::core::DevEvent;
use crate::errors::{PipewrightError, Result};

/// The single async handler the queue feeds accepted events into.
pub type EventHandler = Arc<dyn Fn(DevEvent) -> BoxFuture<'static, ()> + Send + Sync>;

struct QueueInner {
    permits: Arc<Semaphore>,
    handler: RwLock<Option<EventHandler>>,
    // true = pulling new work; false = paused.
    gate: watch::Sender<bool>,
    accepted: AtomicUsize,
    running: AtomicUsize,
    idle: Notify,
}

/// Bounded-concurrency executor over a single registered handler.
///
/// `enqueue` accepts events without blocking; at most `concurrency`
/// handler invocations run simultaneously. `pause` stops new invocations
/// from starting without discarding anything queued; `drain` waits for
/// all accepted work to settle (graceful shutdown: pause the queue, then
/// drain it).
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::with_concurrency(5)
    }
}

impl TaskQueue {
    /// Creates a queue admitting at most `concurrency` concurrent handler
    /// runs. A zero bound is promoted to 1.
    #[must_use]
    pub fn with_concurrency(concurrency: usize) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(QueueInner {
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
                handler: RwLock::new(None),
                gate,
                accepted: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Registers the handler invoked for each accepted event.
    /// Replaces any previously registered handler.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(DevEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        *self.inner.handler.write() = Some(Arc::new(handler));
    }

    /// Submits an event for execution.
    ///
    /// # Errors
    ///
    /// Returns [`PipewrightError::HandlerNotRegistered`] if `on_event`
    /// has not been called; accepting an event with nowhere to send it
    /// would silently lose work.
    pub fn enqueue(&self, event: DevEvent) -> Result<()> {
        let handler = self
            .inner
            .handler
            .read()
            .clone()
            .ok_or(PipewrightError::HandlerNotRegistered)?;

        self.inner.accepted.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut gate = inner.gate.subscribe();
            while !*gate.borrow() {
                if gate.changed().await.is_err() {
                    break;
                }
            }

            // Semaphore is never closed, so acquire cannot fail.
            let Ok(permit) = inner.permits.clone().acquire_owned().await else {
                return;
            };
            inner.running.fetch_add(1, Ordering::SeqCst);
            handler(event).await;
            drop(permit);

            inner.running.fetch_sub(1, Ordering::SeqCst);
            if inner.accepted.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
        Ok(())
    }

    /// Stops new handler invocations from starting. Running invocations
    /// finish; queued events stay queued.
    pub fn pause(&self) {
        self.inner.gate.send_replace(false);
    }

    /// Resumes pulling queued work after a `pause`.
    pub fn start(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Waits until every accepted event has been handled.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.accepted.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Events accepted and not yet finished (queued + running).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.accepted.load(Ordering::SeqCst)
    }

    /// Returns true if no accepted work remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handler invocations currently executing.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventCategory, EventSource, ProjectRef};
    use futures::FutureExt;
    use std::time::Duration;

    fn test_event(id: &str) -> DevEvent {
        DevEvent::new(
            id,
            EventSource::Gitlab,
            EventCategory::Manual,
            ProjectRef::new("p1", "demo", "git@example.com:demo.git", "main"),
        )
    }

    #[tokio::test]
    async fn test_enqueue_without_handler_is_rejected() {
        let queue = TaskQueue::with_concurrency(2);
        let err = queue.enqueue(test_event("e1")).unwrap_err();
        assert!(matches!(err, PipewrightError::HandlerNotRegistered));
    }

    #[tokio::test]
    async fn test_handler_runs_for_each_event() {
        let queue = TaskQueue::with_concurrency(2);
        let count = Arc::new(AtomicUsize::new(0));
        let count_in = Arc::clone(&count);
        queue.on_event(move |_event| {
            let count = Arc::clone(&count_in);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        for i in 0..8 {
            queue.enqueue(test_event(&format!("e{i}"))).unwrap();
        }
        queue.drain().await;
        assert_eq!(count.load(Ordering::SeqCst), 8);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let queue = TaskQueue::with_concurrency(3);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let (active_in, max_in) = (Arc::clone(&active), Arc::clone(&max_seen));
        queue.on_event(move |_event| {
            let active = Arc::clone(&active_in);
            let max_seen = Arc::clone(&max_in);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed()
        });

        for i in 0..12 {
            queue.enqueue(test_event(&format!("e{i}"))).unwrap();
        }
        queue.drain().await;
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_pause_holds_queued_work() {
        let queue = TaskQueue::with_concurrency(2);
        let count = Arc::new(AtomicUsize::new(0));
        let count_in = Arc::clone(&count);
        queue.on_event(move |_event| {
            let count = Arc::clone(&count_in);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        queue.pause();
        for i in 0..4 {
            queue.enqueue(test_event(&format!("e{i}"))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 4);

        queue.start();
        queue.drain().await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_drain_on_idle_queue_returns_immediately() {
        let queue = TaskQueue::with_concurrency(1);
        queue.drain().await;
    }
}
