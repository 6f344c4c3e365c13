//! Supervised queue for fire-and-forget tier repairs.
//!
//! Backfills (and the other post-response side effects) run detached from
//! the request that produced them: the caller never waits and never sees
//! their errors. Concurrency is bounded by a worker semaphore and the queue
//! itself is bounded; when it overflows, new tasks are dropped with a
//! warning rather than blocking a request.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, Semaphore};

use strata_core::error::DriverResult;

type Job = (&'static str, Pin<Box<dyn Future<Output = DriverResult<()>> + Send>>);

/// Handle for enqueueing background tier writes.
#[derive(Clone)]
pub struct BackfillQueue {
    tx: mpsc::Sender<Job>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl BackfillQueue {
    /// Start the dispatcher with `workers` concurrent task slots and a
    /// queue bound of `capacity`.
    pub fn start(workers: usize, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));

        let dispatcher_pending = pending.clone();
        let dispatcher_idle = idle.clone();
        tokio::spawn(async move {
            while let Some((label, job)) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let pending = dispatcher_pending.clone();
                let idle = dispatcher_idle.clone();
                tokio::spawn(async move {
                    if let Err(e) = job.await {
                        tracing::warn!(task = label, error = %e, "background task failed");
                    }
                    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                        idle.notify_waiters();
                    }
                    drop(permit);
                });
            }
        });

        BackfillQueue { tx, pending, idle }
    }

    /// Enqueue a task. Never blocks; on a full queue the task is dropped
    /// and a warning logged.
    pub fn enqueue<F>(&self, label: &'static str, job: F)
    where
        F: Future<Output = DriverResult<()>> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.try_send((label, Box::pin(job))).is_err() {
            if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.idle.notify_waiters();
            }
            tracing::warn!(task = label, "backfill queue full, dropping task");
        }
    }

    /// Number of tasks enqueued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every enqueued task has finished. Used at shutdown and by
    /// tests that observe backfill effects.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tasks_run_and_drain() {
        let queue = BackfillQueue::start(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            queue.enqueue("test", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        queue.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let queue = BackfillQueue::start(1, 4);
        queue.enqueue("failing", async {
            Err(strata_core::error::DriverError::Backend("boom".into()))
        });
        queue.enqueue("after", async { Ok(()) });
        queue.drain().await;
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let queue = BackfillQueue::start(1, 16);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let running = running.clone();
            let peak = peak.clone();
            queue.enqueue("slot", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        queue.drain().await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overflow_drops_instead_of_blocking() {
        let queue = BackfillQueue::start(1, 1);
        for _ in 0..64 {
            queue.enqueue("burst", async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(())
            });
        }
        // Must not deadlock; whatever was accepted completes.
        queue.drain().await;
        assert_eq!(queue.pending(), 0);
    }
}
