//! Generic bounded concurrent executor.
//!
//! Accepts opaque units of work, runs up to `max_concurrent` of them at once,
//! queues the rest FIFO (stable-ordered by priority, highest first), and
//! enforces a per-task deadline. Modeled on the orchestrator's
//! semaphore-plus-mpsc dispatch loop, generalized into a reusable pool.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, Notify, Semaphore, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// A unit of work submitted to a [`WorkerPool`].
pub struct PoolTask {
    pub id: Uuid,
    pub priority: i32,
    pub timeout: Option<Duration>,
    pub body: Pin<Box<dyn Future<Output = Result<()>> + Send>>,
}

struct QueuedTask {
    task: PoolTask,
    seq: u64,
    reply: oneshot::Sender<Result<()>>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// Higher priority first; among equal priorities, earlier submission
    /// (smaller `seq`) first — a stable FIFO priority queue.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Configuration for one named pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    pub default_timeout: Duration,
}

/// Handle returned by [`WorkerPool::submit`]; await it for the task's
/// outcome, or use its id with [`WorkerPool::cancel_queued`].
pub struct SubmitHandle {
    pub id: Uuid,
    result: oneshot::Receiver<Result<()>>,
}

impl Future for SubmitHandle {
    type Output = Result<()>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match Pin::new(&mut self.result).poll(cx) {
            std::task::Poll::Ready(Ok(result)) => std::task::Poll::Ready(result),
            std::task::Poll::Ready(Err(_)) => {
                std::task::Poll::Ready(Err(EngineError::Cancelled(self.id)))
            }
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

/// A bounded concurrent executor, identified by `name` for logging.
pub struct WorkerPool {
    name: String,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    queue: Arc<Mutex<BinaryHeap<QueuedTask>>>,
    notify: Arc<Notify>,
    next_seq: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            name: name.into(),
            config,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            queue: Arc::new(Mutex::new(BinaryHeap::new())),
            notify: Arc::new(Notify::new()),
            next_seq: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        });
        pool.clone().spawn_dispatcher();
        pool
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue (or immediately start) a task. Returns a handle that resolves
    /// to the task's result once it runs, or `Cancelled` if it is removed
    /// from the queue first.
    pub async fn submit(&self, task: PoolTask) -> SubmitHandle {
        let id = task.id;
        let (reply_tx, reply_rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) as u64;

        let mut queue = self.queue.lock().await;
        queue.push(QueuedTask {
            task,
            seq,
            reply: reply_tx,
        });
        drop(queue);
        self.notify.notify_one();

        SubmitHandle {
            id,
            result: reply_rx,
        }
    }

    /// Remove a still-queued task, resolving its handle with `Cancelled`.
    /// Returns `false` if the task is already running or not found.
    pub async fn cancel_queued(&self, task_id: Uuid) -> bool {
        let mut queue = self.queue.lock().await;
        let mut rest = BinaryHeap::new();
        let mut found = None;
        for entry in queue.drain() {
            if found.is_none() && entry.task.id == task_id {
                found = Some(entry);
            } else {
                rest.push(entry);
            }
        }
        *queue = rest;
        drop(queue);

        if let Some(entry) = found {
            let _ = entry.reply.send(Err(EngineError::Cancelled(task_id)));
            true
        } else {
            false
        }
    }

    /// Stop accepting dispatch. If `drain` is true, waits for in-flight
    /// tasks to finish; otherwise returns immediately and lets them run to
    /// completion in the background (cancellation is cooperative, so
    /// already-running bodies are not forcibly killed).
    pub async fn shutdown(&self, drain: bool) {
        self.shutdown.cancel();
        if drain {
            while self.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    fn spawn_dispatcher(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                if self.shutdown.is_cancelled() {
                    return;
                }

                let next = {
                    let mut queue = self.queue.lock().await;
                    queue.pop()
                };

                let Some(queued) = next else {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                        _ = self.shutdown.cancelled() => return,
                    }
                    continue;
                };

                let permit = match self.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let in_flight = self.in_flight.clone();
                in_flight.fetch_add(1, Ordering::SeqCst);

                let timeout = queued.task.timeout.unwrap_or(self.config.default_timeout);
                let task_id = queued.task.id;
                let body = queued.task.body;
                let reply = queued.reply;

                tokio::spawn(async move {
                    let guarded = AssertUnwindSafe(body).catch_unwind();
                    let outcome = match tokio::time::timeout(timeout, guarded).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(panic)) => Err(EngineError::TaskPanicked {
                            task: task_id.to_string(),
                            message: panic_message(&panic),
                        }),
                        Err(_) => Err(EngineError::Timeout {
                            task: task_id.to_string(),
                            elapsed_ms: timeout.as_millis() as u64,
                        }),
                    };
                    drop(permit);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = reply.send(outcome);
                });
            }
        });
    }
}

/// Extracts a human-readable message from a caught panic payload.
fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    fn task(id: Uuid, priority: i32, body: Pin<Box<dyn Future<Output = Result<()>> + Send>>) -> PoolTask {
        PoolTask {
            id,
            priority,
            timeout: None,
            body,
        }
    }

    #[tokio::test]
    async fn runs_a_single_task_to_completion() {
        let pool = WorkerPool::new(
            "test",
            PoolConfig {
                max_concurrent: 2,
                default_timeout: Duration::from_secs(5),
            },
        );
        let handle = pool
            .submit(task(Uuid::new_v4(), 0, Box::pin(async { Ok(()) })))
            .await;
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrent() {
        let max_concurrent = 2usize;
        let pool = WorkerPool::new(
            "test",
            PoolConfig {
                max_concurrent,
                default_timeout: Duration::from_secs(5),
            },
        );
        let observed_max = Arc::new(StdAtomicUsize::new(0));
        let current = Arc::new(StdAtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let observed_max = observed_max.clone();
            let current = current.clone();
            let body: Pin<Box<dyn Future<Output = Result<()>> + Send>> = Box::pin(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                observed_max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
            handles.push(pool.submit(task(Uuid::new_v4(), 0, body)).await);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(observed_max.load(Ordering::SeqCst) <= max_concurrent);
    }

    #[tokio::test]
    async fn task_exceeding_its_deadline_times_out() {
        let pool = WorkerPool::new(
            "test",
            PoolConfig {
                max_concurrent: 1,
                default_timeout: Duration::from_millis(10),
            },
        );
        let handle = pool
            .submit(task(
                Uuid::new_v4(),
                0,
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }),
            ))
            .await;
        let result = handle.await;
        assert!(matches!(result, Err(EngineError::Timeout { .. })));
    }

    #[tokio::test]
    async fn a_panicking_task_resolves_failed_and_does_not_leak_its_slot() {
        let pool = WorkerPool::new(
            "test",
            PoolConfig {
                max_concurrent: 1,
                default_timeout: Duration::from_secs(5),
            },
        );
        let handle = pool
            .submit(task(
                Uuid::new_v4(),
                0,
                Box::pin(async { panic!("boom") }),
            ))
            .await;
        let result = handle.await;
        assert!(matches!(result, Err(EngineError::TaskPanicked { .. })));

        // The panic must not have leaked the in-flight slot or the permit;
        // a second task submitted right after should still be able to run.
        let handle2 = pool
            .submit(task(Uuid::new_v4(), 0, Box::pin(async { Ok(()) })))
            .await;
        assert!(handle2.await.is_ok());
    }

    #[tokio::test]
    async fn cancel_queued_removes_a_task_before_it_starts() {
        let pool = WorkerPool::new(
            "test",
            PoolConfig {
                max_concurrent: 1,
                default_timeout: Duration::from_secs(5),
            },
        );
        // Occupy the only slot with a long task.
        let blocker_id = Uuid::new_v4();
        let _blocker = pool
            .submit(task(
                blocker_id,
                0,
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                }),
            ))
            .await;

        let queued_id = Uuid::new_v4();
        let handle = pool.submit(task(queued_id, 0, Box::pin(async { Ok(()) }))).await;

        // Give the dispatcher a moment to move the blocker into flight.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancelled = pool.cancel_queued(queued_id).await;
        assert!(cancelled);
        assert!(matches!(handle.await, Err(EngineError::Cancelled(id)) if id == queued_id));
    }
}
