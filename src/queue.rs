use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::task::{RetryRecord, Task};

/// Snapshot of the queue's cumulative counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Total tasks ever admitted (not current depth).
    pub queued: u64,
    pub processed: u64,
    pub failed: u64,
}

/// Bounded in-memory task queue shared by all workers.
///
/// The pending FIFO holds tasks awaiting computation; the retry FIFO holds
/// proofs awaiting re-submission. A task is never in both at once: retry
/// records are created only after a task has left the pending FIFO. All
/// operations are safe to call from concurrent tasks through an `Arc`.
#[derive(Debug)]
pub struct TaskQueue {
    pending: Mutex<VecDeque<Task>>,
    capacity: usize,
    retry: Mutex<VecDeque<RetryRecord>>,
    retry_capacity: usize,
    retry_space: Notify,
    queued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl TaskQueue {
    pub fn new(capacity: usize, retry_capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            retry: Mutex::new(VecDeque::with_capacity(retry_capacity.min(1024))),
            retry_capacity,
            retry_space: Notify::new(),
            queued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Admit a task. Returns false without modifying anything when the
    /// pending FIFO is at capacity; the caller treats that as a drop, not an
    /// error, so the fetch loop never stalls on a slow consumer.
    pub fn enqueue(&self, task: Task) -> bool {
        let mut pending = self.pending.lock().expect("queue lock poisoned");
        if pending.len() >= self.capacity {
            return false;
        }
        pending.push_back(task);
        self.queued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Take the oldest pending task, or None immediately when empty.
    /// Consumers poll with a short sleep so cancellation stays prompt.
    pub fn dequeue(&self) -> Option<Task> {
        self.pending.lock().expect("queue lock poisoned").pop_front()
    }

    /// Current pending depth (not the cumulative `queued` counter).
    pub fn len(&self) -> usize {
        self.pending.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Park a failed submission for retry. Blocks (asynchronously) while the
    /// retry FIFO is full: the retry path favors durability of the computed
    /// proof over liveness of the producer.
    pub async fn enqueue_retry(&self, record: RetryRecord) {
        let mut record = Some(record);
        loop {
            {
                let mut retry = self.retry.lock().expect("retry lock poisoned");
                if retry.len() < self.retry_capacity {
                    retry.push_back(record.take().expect("record consumed twice"));
                    return;
                }
            }
            self.retry_space.notified().await;
        }
    }

    /// Non-blocking take from the retry FIFO, used by the periodic drainer.
    pub fn try_dequeue_retry(&self) -> Option<RetryRecord> {
        let popped = self.retry.lock().expect("retry lock poisoned").pop_front();
        if popped.is_some() {
            self.retry_space.notify_one();
        }
        popped
    }

    pub fn retry_len(&self) -> usize {
        self.retry.lock().expect("retry lock poisoned").len()
    }

    pub fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter snapshot. Individual counters are atomic; no cross-counter
    /// ordering is guaranteed relative to concurrent mutators.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task::new(id.into(), "prog".into(), vec![1, 2, 3], "node".into())
    }

    #[test]
    fn enqueue_respects_capacity() {
        let q = TaskQueue::new(2, 10);
        assert!(q.enqueue(task("a")));
        assert!(q.enqueue(task("b")));
        assert!(!q.enqueue(task("c")));
        assert_eq!(q.len(), 2);
        assert_eq!(q.stats().queued, 2);
    }

    #[test]
    fn queued_counts_only_admitted_tasks() {
        let q = TaskQueue::new(1, 10);
        assert!(q.enqueue(task("a")));
        assert!(!q.enqueue(task("b")));
        assert!(!q.enqueue(task("c")));
        let _ = q.dequeue();
        assert!(q.enqueue(task("d")));
        assert_eq!(q.stats().queued, 2);
    }

    #[test]
    fn dequeue_is_fifo_and_nonblocking() {
        let q = TaskQueue::new(10, 10);
        assert!(q.dequeue().is_none());
        q.enqueue(task("a"));
        q.enqueue(task("b"));
        assert_eq!(q.dequeue().unwrap().task_id, "a");
        assert_eq!(q.dequeue().unwrap().task_id, "b");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn outcome_counters() {
        let q = TaskQueue::new(10, 10);
        q.mark_processed();
        q.mark_processed();
        q.mark_failed();
        let s = q.stats();
        assert_eq!(s.processed, 2);
        assert_eq!(s.failed, 1);
    }

    #[tokio::test]
    async fn retry_enqueue_blocks_until_space_frees() {
        use std::sync::Arc;
        use std::time::Duration;

        let q = Arc::new(TaskQueue::new(10, 1));
        q.enqueue_retry(RetryRecord {
            task: task("a"),
            proof: vec![0xaa],
            retry_count: 1,
        })
        .await;

        let q2 = q.clone();
        let blocked = tokio::spawn(async move {
            q2.enqueue_retry(RetryRecord {
                task: task("b"),
                proof: vec![0xbb],
                retry_count: 1,
            })
            .await;
        });

        // The second enqueue must not complete while the FIFO is full.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        let drained = q.try_dequeue_retry().unwrap();
        assert_eq!(drained.task.task_id, "a");

        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("enqueue_retry should unblock once space frees")
            .unwrap();
        assert_eq!(q.try_dequeue_retry().unwrap().task.task_id, "b");
    }
}
