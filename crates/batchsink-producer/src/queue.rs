// FIFO queue of closed batches awaiting dispatch

use std::collections::VecDeque;

use batchsink_core::{Batch, BatchId};
use parking_lot::Mutex;
use tokio::sync::Notify;

struct QueueState<R> {
    batches: VecDeque<Batch<R>>,
    closed: bool,
}

/// Ordered queue shared by the producer (push side) and dispatcher workers.
///
/// Once closed, pushes are refused but queued batches can still be popped.
pub struct DispatchQueue<R> {
    state: Mutex<QueueState<R>>,
    available: Notify,
}

impl<R> DispatchQueue<R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                batches: VecDeque::new(),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Append a batch; hands it back if the queue is closed.
    pub fn push(&self, batch: Batch<R>) -> Result<(), Batch<R>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(batch);
            }
            debug_assert!(
                state.batches.iter().all(|queued| queued.id() != batch.id()),
                "batch {} queued twice",
                batch.id()
            );
            state.batches.push_back(batch);
        }
        self.available.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<Batch<R>> {
        self.state.lock().batches.pop_front()
    }

    /// Wait for the next batch. Returns `None` once closed and empty.
    pub async fn next(&self) -> Option<Batch<R>> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(batch) = state.batches.pop_front() {
                    return Some(batch);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Remove every queued batch without dispatching it.
    pub fn drain(&self) -> Vec<Batch<R>> {
        self.state.lock().batches.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_ids(&self) -> Vec<BatchId> {
        self.state.lock().batches.iter().map(|b| b.id()).collect()
    }
}

impl<R> Default for DispatchQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchsink_core::CompletionHandle;
    use std::sync::Arc;
    use std::time::Duration;

    fn batch(id: u64) -> Batch<u32> {
        Batch::new(
            BatchId::new(id),
            Arc::from("t"),
            vec![id as u32],
            1,
            CompletionHandle::new(),
        )
    }

    #[test]
    fn test_fifo_order() {
        let queue = DispatchQueue::new();
        for id in 1..=3 {
            queue.push(batch(id)).unwrap();
        }
        assert_eq!(
            queue.batch_ids(),
            vec![BatchId::new(1), BatchId::new(2), BatchId::new(3)]
        );
        assert_eq!(queue.pop().unwrap().id(), BatchId::new(1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_closed_queue_refuses_push_but_drains() {
        let queue = DispatchQueue::new();
        queue.push(batch(1)).unwrap();
        queue.close();

        let refused = queue.push(batch(2)).unwrap_err();
        assert_eq!(refused.id(), BatchId::new(2));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_next_wakes_on_push_and_close() {
        let queue = Arc::new(DispatchQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(batch) = queue.next().await {
                    seen.push(batch.id());
                }
                seen
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(batch(1)).unwrap();
        queue.push(batch(2)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        let seen = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, vec![BatchId::new(1), BatchId::new(2)]);
    }
}
