use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::reorder_buffer::SharedOperation;

/// Default batch size for draining a pipeline queue (spec.md §4.2).
pub const DEFAULT_BATCH_CAP: usize = 16;

/// A single stage's work queue: pushed to by whatever stage precedes
/// it, drained in FIFO batches by the stage itself. One mutex per
/// queue (not one per context) so draining stage N doesn't block a
/// concurrent push into stage N+1's queue.
pub struct PipelineQueue<T> {
    inner: Mutex<VecDeque<T>>,
    batch_cap: usize,
}

impl<T> PipelineQueue<T> {
    pub fn new() -> Self {
        PipelineQueue {
            inner: Mutex::new(VecDeque::new()),
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }

    pub fn with_batch_cap(batch_cap: usize) -> Self {
        PipelineQueue {
            inner: Mutex::new(VecDeque::new()),
            batch_cap,
        }
    }

    pub fn push(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Pop up to `batch_cap` items in FIFO order. Returns fewer if the
    /// queue has less than a full batch available.
    pub fn drain_batch(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        let take = inner.len().min(self.batch_cap);
        inner.drain(..take).collect()
    }
}

impl<T> Default for PipelineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One queue per pipeline stage, owned exclusively by a context
/// (spec.md §3, Ownership). The executing→executed→complete→committed
/// flow moves an operation handle from one queue to the next as its
/// gating event resolves.
pub struct PipelineQueues {
    pub executing: PipelineQueue<SharedOperation>,
    pub executed: PipelineQueue<SharedOperation>,
    pub complete: PipelineQueue<SharedOperation>,
    pub committed: PipelineQueue<SharedOperation>,
}

impl PipelineQueues {
    pub fn new() -> Self {
        PipelineQueues {
            executing: PipelineQueue::new(),
            executed: PipelineQueue::new(),
            complete: PipelineQueue::new(),
            committed: PipelineQueue::new(),
        }
    }
}

impl Default for PipelineQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_batch_caps_at_the_configured_size() {
        let queue: PipelineQueue<u32> = PipelineQueue::with_batch_cap(4);
        for i in 0..10 {
            queue.push(i);
        }
        let first = queue.drain_batch();
        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(queue.len(), 6);
    }

    #[test]
    fn drain_batch_returns_fewer_items_when_queue_is_short() {
        let queue: PipelineQueue<u32> = PipelineQueue::with_batch_cap(16);
        queue.push(1);
        queue.push(2);
        let batch = queue.drain_batch();
        assert_eq!(batch, vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn default_batch_cap_is_sixteen() {
        let queue: PipelineQueue<u32> = PipelineQueue::new();
        for i in 0..20 {
            queue.push(i);
        }
        let batch = queue.drain_batch();
        assert_eq!(batch.len(), DEFAULT_BATCH_CAP);
    }
}
