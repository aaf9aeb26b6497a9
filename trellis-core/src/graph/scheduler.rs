//! Effect Scheduler
//!
//! The scheduler decides when notified effects run. It owns two pieces of
//! state:
//!
//! 1. A batch depth counter. While it is non-zero, writes only mark the
//!    graph and queue effects.
//! 2. A FIFO queue of effects waiting to run. Draining it may queue more
//!    effects, which run in the same drain.
//!
//! Running the effects is the runtime's job; the scheduler only keeps order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use super::NodeId;
use crate::error::{ReactiveError, Result};

/// Batch depth plus the queue of effects waiting to run.
#[derive(Debug, Default)]
pub struct Scheduler {
    depth: Cell<u32>,
    queue: RefCell<VecDeque<NodeId>>,
}

impl Scheduler {
    /// Create an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a batch. Batches nest.
    pub fn start_batch(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Close a batch.
    ///
    /// Returns `Ok(true)` when the outermost batch was closed and the queue
    /// should be flushed.
    pub fn end_batch(&self) -> Result<bool> {
        let depth = self.depth.get();
        if depth == 0 {
            return Err(ReactiveError::UnbalancedBatch);
        }
        self.depth.set(depth - 1);
        Ok(depth == 1)
    }

    /// Whether a batch is currently open.
    pub fn is_batching(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn batch_depth(&self) -> u32 {
        self.depth.get()
    }

    /// Append an effect to the back of the queue.
    pub fn enqueue(&self, node: NodeId) {
        self.queue.borrow_mut().push_back(node);
    }

    /// Take the effect at the front of the queue.
    pub fn dequeue(&self) -> Option<NodeId> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
