//! Batching
//!
//! Inside a batch, writes mark the graph and queue effects but nothing runs.
//! The queue is flushed when the outermost batch closes, so an effect that
//! depends on several written signals runs once.

use std::marker::PhantomData;

use tracing::warn;

use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};

/// Open a batch. Batches nest.
pub fn start_batch() {
    Runtime::with(|rt| rt.scheduler().start_batch());
}

/// Close a batch, running queued effects if it was the outermost one.
pub fn end_batch() -> Result<()> {
    Runtime::with(|rt| {
        if rt.scheduler().end_batch()? {
            rt.flush();
        }
        Ok(())
    })
}

/// Run `f` inside a batch.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{batch, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(a.get() + b.get(), 30);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::new();
    f()
}

/// Guard that keeps a batch open until it is dropped.
///
/// If the guard is dropped while panicking, the batch is closed but queued
/// effects are left for the next flush.
pub struct BatchGuard {
    _not_send: PhantomData<*const ()>,
}

impl BatchGuard {
    pub fn new() -> Self {
        start_batch();
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for BatchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let closed = Runtime::try_with(|rt| {
            let outermost = rt.scheduler().end_batch()?;
            if outermost && !std::thread::panicking() {
                rt.flush();
            }
            Ok::<_, ReactiveError>(())
        });
        if let Some(Err(err)) = closed {
            warn!(%err, "batch guard closed an already closed batch");
        }
    }
}
