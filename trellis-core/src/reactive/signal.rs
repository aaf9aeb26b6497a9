//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read inside a computed or effect, that computation
//!    becomes a subscriber of the signal's node.
//!
//! 2. When a signal is written, the new value is stored immediately and
//!    every node downstream is marked pending.
//!
//! 3. The write is *committed* on the next read (or the next time a
//!    subscriber checks whether it is stale). Committing compares against
//!    the value seen before the first uncommitted write, so writing `2` and
//!    then `1` back to a signal holding `1` counts as no change at all.
//!
//! # Ownership
//!
//! Clones of a signal share one node. The node is removed from the graph
//! when the last clone is dropped.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::runtime::{Binding, Refresh, Runtime};
use crate::graph::{Flags, NodeId, ReactiveSystem};

struct SignalInner<T> {
    node: NodeId,
    value: RefCell<T>,
    /// Value before the first uncommitted write, if there is one.
    committed: RefCell<Option<T>>,
}

impl<T: PartialEq> Refresh for SignalInner<T> {
    fn refresh(&self, rt: &Runtime) -> bool {
        rt.graph().borrow_mut().set_flags(self.node, Flags::MUTABLE);
        match self.committed.borrow_mut().take() {
            Some(old) => old != *self.value.borrow(),
            None => false,
        }
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.dispose_node(self.node));
    }
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. `PartialEq` decides
///   whether a write is a change; `Clone` is needed to hand values out.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (marks subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Runtime::with(|rt| {
            let node = rt.register(Flags::MUTABLE);
            let inner = Rc::new(SignalInner {
                node,
                value: RefCell::new(value),
                committed: RefCell::new(None),
            });
            let weak: Weak<SignalInner<T>> = Rc::downgrade(&inner);
            let weak: Weak<dyn Refresh> = weak;
            rt.bind(node, Binding::Value(weak));
            Self { inner }
        })
    }

    /// The signal's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Get the current value.
    ///
    /// If called inside a computed or effect, this also registers that
    /// computation as a subscriber.
    pub fn get(&self) -> T {
        Runtime::with(|rt| {
            let node = self.inner.node;
            if rt.flags(node).contains(Flags::DIRTY) && self.inner.refresh(rt) {
                rt.changed(node);
            }
            rt.track(node);
        });
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value.
    ///
    /// Writing a value equal to the current one does nothing. Otherwise
    /// everything downstream is marked and, outside a batch, queued effects
    /// run before this returns.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            let old = std::mem::replace(&mut *current, value);
            self.inner.committed.borrow_mut().get_or_insert(old);
        }
        Runtime::with(|rt| rt.write(self.inner.node));
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked();
        self.set(f(&current));
    }

    /// Get the number of computations that read this signal in their last run.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.subscriber_count(self.inner.node))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
