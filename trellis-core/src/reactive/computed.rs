//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs on creation. The getter runs on first access and the
//!    result is cached.
//!
//! 2. When a dependency is written, the computed is marked pending.
//!
//! 3. On next access, a pending computed checks its dependencies bottom-up.
//!    Only if one of them really changed does the getter run again.
//!
//! 4. If the getter returns a value equal to the cached one, subscribers of
//!    the computed are left alone.
//!
//! # Why This Matters
//!
//! This lazy approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay pending (no wasted work)

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::context::{untrack, FrameKind};
use super::runtime::{Binding, Refresh, Runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{Flags, NodeId};

type Getter<T> = Box<dyn Fn(Option<&T>) -> T>;

struct ComputedInner<T> {
    node: NodeId,
    getter: Getter<T>,
    /// `None` until the getter has completed once.
    value: RefCell<Option<T>>,
}

impl<T: PartialEq> Refresh for ComputedInner<T> {
    fn refresh(&self, rt: &Runtime) -> bool {
        let next = {
            let _pass = rt.tracking_pass(self.node, FrameKind::Computed);
            let previous = self.value.borrow();
            (self.getter)(previous.as_ref())
        };

        let mut value = self.value.borrow_mut();
        let changed = value.as_ref() != Some(&next);
        *value = Some(next);
        changed
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.dispose_node(self.node));
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (a getter can return the same value even if its inputs changed).
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = {
///     let count = count.clone();
///     Computed::new(move || count.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new computed with the given getter.
    ///
    /// The getter is not run immediately. It runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_previous(move |_| getter())
    }

    /// Create a computed whose getter receives the previously cached value.
    pub fn with_previous<F>(getter: F) -> Self
    where
        F: Fn(Option<&T>) -> T + 'static,
    {
        Runtime::with(|rt| {
            let node = rt.register(Flags::MUTABLE | Flags::DIRTY);
            let inner = Rc::new(ComputedInner {
                node,
                getter: Box::new(getter),
                value: RefCell::new(None),
            });
            let weak: Weak<ComputedInner<T>> = Rc::downgrade(&inner);
            let weak: Weak<dyn Refresh> = weak;
            rt.bind(node, Binding::Value(weak));
            Self { inner }
        })
    }

    /// The computed's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if called from inside this computed's own getter.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed's value. If called
    /// inside another computed or effect, that computation subscribes to
    /// this one.
    pub fn try_get(&self) -> Result<T> {
        Runtime::with(|rt| {
            let node = self.inner.node;
            if rt.flags(node).contains(Flags::RECURSED_CHECK) {
                return Err(ReactiveError::CyclicRead { node });
            }

            let cached = self.inner.value.borrow().is_some();
            if (!cached || rt.is_stale(node)) && self.inner.refresh(rt) {
                rt.changed(node);
            }
            rt.track(node);

            Ok(self
                .inner
                .value
                .borrow()
                .clone()
                .expect("refreshed computed should have a value"))
        })
    }

    /// Get the current value without subscribing the running computation.
    pub fn get_untracked(&self) -> T {
        untrack(|| self.get())
    }

    /// Get the number of dependencies read by the last run of the getter.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.dependency_count(self.inner.node))
    }

    /// Get the number of computations subscribed to this computed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.subscriber_count(self.inner.node))
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}
