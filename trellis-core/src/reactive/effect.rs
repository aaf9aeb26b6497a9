//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. Queued effects run
//!    once propagation has finished and no batch is open.
//!
//! 3. Before re-running, the effect confirms that a dependency really
//!    changed. Each run tracks a fresh set of dependencies; the ones not
//!    read again are dropped.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Ownership
//!
//! An effect created while another effect (or an [`EffectScope`]) is running
//! belongs to it. It is disposed when its owner re-runs or is disposed.
//! Effects created anywhere else live until [`Effect::dispose`] is called;
//! dropping the handle does not stop them.
//!
//! [`EffectScope`]: super::EffectScope

use std::cell::Cell;
use std::fmt::Debug;
use std::rc::Rc;

use super::context::FrameKind;
use super::runtime::{Binding, Runtime};
use crate::graph::{Flags, NodeId};

/// The part of an effect the runtime keeps alive.
pub(crate) struct EffectInner {
    node: NodeId,
    run: Box<dyn Fn()>,
    runs: Cell<usize>,
}

impl EffectInner {
    /// Run the body inside a fresh tracking pass.
    pub(crate) fn execute(&self, rt: &Runtime) {
        let _pass = rt.tracking_pass(self.node, FrameKind::Effect);
        self.runs.set(self.runs.get() + 1);
        (self.run)();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     Effect::new(move || seen.set(count.get()))
/// };
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it once.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Runtime::with(|rt| {
            let node = rt.register(Flags::WATCHING);
            rt.adopt(node);

            let inner = Rc::new(EffectInner {
                node,
                run: Box::new(run),
                runs: Cell::new(0),
            });
            rt.bind(node, Binding::Effect(Rc::clone(&inner)));
            inner.execute(rt);
            Self { inner }
        })
    }

    /// The effect's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Stop the effect and every effect it owns.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        Runtime::try_with(|rt| rt.dispose_node(self.inner.node));
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::with(|rt| rt.contains(self.inner.node))
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Get the number of dependencies read by the last run, including owned
    /// effects.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.dependency_count(self.inner.node))
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.node)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computed, Signal};
    use std::cell::RefCell;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let signal = Signal::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (reader, log) = (signal.clone(), seen.clone());
        let effect = Effect::new(move || log.borrow_mut().push(reader.get()));

        signal.set(2);
        signal.set(3);

        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_skips_run_when_computed_is_unchanged() {
        let signal = Signal::new(2);
        let reader = signal.clone();
        let even = Computed::new(move || reader.get() % 2 == 0);

        let even_reader = even.clone();
        let effect = Effect::new(move || {
            even_reader.get();
        });

        signal.set(4);
        assert_eq!(effect.run_count(), 1);

        signal.set(5);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let reader = signal.clone();
        let effect = Effect::new(move || {
            reader.get();
        });

        // Ran once on creation
        assert_eq!(effect.run_count(), 1);

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        assert_eq!(effect.run_count(), 1);

        effect.dispose();
        assert!(effect.is_disposed());
    }

    #[test]
    fn dropping_handle_keeps_effect_alive() {
        let signal = Signal::new(0);
        let run_count = Rc::new(Cell::new(0));

        let (reader, counter) = (signal.clone(), run_count.clone());
        drop(Effect::new(move || {
            reader.get();
            counter.set(counter.get() + 1);
        }));

        signal.set(1);
        assert_eq!(run_count.get(), 2);
    }

    #[test]
    fn inner_effect_is_disposed_when_outer_reruns() {
        let outer_source = Signal::new(0);
        let inner_handles = Rc::new(RefCell::new(Vec::new()));

        let (reader, handles) = (outer_source.clone(), inner_handles.clone());
        let outer = Effect::new(move || {
            reader.get();
            handles.borrow_mut().push(Effect::new(|| {}));
        });

        assert_eq!(outer.dependency_count(), 2);
        outer_source.set(1);

        let handles = inner_handles.borrow();
        assert_eq!(handles.len(), 2);
        assert!(handles[0].is_disposed());
        assert!(!handles[1].is_disposed());
        assert_eq!(outer.dependency_count(), 2);
    }

    #[test]
    fn disposing_outer_disposes_inner() {
        let inner_handle = Rc::new(RefCell::new(None));
        let slot = inner_handle.clone();
        let outer = Effect::new(move || {
            *slot.borrow_mut() = Some(Effect::new(|| {}));
        });

        outer.dispose();

        let inner = inner_handle.borrow_mut().take();
        assert!(inner.is_some_and(|inner| inner.is_disposed()));
    }

    #[test]
    fn effect_can_dispose_itself_and_keep_reading() {
        let trigger = Signal::new(0);
        let late = Signal::new(1);
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let (trigger_reader, late_reader, me) = (trigger.clone(), late.clone(), slot.clone());
        let late_double = Computed::new(move || late_reader.get() * 2);
        let late_double_reader = late_double.clone();
        let effect = Effect::new(move || {
            if trigger_reader.get() == 0 {
                return;
            }
            let handle = me.borrow().clone();
            if let Some(handle) = handle {
                handle.dispose();
            }
            late_double_reader.get();
        });
        *slot.borrow_mut() = Some(effect.clone());

        trigger.set(1);

        assert!(effect.is_disposed());
        assert_eq!(effect.run_count(), 2);
        assert_eq!(trigger.subscriber_count(), 0);
        assert_eq!(late_double.subscriber_count(), 0);

        late.set(2);
        assert_eq!(effect.run_count(), 2);
        assert_eq!(late_double.get(), 4);
        slot.borrow_mut().take();
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        // Same ID
        assert_eq!(effect1.id(), effect2.id());

        // Shared run count
        assert_eq!(effect1.run_count(), 1);
        assert_eq!(effect2.run_count(), 1);

        // Shared disposal state
        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
