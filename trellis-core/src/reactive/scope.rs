//! Effect Scopes
//!
//! An [`EffectScope`] groups the effects created while its body runs, so they
//! can be stopped together. Reads inside the body are not tracked; only the
//! effects it creates are attached to it.

use std::fmt::Debug;

use super::runtime::{Binding, Runtime};
use crate::graph::{Flags, NodeId};

/// An owner for a group of effects.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Effect, EffectScope, Signal};
///
/// let count = Signal::new(0);
/// let scope = EffectScope::new(|| {
///     let count = count.clone();
///     Effect::new(move || {
///         count.get();
///     });
/// });
///
/// assert_eq!(scope.effect_count(), 1);
/// scope.dispose();
/// assert_eq!(count.subscriber_count(), 0);
/// ```
#[derive(Clone)]
pub struct EffectScope {
    node: NodeId,
}

impl EffectScope {
    /// Create a scope and run `f` with the scope as owner of new effects.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(),
    {
        Runtime::with(|rt| {
            let node = rt.register(Flags::WATCHING);
            rt.adopt(node);
            rt.bind(node, Binding::Scope);
            {
                let _context = rt.scope_context(node);
                f();
            }
            Self { node }
        })
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    /// Stop every effect in the scope, including nested ones.
    pub fn dispose(&self) {
        Runtime::try_with(|rt| rt.dispose_node(self.node));
    }

    pub fn is_disposed(&self) -> bool {
        !Runtime::with(|rt| rt.contains(self.node))
    }

    /// Get the number of effects and scopes directly owned by this scope.
    pub fn effect_count(&self) -> usize {
        Runtime::with(|rt| rt.dependency_count(self.node))
    }
}

impl Debug for EffectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScope")
            .field("id", &self.node)
            .field("effect_count", &self.effect_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
