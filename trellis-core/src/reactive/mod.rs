//! Reactive Primitives
//!
//! This module implements the user-facing reactive system: signals,
//! computeds, effects and effect scopes, bound to the dependency graph in
//! [`crate::graph`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a computed or effect, that computation automatically subscribes to
//! it. When the signal's value changes, every subscriber is marked.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies actually changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects created by a running effect or inside an
//! [`EffectScope`] are owned by it and stop with it.
//!
//! # Implementation Notes
//!
//! Each thread has one [`Runtime`]. It stores the graph, the active
//! tracking frame and the effect queue. When a value is read, the runtime
//! checks for an active frame and, if there is one, links the value to it.

mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod scope;
mod signal;

pub use batch::{batch, end_batch, start_batch, BatchGuard};
pub use computed::Computed;
pub use context::{untrack, ContextStack, Frame, FrameKind, ReactiveContext, TrackingPass};
pub use effect::Effect;
pub use runtime::{Runtime, RuntimeConfig};
pub use scope::EffectScope;
pub use signal::Signal;
