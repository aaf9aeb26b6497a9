//! Reactive Context
//!
//! The reactive context records which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read, the
//! running computation becomes its subscriber.
//!
//! # Implementation
//!
//! The active [`Frame`] lives in a single cell on the runtime. Entering a
//! computation swaps a new frame in and keeps the previous one in a guard;
//! dropping the guard swaps it back. Because restoration happens in `Drop`,
//! a panicking getter or effect still leaves the previous frame in place.
//!
//! [`TrackingPass`] extends the guard with the graph side of a pass: it
//! rewinds the node's tracking cursor on entry and prunes dependencies that
//! were not read again on exit.

use std::cell::Cell;

use super::runtime::Runtime;
use crate::graph::{NodeId, ReactiveSystem};

/// What kind of computation a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Computed,
    Effect,
    Scope,
}

impl FrameKind {
    /// Whether reads inside this frame become dependencies.
    pub fn tracks(self) -> bool {
        matches!(self, FrameKind::Computed | FrameKind::Effect)
    }

    /// Whether effects created inside this frame are owned by it.
    pub fn owns_effects(self) -> bool {
        matches!(self, FrameKind::Effect | FrameKind::Scope)
    }
}

/// The computation currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub node: NodeId,
    /// Version stamp given to every edge created by this pass.
    pub version: u32,
    pub kind: FrameKind,
}

/// Holder of the active frame.
#[derive(Debug, Default)]
pub struct ContextStack {
    active: Cell<Option<Frame>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame of the computation currently running, if any.
    pub fn active(&self) -> Option<Frame> {
        self.active.get()
    }
}

/// Guard that restores the previous frame when dropped.
///
/// Entering with `None` suspends tracking until the guard is dropped.
pub struct ReactiveContext<'a> {
    stack: &'a ContextStack,
    frame: Option<Frame>,
    previous: Option<Frame>,
}

impl<'a> ReactiveContext<'a> {
    /// Make `frame` the active frame until the returned guard is dropped.
    pub fn enter(stack: &'a ContextStack, frame: Option<Frame>) -> Self {
        let previous = stack.active.replace(frame);
        Self {
            stack,
            frame,
            previous,
        }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.stack.active.replace(self.previous);
        debug_assert_eq!(
            popped, self.frame,
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.frame, popped
        );
    }
}

/// Guard for one tracking pass of a computed or effect.
pub struct TrackingPass<'a, S: ReactiveSystem> {
    system: &'a S,
    node: NodeId,
    context: Option<ReactiveContext<'a>>,
}

impl<'a, S: ReactiveSystem> TrackingPass<'a, S> {
    /// Open a pass for `frame.node` and make it the active frame.
    pub fn enter(system: &'a S, stack: &'a ContextStack, frame: Frame) -> Self {
        system.start_tracking(frame.node);
        Self {
            system,
            node: frame.node,
            context: Some(ReactiveContext::enter(stack, Some(frame))),
        }
    }
}

impl<S: ReactiveSystem> Drop for TrackingPass<'_, S> {
    fn drop(&mut self) {
        drop(self.context.take());
        self.system.end_tracking(self.node);
    }
}

/// Run `f` without tracking any of the values it reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::with(|rt| {
        let _context = rt.untracked();
        f()
    })
}
