//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects to the dependency graph. It is the [`ReactiveSystem`] the
//! graph algorithms call back into.
//!
//! # How It Works
//!
//! 1. Every signal, computed, effect and scope registers a node plus a
//!    binding that knows how to refresh or run it.
//!
//! 2. Reads inside a running computation link the read node to it.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks the signal dirty and propagates pending flags downstream
//!    b. Queues every effect reached on the way
//!    c. Flushes the queue unless a batch is open
//!    d. Computeds are lazy: they resolve on their next read
//!
//! # Threading
//!
//! Each thread gets its own runtime, created on first use. Reactive values
//! are `!Send` and always talk to the runtime of the thread that made them.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};

use slotmap::SecondaryMap;
use tracing::{debug, trace};

use super::context::{ContextStack, Frame, FrameKind, ReactiveContext, TrackingPass};
use super::effect::EffectInner;
use crate::error::{ReactiveError, Result};
use crate::graph::{Flags, Graph, NodeId, ReactiveSystem, Scheduler};

/// A value node that can bring its cached value up to date.
pub(crate) trait Refresh {
    /// Recompute or commit the value. Returns whether it changed.
    fn refresh(&self, rt: &Runtime) -> bool;
}

/// What the runtime knows about a node beyond its graph state.
#[derive(Clone)]
pub(crate) enum Binding {
    /// A signal or computed. Weak so dropping the last handle frees it.
    Value(Weak<dyn Refresh>),
    /// An effect. Kept alive until it is disposed.
    Effect(Rc<EffectInner>),
    Scope,
}

/// Sizing for a thread's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Nodes to reserve room for up front.
    pub node_capacity: usize,
    /// Edges to reserve room for up front.
    pub link_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_capacity: 64,
            link_capacity: 128,
        }
    }
}

thread_local! {
    static RUNTIME: OnceCell<Runtime> = const { OnceCell::new() };
}

/// The reactive runtime of the current thread.
pub struct Runtime {
    graph: RefCell<Graph>,
    bindings: RefCell<SecondaryMap<NodeId, Binding>>,
    context: ContextStack,
    scheduler: Scheduler,
    version: Cell<u32>,
}

impl Runtime {
    fn new(config: RuntimeConfig) -> Self {
        debug!(
            node_capacity = config.node_capacity,
            link_capacity = config.link_capacity,
            "reactive runtime initialised"
        );
        Self {
            graph: RefCell::new(Graph::with_capacity(
                config.node_capacity,
                config.link_capacity,
            )),
            bindings: RefCell::new(SecondaryMap::with_capacity(config.node_capacity)),
            context: ContextStack::new(),
            scheduler: Scheduler::new(),
            version: Cell::new(0),
        }
    }

    /// Install a runtime with the given configuration for this thread.
    ///
    /// Fails if the runtime was already created, explicitly or by using any
    /// reactive value on this thread.
    pub fn init(config: RuntimeConfig) -> Result<()> {
        RUNTIME.with(|cell| {
            if cell.get().is_some() {
                return Err(ReactiveError::AlreadyInitialized);
            }
            cell.set(Runtime::new(config))
                .map_err(|_| ReactiveError::AlreadyInitialized)
        })
    }

    /// Run `f` with this thread's runtime, creating it if needed.
    pub fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(|cell| f(cell.get_or_init(|| Runtime::new(RuntimeConfig::default()))))
    }

    /// Like [`with`](Self::with), but does nothing once the thread's
    /// runtime has been torn down or if it was never created.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(|cell| cell.get().map(f)).ok().flatten()
    }

    /// Check if a computed or effect is currently tracking reads.
    pub fn is_tracking() -> bool {
        Self::with(|rt| rt.context.active().is_some_and(|frame| frame.kind.tracks()))
    }

    /// The node of the computation currently running, if any.
    pub fn current_node() -> Option<NodeId> {
        Self::with(|rt| rt.context.active().map(|frame| frame.node))
    }

    pub fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.borrow().link_count()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.graph.borrow().contains(node)
    }

    /// Current flags of `node`, empty if it no longer exists.
    pub fn flags(&self, node: NodeId) -> Flags {
        self.graph
            .borrow()
            .get(node)
            .map(|node| node.flags())
            .unwrap_or_default()
    }

    pub fn dependency_count(&self, node: NodeId) -> usize {
        self.graph.borrow().dependencies(node).count()
    }

    pub fn subscriber_count(&self, node: NodeId) -> usize {
        self.graph.borrow().subscribers(node).count()
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn register(&self, flags: Flags) -> NodeId {
        self.graph.borrow_mut().insert_node(flags)
    }

    pub(crate) fn bind(&self, node: NodeId, binding: Binding) {
        self.bindings.borrow_mut().insert(node, binding);
    }

    fn binding(&self, node: NodeId) -> Option<Binding> {
        self.bindings.borrow().get(node).cloned()
    }

    fn next_version(&self) -> u32 {
        let version = self.version.get().wrapping_add(1);
        self.version.set(version);
        version
    }

    /// Open a tracking pass on `node`.
    pub(crate) fn tracking_pass(&self, node: NodeId, kind: FrameKind) -> TrackingPass<'_, Runtime> {
        let frame = Frame {
            node,
            version: self.next_version(),
            kind,
        };
        TrackingPass::enter(self, &self.context, frame)
    }

    /// Make `node` the owner of effects created until the guard drops.
    pub(crate) fn scope_context(&self, node: NodeId) -> ReactiveContext<'_> {
        let frame = Frame {
            node,
            version: self.next_version(),
            kind: FrameKind::Scope,
        };
        ReactiveContext::enter(&self.context, Some(frame))
    }

    /// Suspend tracking until the guard drops.
    pub(crate) fn untracked(&self) -> ReactiveContext<'_> {
        ReactiveContext::enter(&self.context, None)
    }

    /// Link `dep` to the computation currently tracking reads.
    pub(crate) fn track(&self, dep: NodeId) {
        if let Some(frame) = self.context.active() {
            if frame.kind.tracks() && self.contains(frame.node) {
                self.link(dep, frame.node, frame.version);
            }
        }
    }

    /// Hand a new effect or scope to the effect or scope currently running.
    pub(crate) fn adopt(&self, node: NodeId) {
        if let Some(frame) = self.context.active() {
            if frame.kind.owns_effects() && self.contains(frame.node) {
                self.link(node, frame.node, frame.version);
            }
        }
    }

    /// Decide whether a computed has to recompute before it is read.
    pub(crate) fn is_stale(&self, node: NodeId) -> bool {
        let (flags, first_dep) = {
            let graph = self.graph.borrow();
            let entry = graph.node(node);
            (entry.flags(), entry.deps())
        };
        if flags.contains(Flags::DIRTY) {
            return true;
        }
        if flags.contains(Flags::PENDING) {
            if first_dep.is_some_and(|link| self.check_dirty(link, node)) {
                return true;
            }
            self.graph.borrow_mut().remove_flags(node, Flags::PENDING);
        }
        false
    }

    /// Tell the direct subscribers of `node` that its value changed.
    pub(crate) fn changed(&self, node: NodeId) {
        let subs = self.graph.borrow().node(node).subs();
        if let Some(first) = subs {
            self.shallow_propagate(first);
        }
    }

    /// A signal took a new value: mark, propagate, flush.
    pub(crate) fn write(&self, node: NodeId) {
        let subs = {
            let mut graph = self.graph.borrow_mut();
            graph.set_flags(node, Flags::MUTABLE | Flags::DIRTY);
            graph.node(node).subs()
        };
        if let Some(first) = subs {
            self.propagate(first);
            if !self.scheduler.is_batching() {
                self.flush();
            }
        }
    }

    /// Run queued effects until the queue is empty.
    pub(crate) fn flush(&self) {
        if self.scheduler.is_empty() {
            return;
        }
        trace!(queued = self.scheduler.len(), "flushing effect queue");
        while let Some(node) = self.scheduler.dequeue() {
            let live = {
                let mut graph = self.graph.borrow_mut();
                let live = graph.contains(node);
                if live {
                    graph.remove_flags(node, Flags::QUEUED);
                }
                live
            };
            if live {
                self.run_effect(node);
            }
        }
    }

    /// Run a dequeued effect or scope: re-run its body if a dependency
    /// really changed, then run any queued effects it owns.
    fn run_effect(&self, node: NodeId) {
        let (flags, first_dep) = match self.graph.borrow().get(node) {
            Some(entry) => (entry.flags(), entry.deps()),
            None => return,
        };

        let stale = flags.contains(Flags::DIRTY)
            || (flags.contains(Flags::PENDING)
                && first_dep.is_some_and(|link| self.check_dirty(link, node)));
        if stale {
            if let Some(Binding::Effect(effect)) = self.binding(node) {
                trace!(?node, "re-running effect");
                effect.execute(self);
                return;
            }
        }

        let mut link = {
            let mut graph = self.graph.borrow_mut();
            if !graph.contains(node) {
                return;
            }
            graph.remove_flags(node, Flags::PENDING | Flags::DIRTY);
            graph.node(node).deps()
        };
        while let Some(current) = link {
            let (dep, queued) = {
                let mut graph = self.graph.borrow_mut();
                let Some(edge) = graph.get_edge(current) else {
                    break;
                };
                let dep = edge.dep();
                let queued = graph.flags(dep).contains(Flags::QUEUED);
                if queued {
                    graph.remove_flags(dep, Flags::QUEUED);
                }
                (dep, queued)
            };
            if queued {
                self.run_effect(dep);
            }
            // A child may have disposed a sibling (or this node) while it ran.
            // Cleared QUEUED bits make restarting from the head safe.
            let graph = self.graph.borrow();
            link = match graph.get_edge(current) {
                Some(edge) => edge.next_dep(),
                None => graph.get(node).and_then(|entry| entry.deps()),
            };
        }
    }

    /// Remove a node, all of its edges and its binding.
    ///
    /// Effects and scopes it owns lose their last subscriber on the way and
    /// are disposed with it.
    pub(crate) fn dispose_node(&self, node: NodeId) {
        if !self.graph.borrow().contains(node) {
            return;
        }
        debug!(?node, "disposing node");

        self.purge_deps(node);
        {
            // Subscribers only lose an edge; the node itself is going away.
            let mut graph = self.graph.borrow_mut();
            while let Some(link) = graph.get(node).and_then(|entry| entry.subs()) {
                graph.detach(link);
            }
            graph.remove_node(node);
        }
        let binding = self.bindings.borrow_mut().remove(node);
        drop(binding);
    }
}

impl ReactiveSystem for Runtime {
    fn graph(&self) -> &RefCell<Graph> {
        &self.graph
    }

    fn update(&self, node: NodeId) -> bool {
        match self.binding(node) {
            Some(Binding::Value(value)) => value
                .upgrade()
                .is_some_and(|value| value.refresh(self)),
            _ => false,
        }
    }

    fn notify(&self, node: NodeId) {
        let root = {
            let mut graph = self.graph.borrow_mut();
            let mut current = node;
            loop {
                if graph.flags(current).contains(Flags::QUEUED) {
                    return;
                }
                graph.insert_flags(current, Flags::QUEUED);
                match graph.node(current).subs() {
                    Some(owner) => current = graph.edge(owner).sub(),
                    None => break current,
                }
            }
        };
        self.scheduler.enqueue(root);
    }

    fn unwatched(&self, node: NodeId) {
        let (flags, has_deps) = match self.graph.borrow().get(node) {
            Some(entry) => (entry.flags(), entry.deps().is_some()),
            None => return,
        };

        if !flags.contains(Flags::MUTABLE) {
            self.dispose_node(node);
        } else if has_deps {
            trace!(?node, "tearing down unwatched computed");
            {
                let mut graph = self.graph.borrow_mut();
                graph.set_flags(node, Flags::MUTABLE | Flags::DIRTY);
                graph.reset_cursor(node);
            }
            self.purge_deps(node);
        }
    }

    fn watched(&self, node: NodeId) {
        trace!(?node, "node gained its first subscriber");
    }
}
