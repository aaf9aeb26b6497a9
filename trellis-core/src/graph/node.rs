//! Graph Nodes
//!
//! This module defines the node and edge types that live in the dependency
//! graph. Both are plain data: every cross-reference is an arena key, so the
//! graph can hold cycles between dependencies and subscribers without any
//! ownership cycles.

use bitflags::bitflags;
use slotmap::new_key_type;

new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    pub struct NodeId;

    /// Unique identifier for an edge in the dependency graph.
    pub struct LinkId;
}

bitflags! {
    /// State bits carried by every [`ReactiveNode`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// Holds a cached value and can itself have dependencies
        /// (signals and computeds).
        const MUTABLE = 1 << 0;

        /// Must be notified, not just marked, when a dependency changes
        /// (effects and effect scopes).
        const WATCHING = 1 << 1;

        /// Currently inside its own tracking pass.
        const RECURSED_CHECK = 1 << 2;

        /// Reached through a live edge while tracking; needs a second visit.
        const RECURSED = 1 << 3;

        /// Cached value is known to be stale.
        const DIRTY = 1 << 4;

        /// Cached value might be stale; ancestors must be checked.
        const PENDING = 1 << 5;

        /// Sitting in the effect queue, or owns an inner effect that is.
        const QUEUED = 1 << 6;
    }
}

/// A node in the dependency graph.
///
/// `deps` is the ordered list of edges where this node is the subscriber,
/// `subs` the ordered list of edges where it is the dependency. During a
/// tracking pass `deps_tail` doubles as the cursor: edges after it have not
/// been confirmed by the current pass yet.
#[derive(Debug, Clone, Default)]
pub struct ReactiveNode {
    pub(crate) deps: Option<LinkId>,
    pub(crate) deps_tail: Option<LinkId>,
    pub(crate) subs: Option<LinkId>,
    pub(crate) subs_tail: Option<LinkId>,
    pub(crate) flags: Flags,
}

impl ReactiveNode {
    /// Create a detached node with the given flags.
    pub fn new(flags: Flags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// First edge to a dependency.
    pub fn deps(&self) -> Option<LinkId> {
        self.deps
    }

    /// Tracking cursor / last edge to a dependency.
    pub fn deps_tail(&self) -> Option<LinkId> {
        self.deps_tail
    }

    /// First edge to a subscriber.
    pub fn subs(&self) -> Option<LinkId> {
        self.subs
    }

    /// Current state bits.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Whether nothing depends on this node.
    pub fn is_unwatched(&self) -> bool {
        self.subs.is_none()
    }
}

/// A directed edge: `sub` depends on `dep`.
///
/// The edge sits in exactly one `deps` list (the subscriber's) and one
/// `subs` list (the dependency's); the four sibling keys make removal from
/// either list O(1).
#[derive(Debug, Clone)]
pub struct Link {
    pub(crate) version: u32,
    pub(crate) dep: NodeId,
    pub(crate) sub: NodeId,
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
    pub(crate) prev_dep: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
}

impl Link {
    /// Tracking pass that last created or confirmed this edge.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The node being depended on.
    pub fn dep(&self) -> NodeId {
        self.dep
    }

    /// The node doing the depending.
    pub fn sub(&self) -> NodeId {
        self.sub
    }

    pub fn next_dep(&self) -> Option<LinkId> {
        self.next_dep
    }
}
