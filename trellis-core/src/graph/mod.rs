//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! reactive values and computations.
//!
//! # Overview
//!
//! - Nodes represent signals, computeds, effects and effect scopes.
//! - Edges ([`Link`]) record that a subscriber read a dependency during its
//!   last tracking pass.
//!
//! Each node keeps two intrusive doubly-linked lists of edges: its
//! dependencies and its subscribers. Both lists live in arenas keyed by
//! [`NodeId`] and [`LinkId`], so inserting or removing an edge never searches
//! a list and never fights the borrow checker over back-references.
//!
//! # Design Decisions
//!
//! 1. Edges are reused across tracking passes when dependencies are read in
//!    the same order, which is the common case.
//!
//! 2. Structural operations on [`Graph`] never call back into user code. The
//!    callback-driven algorithms live in [`ReactiveSystem`], which only holds
//!    a borrow of the graph between callbacks.

mod node;
mod scheduler;
mod system;

pub use node::{Flags, Link, LinkId, NodeId, ReactiveNode};
pub use scheduler::Scheduler;
pub use system::{ReactiveSystem, Visit};

use slotmap::SlotMap;

/// Result of removing an edge from both of its lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detached {
    /// The subscriber's next dependency edge, for chained removal.
    pub next_dep: Option<LinkId>,
    /// The dependency, if it just lost its last subscriber.
    pub orphaned: Option<NodeId>,
}

/// Arena holding every node and edge of one reactive system.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: SlotMap<NodeId, ReactiveNode>,
    links: SlotMap<LinkId, Link>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with room for the given number of nodes and edges.
    pub fn with_capacity(nodes: usize, links: usize) -> Self {
        Self {
            nodes: SlotMap::with_capacity_and_key(nodes),
            links: SlotMap::with_capacity_and_key(links),
        }
    }

    /// Add a detached node.
    pub fn insert_node(&mut self, flags: Flags) -> NodeId {
        self.nodes.insert(ReactiveNode::new(flags))
    }

    /// Remove a node. Its edges must already be gone.
    ///
    /// Returns `false` if the node did not exist.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        match self.nodes.remove(id) {
            Some(node) => {
                debug_assert!(
                    node.deps.is_none() && node.subs.is_none(),
                    "removed node {id:?} still has edges"
                );
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&ReactiveNode> {
        self.nodes.get(id)
    }

    /// Access a node that is known to exist.
    pub fn node(&self, id: NodeId) -> &ReactiveNode {
        &self.nodes[id]
    }

    pub fn edge(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    pub fn get_edge(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn flags(&self, id: NodeId) -> Flags {
        self.nodes[id].flags
    }

    pub fn set_flags(&mut self, id: NodeId, flags: Flags) {
        self.nodes[id].flags = flags;
    }

    pub fn insert_flags(&mut self, id: NodeId, flags: Flags) {
        self.nodes[id].flags.insert(flags);
    }

    pub fn remove_flags(&mut self, id: NodeId, flags: Flags) {
        self.nodes[id].flags.remove(flags);
    }

    /// Reset a node's tracking cursor to "before the first dependency".
    pub fn reset_cursor(&mut self, id: NodeId) {
        self.nodes[id].deps_tail = None;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Iterate over the dependencies of `id`, in tracking order.
    pub fn dependencies(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let first = self.nodes.get(id).and_then(|node| node.deps);
        std::iter::successors(first, |&link| self.links[link].next_dep)
            .map(|link| self.links[link].dep)
    }

    /// Iterate over the subscribers of `id`, in subscription order.
    pub fn subscribers(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let first = self.nodes.get(id).and_then(|node| node.subs);
        std::iter::successors(first, |&link| self.links[link].next_sub)
            .map(|link| self.links[link].sub)
    }

    /// Record that `sub` read `dep` during the tracking pass `version`.
    ///
    /// Reuses the edge at the tracking cursor or the one right after it when
    /// possible, and refuses to create a second edge for the same pass.
    /// Returns `true` when `dep` gained its first subscriber.
    pub fn attach(&mut self, dep: NodeId, sub: NodeId, version: u32) -> bool {
        let prev_dep = self.nodes[sub].deps_tail;
        if let Some(prev) = prev_dep {
            if self.links[prev].dep == dep {
                return false;
            }
        }

        let next_dep = match prev_dep {
            Some(prev) => self.links[prev].next_dep,
            None => self.nodes[sub].deps,
        };
        if let Some(next) = next_dep {
            if self.links[next].dep == dep {
                self.links[next].version = version;
                self.nodes[sub].deps_tail = Some(next);
                return false;
            }
        }

        let prev_sub = self.nodes[dep].subs_tail;
        if let Some(prev) = prev_sub {
            let link = &self.links[prev];
            if link.version == version && link.sub == sub {
                return false;
            }
        }

        let link = self.links.insert(Link {
            version,
            dep,
            sub,
            prev_sub,
            next_sub: None,
            prev_dep,
            next_dep,
        });
        self.nodes[sub].deps_tail = Some(link);
        self.nodes[dep].subs_tail = Some(link);

        if let Some(next) = next_dep {
            self.links[next].prev_dep = Some(link);
        }
        match prev_dep {
            Some(prev) => self.links[prev].next_dep = Some(link),
            None => self.nodes[sub].deps = Some(link),
        }
        match prev_sub {
            Some(prev) => {
                self.links[prev].next_sub = Some(link);
                false
            }
            None => {
                self.nodes[dep].subs = Some(link);
                true
            }
        }
    }

    /// Splice an edge out of both of its lists.
    pub fn detach(&mut self, link: LinkId) -> Detached {
        let Some(Link {
            dep,
            sub,
            prev_sub,
            next_sub,
            prev_dep,
            next_dep,
            ..
        }) = self.links.remove(link)
        else {
            return Detached {
                next_dep: None,
                orphaned: None,
            };
        };

        // The cursor may sit mid-list during a tracking pass.
        if self.nodes[sub].deps_tail == Some(link) {
            self.nodes[sub].deps_tail = prev_dep;
        }
        if let Some(next) = next_dep {
            self.links[next].prev_dep = prev_dep;
        }
        match prev_dep {
            Some(prev) => self.links[prev].next_dep = next_dep,
            None => self.nodes[sub].deps = next_dep,
        }
        match next_sub {
            Some(next) => self.links[next].prev_sub = prev_sub,
            None => self.nodes[dep].subs_tail = prev_sub,
        }
        let orphaned = match prev_sub {
            Some(prev) => {
                self.links[prev].next_sub = next_sub;
                None
            }
            None => {
                self.nodes[dep].subs = next_sub;
                next_sub.is_none().then_some(dep)
            }
        };

        Detached { next_dep, orphaned }
    }

    /// Whether `link` lies at or before `sub`'s tracking cursor, i.e. it was
    /// confirmed by the pass currently running on `sub`.
    pub fn is_live_dep(&self, link: LinkId, sub: NodeId) -> bool {
        let mut current = self.nodes[sub].deps_tail;
        while let Some(candidate) = current {
            if candidate == link {
                return true;
            }
            current = self.links[candidate].prev_dep;
        }
        false
    }
}
