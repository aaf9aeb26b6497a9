//! Push-Pull Propagation
//!
//! [`ReactiveSystem`] is the seam between the graph algorithms and whatever
//! gives the nodes meaning. An implementor supplies three callbacks:
//!
//! - `update(node)`: recompute a dirty signal or computed, report whether its
//!   value changed.
//! - `notify(node)`: a watching node (effect or scope) was reached.
//! - `unwatched(node)`: a node just lost its last subscriber.
//!
//! In return it gets the algorithms as provided methods:
//!
//! - [`link`](ReactiveSystem::link) / [`unlink`](ReactiveSystem::unlink):
//!   edge maintenance during a tracking pass.
//! - [`propagate`](ReactiveSystem::propagate): push phase. Marks everything
//!   downstream of a change as pending and notifies watchers.
//! - [`check_dirty`](ReactiveSystem::check_dirty): pull phase. Decides
//!   lazily, bottom-up, whether a pending node really has to recompute.
//! - [`shallow_propagate`](ReactiveSystem::shallow_propagate): one-level
//!   promotion from pending to dirty after a confirmed change.
//!
//! Both traversals walk the graph with an explicit stack of resume points,
//! so stack usage does not grow with the depth of the graph. No graph borrow
//! is held while a callback runs, which lets callbacks re-enter the system.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::{Flags, Graph, Link, LinkId, NodeId};

/// How push propagation treats a subscriber it reaches.
///
/// The classification only looks at the subscriber's flags (and, for the
/// recursive case, whether the edge it was reached through belongs to the
/// tracking pass currently running on it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Not touched yet: mark pending, notify and descend.
    First,
    /// Already pending or dirty from another path or an earlier write.
    Marked,
    /// Deferred by an earlier recursive visit; walk it again.
    Revisit,
    /// Reached while its own tracking pass runs, through an edge that pass
    /// already confirmed. Marked for a deferred re-check, never notified.
    Recursive,
    /// Reached through an edge the running pass has not confirmed.
    Stale,
}

impl Visit {
    /// Classify a subscriber with the given flags.
    pub fn classify(flags: Flags, live_edge: impl FnOnce() -> bool) -> Self {
        if !flags.intersects(Flags::RECURSED_CHECK | Flags::RECURSED | Flags::DIRTY | Flags::PENDING) {
            Visit::First
        } else if !flags.intersects(Flags::RECURSED_CHECK | Flags::RECURSED) {
            Visit::Marked
        } else if !flags.contains(Flags::RECURSED_CHECK) {
            Visit::Revisit
        } else if !flags.intersects(Flags::DIRTY | Flags::PENDING) && live_edge() {
            Visit::Recursive
        } else {
            Visit::Stale
        }
    }

    /// Returns the flags to store on the subscriber and the flags that
    /// decide whether it is notified (`WATCHING`) and descended into
    /// (`MUTABLE`).
    pub fn apply(self, flags: Flags) -> (Flags, Flags) {
        match self {
            Visit::First => (flags | Flags::PENDING, flags),
            Visit::Marked | Visit::Stale => (flags, Flags::empty()),
            Visit::Revisit => ((flags - Flags::RECURSED) | Flags::PENDING, flags),
            Visit::Recursive => (
                flags | Flags::RECURSED | Flags::PENDING,
                flags & Flags::MUTABLE,
            ),
        }
    }
}

/// A reactive system built on a [`Graph`].
pub trait ReactiveSystem {
    /// The graph this system operates on.
    fn graph(&self) -> &RefCell<Graph>;

    /// Recompute a dirty `MUTABLE` node. Returns whether its value changed.
    fn update(&self, node: NodeId) -> bool;

    /// A `WATCHING` node was reached by propagation.
    fn notify(&self, node: NodeId);

    /// `node` lost its last subscriber.
    fn unwatched(&self, node: NodeId);

    /// `node` gained its first subscriber.
    fn watched(&self, _node: NodeId) {}

    /// Record that `sub` read `dep` during the tracking pass `version`.
    fn link(&self, dep: NodeId, sub: NodeId, version: u32) {
        let first = self.graph().borrow_mut().attach(dep, sub, version);
        if first {
            self.watched(dep);
        }
    }

    /// Remove an edge of `sub`. Returns `sub`'s next dependency edge.
    fn unlink(&self, link: LinkId, sub: NodeId) -> Option<LinkId> {
        let detached = {
            let mut graph = self.graph().borrow_mut();
            debug_assert_eq!(graph.get_edge(link).map(Link::sub), Some(sub));
            graph.detach(link)
        };
        if let Some(dep) = detached.orphaned {
            self.unwatched(dep);
        }
        detached.next_dep
    }

    /// Push phase: mark everything reachable from `link` (the first
    /// subscriber edge of a changed node) and notify watchers.
    fn propagate(&self, mut link: LinkId) {
        let mut stack: SmallVec<[Option<LinkId>; 8]> = SmallVec::new();
        let mut next = self.graph().borrow().edge(link).next_sub;

        'top: loop {
            let (sub, effective) = {
                let mut graph = self.graph().borrow_mut();
                let sub = graph.edge(link).sub;
                let flags = graph.flags(sub);
                let visit = Visit::classify(flags, || graph.is_live_dep(link, sub));
                let (stored, effective) = visit.apply(flags);
                graph.set_flags(sub, stored);
                (sub, effective)
            };

            if effective.contains(Flags::WATCHING) {
                self.notify(sub);
            }

            let graph = self.graph().borrow();
            if effective.contains(Flags::MUTABLE) {
                if let Some(first) = graph.node(sub).subs {
                    link = first;
                    let next_sub = graph.edge(first).next_sub;
                    if next_sub.is_some() {
                        stack.push(next);
                        next = next_sub;
                    }
                    continue;
                }
            }

            if let Some(sibling) = next {
                link = sibling;
                next = graph.edge(sibling).next_sub;
                continue;
            }

            while let Some(saved) = stack.pop() {
                if let Some(resume) = saved {
                    link = resume;
                    next = graph.edge(resume).next_sub;
                    continue 'top;
                }
            }

            break;
        }
    }

    /// Promote pending subscribers reachable through `link` and its
    /// siblings to dirty, notifying watchers that are not mid-run.
    fn shallow_propagate(&self, mut link: LinkId) {
        loop {
            let (sub, next, notify) = {
                let mut graph = self.graph().borrow_mut();
                let edge = graph.edge(link);
                let (sub, next) = (edge.sub, edge.next_sub);
                let flags = graph.flags(sub);
                let mut notify = false;
                if flags & (Flags::PENDING | Flags::DIRTY) == Flags::PENDING {
                    graph.set_flags(sub, flags | Flags::DIRTY);
                    notify = flags & (Flags::WATCHING | Flags::RECURSED_CHECK) == Flags::WATCHING;
                }
                (sub, next, notify)
            };

            if notify {
                self.notify(sub);
            }

            match next {
                Some(sibling) => link = sibling,
                None => break,
            }
        }
    }

    /// Pull phase: starting at `sub`'s first dependency edge, decide whether
    /// any ancestor actually changed. Pending ancestors are resolved on the
    /// way back up and recomputed through [`update`](Self::update).
    fn check_dirty(&self, mut link: LinkId, mut sub: NodeId) -> bool {
        let mut stack: SmallVec<[LinkId; 8]> = SmallVec::new();
        let mut dirty = false;

        'top: loop {
            let (dep, dep_flags, sub_flags) = {
                let graph = self.graph().borrow();
                let dep = graph.edge(link).dep;
                (dep, graph.flags(dep), graph.flags(sub))
            };

            if sub_flags.contains(Flags::DIRTY) {
                dirty = true;
            } else if dep_flags.contains(Flags::MUTABLE | Flags::DIRTY) {
                if self.update(dep) {
                    let fan_out = {
                        let graph = self.graph().borrow();
                        graph
                            .node(dep)
                            .subs
                            .filter(|&first| graph.edge(first).next_sub.is_some())
                    };
                    if let Some(first) = fan_out {
                        self.shallow_propagate(first);
                    }
                    dirty = true;
                }
            } else if dep_flags.contains(Flags::MUTABLE | Flags::PENDING) {
                let deps = self.graph().borrow().node(dep).deps;
                if let Some(first) = deps {
                    stack.push(link);
                    link = first;
                    sub = dep;
                    continue;
                }
            }

            if !dirty {
                let next = self.graph().borrow().edge(link).next_dep;
                if let Some(sibling) = next {
                    link = sibling;
                    continue;
                }
            }

            while let Some(came_from) = stack.pop() {
                let (first_sub, fan_out) = {
                    let graph = self.graph().borrow();
                    let first = graph.node(sub).subs.unwrap_or(came_from);
                    (first, graph.edge(first).next_sub.is_some())
                };
                link = came_from;

                if dirty {
                    if self.update(sub) {
                        if fan_out {
                            self.shallow_propagate(first_sub);
                        }
                        sub = self.graph().borrow().edge(link).sub;
                        continue;
                    }
                    dirty = false;
                } else {
                    self.graph().borrow_mut().remove_flags(sub, Flags::PENDING);
                }

                let (parent, next) = {
                    let graph = self.graph().borrow();
                    let edge = graph.edge(link);
                    (edge.sub, edge.next_dep)
                };
                sub = parent;
                if let Some(sibling) = next {
                    link = sibling;
                    continue 'top;
                }
            }

            return dirty;
        }
    }

    /// Open a tracking pass on `sub`: rewind its cursor and clear the
    /// staleness bits.
    fn start_tracking(&self, sub: NodeId) {
        let mut graph = self.graph().borrow_mut();
        graph.reset_cursor(sub);
        let flags = graph.flags(sub);
        graph.set_flags(
            sub,
            (flags - (Flags::RECURSED | Flags::DIRTY | Flags::PENDING)) | Flags::RECURSED_CHECK,
        );
    }

    /// Close a tracking pass on `sub`: drop every edge the pass did not
    /// confirm.
    fn end_tracking(&self, sub: NodeId) {
        let mut stale = {
            let graph = self.graph().borrow();
            match graph.get(sub) {
                Some(node) => match node.deps_tail {
                    Some(tail) => graph.edge(tail).next_dep,
                    None => node.deps,
                },
                None => return,
            }
        };
        while let Some(link) = stale {
            stale = self.unlink(link, sub);
        }

        let mut graph = self.graph().borrow_mut();
        if graph.contains(sub) {
            graph.remove_flags(sub, Flags::RECURSED_CHECK);
        }
    }

    /// Remove every dependency edge of `sub`.
    fn purge_deps(&self, sub: NodeId) {
        let mut link = self.graph().borrow().get(sub).and_then(|node| node.deps);
        while let Some(current) = link {
            link = self.unlink(current, sub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Records every callback; `update` clears staleness and reports a change
    /// unless the node was registered as unchanging.
    #[derive(Default)]
    struct MockSystem {
        graph: RefCell<Graph>,
        unchanged: RefCell<HashSet<NodeId>>,
        updated: RefCell<Vec<NodeId>>,
        notified: RefCell<Vec<NodeId>>,
        unwatched: RefCell<Vec<NodeId>>,
        watched: RefCell<Vec<NodeId>>,
    }

    impl MockSystem {
        fn node(&self, flags: Flags) -> NodeId {
            self.graph.borrow_mut().insert_node(flags)
        }

        fn depend(&self, sub: NodeId, dep: NodeId) {
            self.link(dep, sub, 0);
        }

        fn flags_of(&self, node: NodeId) -> Flags {
            self.graph.borrow().flags(node)
        }

        fn first_sub(&self, node: NodeId) -> LinkId {
            self.graph.borrow().node(node).subs().unwrap()
        }

        fn first_dep(&self, node: NodeId) -> LinkId {
            self.graph.borrow().node(node).deps().unwrap()
        }

        fn write(&self, signal: NodeId) {
            self.graph.borrow_mut().insert_flags(signal, Flags::DIRTY);
            self.propagate(self.first_sub(signal));
        }
    }

    impl ReactiveSystem for MockSystem {
        fn graph(&self) -> &RefCell<Graph> {
            &self.graph
        }

        fn update(&self, node: NodeId) -> bool {
            self.updated.borrow_mut().push(node);
            self.graph
                .borrow_mut()
                .remove_flags(node, Flags::DIRTY | Flags::PENDING);
            !self.unchanged.borrow().contains(&node)
        }

        fn notify(&self, node: NodeId) {
            self.notified.borrow_mut().push(node);
        }

        fn unwatched(&self, node: NodeId) {
            self.unwatched.borrow_mut().push(node);
        }

        fn watched(&self, node: NodeId) {
            self.watched.borrow_mut().push(node);
        }
    }

    /// a -> b, a -> c, b -> d, c -> d, d -> e (watching).
    fn diamond(system: &MockSystem) -> [NodeId; 5] {
        let a = system.node(Flags::MUTABLE);
        let b = system.node(Flags::MUTABLE);
        let c = system.node(Flags::MUTABLE);
        let d = system.node(Flags::MUTABLE);
        let e = system.node(Flags::WATCHING);
        system.depend(b, a);
        system.depend(c, a);
        system.depend(d, b);
        system.depend(d, c);
        system.depend(e, d);
        [a, b, c, d, e]
    }

    #[test]
    fn visit_table_rows() {
        let never = || panic!("edge check must be lazy");

        assert_eq!(Visit::classify(Flags::MUTABLE, never), Visit::First);
        assert_eq!(Visit::classify(Flags::MUTABLE | Flags::PENDING, never), Visit::Marked);
        assert_eq!(Visit::classify(Flags::WATCHING | Flags::DIRTY, never), Visit::Marked);
        assert_eq!(
            Visit::classify(Flags::WATCHING | Flags::RECURSED | Flags::PENDING, never),
            Visit::Revisit
        );
        assert_eq!(
            Visit::classify(Flags::WATCHING | Flags::RECURSED_CHECK, || true),
            Visit::Recursive
        );
        assert_eq!(
            Visit::classify(Flags::WATCHING | Flags::RECURSED_CHECK, || false),
            Visit::Stale
        );
        assert_eq!(
            Visit::classify(Flags::MUTABLE | Flags::RECURSED_CHECK | Flags::PENDING, never),
            Visit::Stale
        );
    }

    #[test]
    fn visit_apply_sets_flags() {
        let watching = Flags::WATCHING;

        assert_eq!(
            Visit::First.apply(watching),
            (watching | Flags::PENDING, watching)
        );
        assert_eq!(
            Visit::Marked.apply(watching | Flags::DIRTY),
            (watching | Flags::DIRTY, Flags::empty())
        );
        assert_eq!(
            Visit::Revisit.apply(watching | Flags::RECURSED | Flags::PENDING),
            (watching | Flags::PENDING, watching | Flags::RECURSED | Flags::PENDING)
        );

        let running = Flags::MUTABLE | Flags::WATCHING | Flags::RECURSED_CHECK;
        assert_eq!(
            Visit::Recursive.apply(running),
            (running | Flags::RECURSED | Flags::PENDING, Flags::MUTABLE)
        );
        assert_eq!(Visit::Stale.apply(running), (running, Flags::empty()));
    }

    #[test]
    fn link_fires_watched_once() {
        let system = MockSystem::default();
        let dep = system.node(Flags::MUTABLE);
        let first = system.node(Flags::WATCHING);
        let second = system.node(Flags::WATCHING);

        system.depend(first, dep);
        system.depend(second, dep);

        assert_eq!(*system.watched.borrow(), vec![dep]);
    }

    #[test]
    fn unlink_reports_unwatched_dependency() {
        let system = MockSystem::default();
        let dep = system.node(Flags::MUTABLE);
        let sub = system.node(Flags::WATCHING);
        system.depend(sub, dep);

        let next = system.unlink(system.first_dep(sub), sub);

        assert_eq!(next, None);
        assert_eq!(*system.unwatched.borrow(), vec![dep]);
    }

    #[test]
    fn propagate_marks_diamond_and_notifies_once() {
        let system = MockSystem::default();
        let [a, b, c, d, e] = diamond(&system);

        system.write(a);

        for node in [b, c, d] {
            assert!(system.flags_of(node).contains(Flags::PENDING), "{node:?}");
        }
        assert!(system.flags_of(e).contains(Flags::PENDING));
        assert_eq!(*system.notified.borrow(), vec![e]);
        assert!(system.updated.borrow().is_empty());
    }

    #[test]
    fn propagate_skips_already_marked_subtrees() {
        let system = MockSystem::default();
        let a = system.node(Flags::MUTABLE);
        let b = system.node(Flags::MUTABLE | Flags::PENDING);
        let e = system.node(Flags::WATCHING);
        system.depend(b, a);
        system.depend(e, b);

        system.write(a);

        assert!(system.notified.borrow().is_empty());
        assert_eq!(system.flags_of(e), Flags::WATCHING);
    }

    #[test]
    fn propagate_defers_subscriber_in_its_own_pass() {
        let system = MockSystem::default();
        let a = system.node(Flags::MUTABLE);
        let e = system.node(Flags::WATCHING);

        system.start_tracking(e);
        system.link(a, e, 1);
        system.write(a);

        assert!(system.notified.borrow().is_empty());
        assert_eq!(
            system.flags_of(e),
            Flags::WATCHING | Flags::RECURSED_CHECK | Flags::RECURSED | Flags::PENDING
        );

        system.end_tracking(e);
        system.write(a);

        assert_eq!(*system.notified.borrow(), vec![e]);
        assert_eq!(system.flags_of(e), Flags::WATCHING | Flags::PENDING);
    }

    #[test]
    fn propagate_ignores_unconfirmed_edge_of_running_pass() {
        let system = MockSystem::default();
        let a = system.node(Flags::MUTABLE);
        let e = system.node(Flags::WATCHING);
        system.depend(e, a);

        // The pass has started but has not read `a` yet.
        system.start_tracking(e);
        system.write(a);

        assert!(system.notified.borrow().is_empty());
        assert_eq!(system.flags_of(e), Flags::WATCHING | Flags::RECURSED_CHECK);
    }

    #[test]
    fn check_dirty_updates_each_ancestor_once() {
        let system = MockSystem::default();
        let [a, b, _c, d, e] = diamond(&system);
        system.write(a);

        assert!(system.check_dirty(system.first_dep(e), e));

        // `c` is left dirty for `d`'s own recomputation to pull.
        assert_eq!(*system.updated.borrow(), vec![a, b, d]);
    }

    #[test]
    fn check_dirty_bails_out_when_nothing_changed() {
        let system = MockSystem::default();
        let [a, b, c, d, e] = diamond(&system);
        system.unchanged.borrow_mut().insert(a);
        system.write(a);

        assert!(!system.check_dirty(system.first_dep(e), e));

        assert_eq!(*system.updated.borrow(), vec![a]);
        for node in [b, c, d] {
            assert!(!system.flags_of(node).contains(Flags::PENDING), "{node:?}");
        }
    }

    #[test]
    fn check_dirty_stops_at_unchanged_intermediate() {
        let system = MockSystem::default();
        let a = system.node(Flags::MUTABLE);
        let b = system.node(Flags::MUTABLE);
        let c = system.node(Flags::MUTABLE);
        system.depend(b, a);
        system.depend(c, b);
        system.unchanged.borrow_mut().insert(b);
        system.write(a);

        assert!(!system.check_dirty(system.first_dep(c), c));
        assert_eq!(*system.updated.borrow(), vec![a, b]);
    }

    #[test]
    fn shallow_propagate_promotes_one_level() {
        let system = MockSystem::default();
        let a = system.node(Flags::MUTABLE);
        let b = system.node(Flags::MUTABLE | Flags::PENDING);
        let e = system.node(Flags::WATCHING | Flags::PENDING);
        let running = system.node(Flags::WATCHING | Flags::PENDING | Flags::RECURSED_CHECK);
        let deeper = system.node(Flags::WATCHING | Flags::PENDING);
        system.depend(b, a);
        system.depend(e, a);
        system.depend(running, a);
        system.depend(deeper, b);

        system.shallow_propagate(system.first_sub(a));

        assert!(system.flags_of(b).contains(Flags::DIRTY));
        assert!(system.flags_of(e).contains(Flags::DIRTY));
        assert!(system.flags_of(running).contains(Flags::DIRTY));
        assert!(!system.flags_of(deeper).contains(Flags::DIRTY));
        assert_eq!(*system.notified.borrow(), vec![e]);
    }

    #[test]
    fn end_tracking_prunes_unconfirmed_edges() {
        let system = MockSystem::default();
        let a = system.node(Flags::MUTABLE);
        let b = system.node(Flags::MUTABLE);
        let sub = system.node(Flags::MUTABLE);
        system.depend(sub, a);
        system.depend(sub, b);

        system.start_tracking(sub);
        system.link(b, sub, 1);
        system.end_tracking(sub);

        let graph = system.graph.borrow();
        assert_eq!(graph.dependencies(sub).collect::<Vec<_>>(), vec![b]);
        assert_eq!(*system.unwatched.borrow(), vec![a]);
        assert!(!graph.flags(sub).contains(Flags::RECURSED_CHECK));
    }

    #[test]
    fn propagate_handles_long_chains_without_recursion() {
        let system = MockSystem::default();
        let source = system.node(Flags::MUTABLE);
        let mut tail = source;
        for _ in 0..50_000 {
            let next = system.node(Flags::MUTABLE);
            system.depend(next, tail);
            tail = next;
        }
        let watcher = system.node(Flags::WATCHING);
        system.depend(watcher, tail);

        system.write(source);
        assert_eq!(*system.notified.borrow(), vec![watcher]);

        assert!(system.check_dirty(system.first_dep(watcher), watcher));
        assert_eq!(system.updated.borrow().len(), 50_001);
    }
}
