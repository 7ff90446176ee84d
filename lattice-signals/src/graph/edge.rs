//! Edge Management
//!
//! Creating, reusing and removing links.
//!
//! A subscriber's dependency list is split by its `deps_tail` pointer: links
//! up to and including the tail were confirmed by the running evaluation,
//! links after it were read last time and not (yet) this time. Evaluation
//! starts with `deps_tail = None`, every read advances the tail, and
//! [`Graph::purge_deps`] drops whatever is left past it.

use super::{Activation, Flags, Graph, GraphEvent, Link, LinkId, NodeId, NodeKind};

impl Graph {
    /// Record that `sub` read `dep` during evaluation cycle `version`.
    ///
    /// Returns `true` when a new edge was allocated, `false` when an existing
    /// one was confirmed.
    pub(crate) fn link(&mut self, dep: NodeId, sub: NodeId, version: u64) -> bool {
        let Some(sub_node) = self.nodes.get(sub) else {
            return false;
        };
        if !self.nodes.contains_key(dep) {
            return false;
        }

        let prev_dep = sub_node.deps_tail;
        if let Some(prev) = prev_dep {
            if self.links[prev].dep == dep {
                return false;
            }
        }

        let next_dep = match prev_dep {
            Some(prev) => self.links[prev].next_dep,
            None => sub_node.deps,
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

        if let Some(existing) = self.find_dep(sub, dep) {
            if self.is_confirmed(sub, existing) {
                return false;
            }
            self.move_to_tail(sub, existing, version);
            return false;
        }

        let id = self.links.insert(Link {
            version,
            dep,
            sub,
            prev_dep,
            next_dep,
            prev_sub,
            next_sub: None,
        });

        self.nodes[sub].deps_tail = Some(id);
        self.nodes[dep].subs_tail = Some(id);
        if let Some(next) = next_dep {
            self.links[next].prev_dep = Some(id);
        }
        match prev_dep {
            Some(prev) => self.links[prev].next_dep = Some(id),
            None => self.nodes[sub].deps = Some(id),
        }
        match prev_sub {
            Some(prev) => self.links[prev].next_sub = Some(id),
            None => self.nodes[dep].subs = Some(id),
        }
        true
    }

    /// Remove `id` from both lists and return the next dependency of its
    /// subscriber.
    pub(crate) fn unlink(&mut self, id: LinkId) -> Option<LinkId> {
        let link = self.links.remove(id)?;

        if let Some(next) = link.next_dep {
            self.links[next].prev_dep = link.prev_dep;
        }
        if let Some(sub) = self.nodes.get_mut(link.sub) {
            if sub.deps_tail == Some(id) {
                sub.deps_tail = link.prev_dep;
            }
            if link.prev_dep.is_none() {
                sub.deps = link.next_dep;
            }
        }
        if let Some(prev) = link.prev_dep {
            self.links[prev].next_dep = link.next_dep;
        }

        if let Some(next) = link.next_sub {
            self.links[next].prev_sub = link.prev_sub;
        } else if let Some(dep) = self.nodes.get_mut(link.dep) {
            dep.subs_tail = link.prev_sub;
        }
        let unwatched = match link.prev_sub {
            Some(prev) => {
                self.links[prev].next_sub = link.next_sub;
                false
            }
            None => match self.nodes.get_mut(link.dep) {
                Some(dep) => {
                    dep.subs = link.next_sub;
                    dep.subs.is_none()
                }
                None => false,
            },
        };

        if self
            .nodes
            .get(link.dep)
            .is_some_and(|dep| dep.kind.is_mountable())
        {
            self.push_event(GraphEvent::Unsubscribed(link.dep));
        }
        if unwatched {
            self.unwatched(link.dep);
        }
        link.next_dep
    }

    /// Drop every dependency of `sub` past its confirmed tail.
    pub(crate) fn purge_deps(&mut self, sub: NodeId) {
        let Some(node) = self.nodes.get(sub) else {
            return;
        };
        let mut cursor = match node.deps_tail {
            Some(tail) => self.links[tail].next_dep,
            None => node.deps,
        };
        while let Some(link) = cursor {
            cursor = self.unlink(link);
        }
    }

    /// Drop every dependency of `sub`.
    pub(crate) fn unlink_all_deps(&mut self, sub: NodeId) {
        let mut cursor = self.first_dep(sub);
        while let Some(link) = cursor {
            cursor = self.unlink(link);
        }
    }

    /// Drop every subscriber of `dep`.
    pub(crate) fn unlink_all_subs(&mut self, dep: NodeId) {
        while let Some(link) = self.first_sub(dep) {
            self.unlink(link);
        }
    }

    /// `dep` just lost its last subscriber.
    fn unwatched(&mut self, dep: NodeId) {
        let Some(node) = self.nodes.get_mut(dep) else {
            return;
        };
        if matches!(node.kind, NodeKind::Effect(_) | NodeKind::Scope) {
            self.push_event(GraphEvent::Orphaned(dep));
            return;
        }
        // A mounted computed keeps its sources until it is unmounted, so they
        // stay mounted through its deactivation delay. A computed that is
        // still collecting its first reads keeps them too.
        if matches!(node.kind, NodeKind::Computed(_))
            && node.activation == Activation::Inactive
            && node.deps_tail.is_some()
        {
            self.release_sources(dep);
        }
    }

    /// Drop the dependencies of a computed nobody reads any more; it
    /// recomputes on its next read. No-op while it has subscribers or is
    /// evaluating.
    pub(crate) fn release_sources(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if !matches!(node.kind, NodeKind::Computed(_))
            || node.subs.is_some()
            || node.flags.contains(Flags::RECURSED_CHECK)
        {
            return;
        }
        node.deps_tail = None;
        node.flags = Flags::MUTABLE | Flags::DIRTY;
        self.purge_deps(id);
    }

    /// Whether `link` is among the dependencies `sub` confirmed so far.
    pub(crate) fn is_valid_link(&self, link: LinkId, sub: NodeId) -> bool {
        let mut cursor = self.nodes.get(sub).and_then(|node| node.deps_tail);
        while let Some(current) = cursor {
            if current == link {
                return true;
            }
            cursor = self.links.get(current).and_then(|l| l.prev_dep);
        }
        false
    }

    fn find_dep(&self, sub: NodeId, dep: NodeId) -> Option<LinkId> {
        let mut cursor = self.first_dep(sub);
        while let Some(id) = cursor {
            let link = &self.links[id];
            if link.dep == dep {
                return Some(id);
            }
            cursor = link.next_dep;
        }
        None
    }

    fn is_confirmed(&self, sub: NodeId, link: LinkId) -> bool {
        self.is_valid_link(link, sub)
    }

    /// Splice an unconfirmed dependency link right after the confirmed tail.
    fn move_to_tail(&mut self, sub: NodeId, id: LinkId, version: u64) {
        let Link {
            prev_dep, next_dep, ..
        } = self.links[id];

        // Out of its current position. It sits past the first unconfirmed
        // link, so it always has a predecessor.
        if let Some(prev) = prev_dep {
            self.links[prev].next_dep = next_dep;
        }
        if let Some(next) = next_dep {
            self.links[next].prev_dep = prev_dep;
        }

        // Into the slot after the tail.
        let tail = self.nodes[sub].deps_tail;
        let after = match tail {
            Some(tail) => self.links[tail].next_dep,
            None => self.nodes[sub].deps,
        };
        {
            let link = &mut self.links[id];
            link.prev_dep = tail;
            link.next_dep = after;
            link.version = version;
        }
        if let Some(after) = after {
            self.links[after].prev_dep = Some(id);
        }
        match tail {
            Some(tail) => self.links[tail].next_dep = Some(id),
            None => self.nodes[sub].deps = Some(id),
        }
        self.nodes[sub].deps_tail = Some(id);
    }
}
