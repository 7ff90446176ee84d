//! Dependency Graph
//!
//! This module implements the dependency graph that connects signals,
//! computeds, effects and scopes.
//!
//! # Overview
//!
//! The graph is an arena of [`Node`]s and [`Link`]s:
//!
//! - Nodes are the reactive primitives. Each one owns the heads and tails of
//!   two edge lists: the dependencies it read, and the subscribers that read
//!   it.
//! - Links are edges. One link sits in both lists at once, so linking and
//!   unlinking are O(1) splices.
//!
//! When a signal changes we walk its subscriber lists outward and mark nodes
//! `PENDING` (push phase). Reads then resolve pending nodes bottom-up (pull
//! phase, see `reactive::verify`). Effects reached by the walk are queued in
//! the [`RunQueue`].
//!
//! # Design Decisions
//!
//! 1. Nothing in this module calls user code. Unlinking can make a node lose
//!    its last subscriber, which for an effect means disposal (teardowns are
//!    user code). Such consequences are recorded as [`GraphEvent`]s and
//!    handled by the runtime once it has released the graph borrow.
//!
//! 2. Keys are generation checked (`slotmap`). A traversal that outlives a
//!    node sees `None`, never a recycled slot.
//!
//! 3. A global `cycle` stamp on links replaces per-edge "seen" booleans.

mod edge;
mod node;
mod propagate;
mod scheduler;

use std::collections::VecDeque;
use std::rc::Rc;

use slotmap::SlotMap;

pub use node::NodeId;
pub(crate) use node::{Activation, Flags, Link, LinkId, Listener, Node, NodeKind, Refresh};
pub(crate) use scheduler::RunQueue;

/// Structural consequences of unlinking that need the runtime's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GraphEvent {
    /// A signal or computed lost a subscriber; its mount state may change.
    Unsubscribed(NodeId),
    /// An effect or scope lost its owner and must be disposed.
    Orphaned(NodeId),
}

/// The node and link arenas.
#[derive(Default)]
pub(crate) struct Graph {
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) links: SlotMap<LinkId, Link>,
    events: VecDeque<GraphEvent>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Remove a node from the arena.
    ///
    /// The node must already be detached from every list. The node is handed
    /// back so the caller can drop its payload outside of any graph borrow.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Flags of a node, empty when the node is gone.
    pub(crate) fn flags(&self, id: NodeId) -> Flags {
        self.nodes.get(id).map(|node| node.flags).unwrap_or_default()
    }

    pub(crate) fn set_flags(&mut self, id: NodeId, flags: Flags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags = flags;
        }
    }

    pub(crate) fn insert_flags(&mut self, id: NodeId, flags: Flags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags.insert(flags);
        }
    }

    pub(crate) fn remove_flags(&mut self, id: NodeId, flags: Flags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags.remove(flags);
        }
    }

    pub(crate) fn first_dep(&self, id: NodeId) -> Option<LinkId> {
        self.nodes.get(id).and_then(|node| node.deps)
    }

    pub(crate) fn first_sub(&self, id: NodeId) -> Option<LinkId> {
        self.nodes.get(id).and_then(|node| node.subs)
    }

    pub(crate) fn edge(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// The subscriber an effect or scope is owned by, if any.
    pub(crate) fn owner(&self, id: NodeId) -> Option<NodeId> {
        self.first_sub(id)
            .and_then(|link| self.links.get(link))
            .map(|link| link.sub)
    }

    /// Ids of every dependency of `id`, in read order.
    pub(crate) fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.first_dep(id);
        while let Some(link) = cursor.and_then(|l| self.links.get(l)) {
            out.push(link.dep);
            cursor = link.next_dep;
        }
        out
    }

    /// Number of subscriber edges of `id`.
    pub(crate) fn subscriber_count(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut cursor = self.first_sub(id);
        while let Some(link) = cursor.and_then(|l| self.links.get(l)) {
            count += 1;
            cursor = link.next_sub;
        }
        count
    }

    /// Whether `id` is read by an effect or by a mounted computed.
    pub(crate) fn has_active_subscriber(&self, id: NodeId) -> bool {
        let mut cursor = self.first_sub(id);
        while let Some(link) = cursor.and_then(|l| self.links.get(l)) {
            if let Some(sub) = self.nodes.get(link.sub) {
                if self.is_active_subscriber(sub) {
                    return true;
                }
            }
            cursor = link.next_sub;
        }
        false
    }

    /// Effects always count; computeds count while mounted.
    pub(crate) fn is_active_subscriber(&self, node: &Node) -> bool {
        match node.kind {
            NodeKind::Effect(_) => true,
            NodeKind::Computed(_) => node.activation != Activation::Inactive,
            NodeKind::Signal(_) | NodeKind::Scope => false,
        }
    }

    /// The typed state behind a signal or computed, if it is still alive.
    pub(crate) fn refresher(&self, id: NodeId) -> Option<Rc<dyn Refresh>> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Signal(state) | NodeKind::Computed(state) => state.upgrade(),
            NodeKind::Effect(_) | NodeKind::Scope => None,
        }
    }

    pub(crate) fn push_event(&mut self, event: GraphEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn pop_event(&mut self) -> Option<GraphEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a graph with `n` bare signal-like nodes for structural tests.
    pub(crate) fn graph_with(n: usize) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new();
        let ids = (0..n)
            .map(|_| graph.insert(Node::new(NodeKind::Scope, Flags::MUTABLE)))
            .collect();
        (graph, ids)
    }

    #[test]
    fn flags_of_missing_node_are_empty() {
        let (mut graph, ids) = graph_with(1);
        graph.set_flags(ids[0], Flags::DIRTY);
        assert_eq!(graph.flags(ids[0]), Flags::DIRTY);

        graph.remove(ids[0]);
        assert!(!graph.contains(ids[0]));
        assert!(graph.flags(ids[0]).is_empty());
    }

    #[test]
    fn dependencies_follow_read_order() {
        let (mut graph, ids) = graph_with(4);
        let sub = ids[3];
        graph.link(ids[2], sub, 1);
        graph.link(ids[0], sub, 1);
        graph.link(ids[1], sub, 1);

        assert_eq!(graph.dependencies(sub), vec![ids[2], ids[0], ids[1]]);
        assert_eq!(graph.subscriber_count(ids[0]), 1);
        assert_eq!(graph.owner(ids[0]), Some(sub));
    }
}
