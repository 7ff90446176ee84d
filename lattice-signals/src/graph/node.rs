//! Graph Nodes
//!
//! This module defines the node and edge records that live in the dependency
//! graph arena.
//!
//! Every reactive primitive owns exactly one [`Node`]. Edges ([`Link`]) are
//! threaded through two intrusive doubly linked lists at once: the
//! subscriber's dependency list (`prev_dep`/`next_dep`) and the dependency's
//! subscriber list (`prev_sub`/`next_sub`). Both nodes and links are addressed
//! by generation-checked keys, so a handle to something that has been removed
//! resolves to `None` instead of aliasing a reused slot.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::reactive::EffectCell;
use crate::timer::TaskId;

new_key_type! {
    /// Identifier of a node in the reactive graph.
    pub struct NodeId;

    /// Identifier of an edge between a dependency and a subscriber.
    pub(crate) struct LinkId;
}

bitflags::bitflags! {
    /// Per-node propagation state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub(crate) struct Flags: u16 {
        /// The node holds a value that subscribers read (signal, computed).
        const MUTABLE        = 0b0000_0001;
        /// The node is an effect that is not currently queued.
        const WATCHING       = 0b0000_0010;
        /// The node is evaluating and collecting dependencies right now.
        const RECURSED_CHECK = 0b0000_0100;
        /// The node was reached by propagation while evaluating.
        const RECURSED       = 0b0000_1000;
        /// The node is definitely stale.
        const DIRTY          = 0b0001_0000;
        /// The node may be stale and needs verification.
        const PENDING        = 0b0010_0000;
        /// An activation listener invalidated this effect mid-run.
        const RERUN          = 0b0100_0000;

        /// Already marked by the current propagation pass.
        const PROPAGATED = Self::DIRTY.bits() | Self::PENDING.bits();
    }
}

/// Something that can bring its cached value up to date.
///
/// Implemented by the typed state behind signal and computed handles. The
/// graph only stores weak references, so the handles decide how long the
/// value lives.
pub(crate) trait Refresh {
    /// Recompute or commit the value. Returns `true` when it changed.
    fn refresh(&self) -> bool;
}

/// Activation listener, called with `true` on mount and `false` on unmount.
pub(crate) type Listener = Rc<RefCell<dyn FnMut(bool)>>;

/// The four node shapes.
pub(crate) enum NodeKind {
    Signal(Weak<dyn Refresh>),
    Computed(Weak<dyn Refresh>),
    Effect(Rc<EffectCell>),
    Scope,
}

impl NodeKind {
    /// Signals and computeds carry activation state.
    pub(crate) fn is_mountable(&self) -> bool {
        matches!(self, NodeKind::Signal(_) | NodeKind::Computed(_))
    }
}

/// Mount state of a signal or computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    /// No effect-rooted subscriber.
    Inactive,
    /// At least one effect-rooted subscriber.
    Active,
    /// Lost its last subscriber; waiting for the deferred teardown task.
    PendingInactive(Option<TaskId>),
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) flags: Flags,

    /// Head of the dependency list.
    pub(crate) deps: Option<LinkId>,
    /// Last dependency confirmed during the current (or latest) evaluation.
    pub(crate) deps_tail: Option<LinkId>,
    /// Head of the subscriber list.
    pub(crate) subs: Option<LinkId>,
    pub(crate) subs_tail: Option<LinkId>,

    pub(crate) activation: Activation,
    pub(crate) listeners: SmallVec<[Listener; 1]>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, flags: Flags) -> Self {
        Self {
            kind,
            flags,
            deps: None,
            deps_tail: None,
            subs: None,
            subs_tail: None,
            activation: Activation::Inactive,
            listeners: SmallVec::new(),
        }
    }

    /// Create a signal node.
    pub(crate) fn signal(state: Weak<dyn Refresh>) -> Self {
        Self::new(NodeKind::Signal(state), Flags::MUTABLE)
    }

    /// Create a computed node. It starts with no flags: uninitialized.
    pub(crate) fn computed(state: Weak<dyn Refresh>) -> Self {
        Self::new(NodeKind::Computed(state), Flags::empty())
    }

    /// Create an effect node, already in its first run.
    pub(crate) fn effect(cell: Rc<EffectCell>) -> Self {
        Self::new(
            NodeKind::Effect(cell),
            Flags::WATCHING | Flags::RECURSED_CHECK,
        )
    }

    /// Create a scope node.
    pub(crate) fn scope() -> Self {
        Self::new(NodeKind::Scope, Flags::empty())
    }

    pub(crate) fn is_effect(&self) -> bool {
        matches!(self.kind, NodeKind::Effect(_))
    }
}

/// An edge from `dep` to `sub`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Link {
    /// Evaluation cycle in which the edge was last confirmed.
    pub(crate) version: u64,
    pub(crate) dep: NodeId,
    pub(crate) sub: NodeId,
    pub(crate) prev_dep: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
}
