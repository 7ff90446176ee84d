//! Verification (pull phase)
//!
//! Propagation only marks nodes `PENDING`: something upstream changed, but
//! it may have settled back to an equal value. Before a pending computed is
//! read, or a pending effect re-runs, we walk its dependencies depth first
//! and bring them up to date bottom-up:
//!
//! - a `DIRTY` dependency is recomputed; only if its value actually changed
//!   does the subscriber become dirty (value-equality bailout);
//! - a `PENDING` dependency is verified recursively first;
//! - a dependency that turned out unchanged has its `PENDING` cleared.
//!
//! The walk stops at the first dependency that really changed. Everything
//! after it will be re-read by the recomputation anyway.
//!
//! User code runs in the middle of this walk (recomputations), so no graph
//! borrow is held across `refresh`, and every edge is re-resolved after it.
//! An edge that vanished in the meantime makes the walk give up and report
//! the node as dirty; recomputing is always correct, only slower.

use smallvec::SmallVec;

use super::runtime::Runtime;
use crate::graph::{Flags, LinkId, NodeId};

impl Runtime {
    /// Whether any dependency of `sub` really changed.
    pub(crate) fn check_dirty(&self, sub: NodeId) -> bool {
        let Some(mut link) = self.graph.borrow().first_dep(sub) else {
            return false;
        };
        let mut sub = sub;
        let mut stack: SmallVec<[LinkId; 8]> = SmallVec::new();
        let mut dirty = false;

        'top: loop {
            let (dep, dep_flags, sub_flags) = {
                let graph = self.graph.borrow();
                let Some(edge) = graph.edge(link) else {
                    return true;
                };
                (edge.dep, graph.flags(edge.dep), graph.flags(sub))
            };

            if sub_flags.contains(Flags::DIRTY) {
                dirty = true;
            } else if dep_flags.contains(Flags::MUTABLE | Flags::DIRTY) {
                if self.refresh(dep) {
                    self.shallow_propagate_siblings(dep);
                    dirty = true;
                }
            } else if dep_flags.contains(Flags::MUTABLE | Flags::PENDING) {
                let first = self.graph.borrow().first_dep(dep);
                match first {
                    Some(first) => {
                        stack.push(link);
                        link = first;
                        sub = dep;
                        continue;
                    }
                    None => self.graph.borrow_mut().remove_flags(dep, Flags::PENDING),
                }
            }

            if !dirty {
                let next = self.graph.borrow().edge(link).and_then(|edge| edge.next_dep);
                if let Some(next) = next {
                    link = next;
                    continue;
                }
            }

            // Climb back up, settling each level on the way.
            while let Some(up) = stack.pop() {
                if dirty {
                    if self.refresh(sub) {
                        self.shallow_propagate_siblings(sub);
                        match self.graph.borrow().edge(up) {
                            Some(edge) => sub = edge.sub,
                            None => return true,
                        }
                        continue;
                    }
                    dirty = false;
                } else {
                    self.graph.borrow_mut().remove_flags(sub, Flags::PENDING);
                }

                let next = {
                    let graph = self.graph.borrow();
                    let Some(edge) = graph.edge(up) else {
                        return true;
                    };
                    sub = edge.sub;
                    edge.next_dep
                };
                if let Some(next) = next {
                    link = next;
                    continue 'top;
                }
            }

            return dirty;
        }
    }

    /// Recompute a computed or commit a signal's pending write. Returns
    /// whether the value changed.
    pub(crate) fn refresh(&self, id: NodeId) -> bool {
        let state = self.graph.borrow().refresher(id);
        state.is_some_and(|state| state.refresh())
    }

    /// Bring a computed up to date before it is read.
    pub(crate) fn sync_computed(&self, id: NodeId) {
        let flags = self.graph.borrow().flags(id);
        let stale = if flags.is_empty() || flags.contains(Flags::DIRTY) {
            true
        } else if flags.contains(Flags::PENDING) {
            let dirty = self.check_dirty(id);
            if !dirty {
                self.graph.borrow_mut().remove_flags(id, Flags::PENDING);
            }
            dirty
        } else {
            false
        };

        if stale && self.refresh(id) {
            self.shallow_propagate_from(id);
        }
    }

    /// Commit a signal's pending write before it is read.
    pub(crate) fn sync_signal(&self, id: NodeId) {
        let dirty = self.graph.borrow().flags(id).contains(Flags::DIRTY);
        if dirty && self.refresh(id) {
            self.shallow_propagate_from(id);
        }
    }

    fn shallow_propagate_from(&self, id: NodeId) {
        let mut graph = self.graph.borrow_mut();
        if let Some(first) = graph.first_sub(id) {
            graph.shallow_propagate(first, &mut self.queue.borrow_mut());
        }
    }

    /// After a recompute found during verification: the subscriber being
    /// verified already knows, the other subscribers still need telling.
    fn shallow_propagate_siblings(&self, id: NodeId) {
        let mut graph = self.graph.borrow_mut();
        let Some(first) = graph.first_sub(id) else {
            return;
        };
        if graph.edge(first).is_some_and(|edge| edge.next_sub.is_some()) {
            graph.shallow_propagate(first, &mut self.queue.borrow_mut());
        }
    }
}
