//! Propagation (push phase)
//!
//! After a signal commits a new value we walk its subscriber lists and mark
//! everything downstream as possibly stale. The walk is iterative: a small
//! explicit stack holds the sibling to resume at whenever we descend into a
//! node with more than one subscriber. A node reachable through several paths
//! is only processed once per pass because the second visit finds it already
//! `PROPAGATED`.

use smallvec::SmallVec;

use super::{Flags, Graph, LinkId, NodeId, NodeKind, RunQueue};

impl Graph {
    /// Mark everything reachable from the subscriber edge `link`.
    ///
    /// `reentrant` is set while activation listeners run: a subscriber that is
    /// evaluating right now and has already read the changed node is flagged
    /// so it re-evaluates once it returns, instead of being skipped.
    pub(crate) fn propagate(&mut self, mut link: LinkId, queue: &mut RunQueue, reentrant: bool) {
        let mut next = self.links[link].next_sub;
        let mut stack: SmallVec<[Option<LinkId>; 16]> = SmallVec::new();

        'top: loop {
            let sub = self.links[link].sub;
            let visit = self.mark(link, sub, reentrant);

            if visit.contains(Flags::WATCHING) {
                self.notify(sub, queue);
            }

            if visit.contains(Flags::MUTABLE) {
                if let Some(sub_subs) = self.nodes[sub].subs {
                    link = sub_subs;
                    if let Some(sibling) = self.links[sub_subs].next_sub {
                        stack.push(next);
                        next = Some(sibling);
                    }
                    continue;
                }
            }

            if let Some(sibling) = next {
                link = sibling;
                next = self.links[sibling].next_sub;
                continue;
            }

            while let Some(resume) = stack.pop() {
                if let Some(resume) = resume {
                    link = resume;
                    next = self.links[resume].next_sub;
                    continue 'top;
                }
            }
            break;
        }
    }

    /// Update the flags of `sub`, reached through `link`. Returns the flags
    /// that decide whether to notify it and whether to walk past it; empty
    /// means stop here.
    fn mark(&mut self, link: LinkId, sub: NodeId, reentrant: bool) -> Flags {
        let flags = self.nodes[sub].flags;
        let busy = Flags::RECURSED_CHECK | Flags::RECURSED;

        if !flags.intersects(busy | Flags::PROPAGATED) {
            self.nodes[sub].flags = flags | Flags::PENDING;
            flags
        } else if !flags.intersects(busy) {
            Flags::empty()
        } else if !flags.contains(Flags::RECURSED_CHECK) {
            self.nodes[sub].flags = (flags - Flags::RECURSED) | Flags::PENDING;
            flags
        } else if reentrant && self.is_valid_link(link, sub) {
            let node = &mut self.nodes[sub];
            if node.is_effect() {
                node.flags |= Flags::RERUN;
            } else {
                node.flags |= Flags::DIRTY;
            }
            flags & Flags::MUTABLE
        } else if !flags.intersects(Flags::PROPAGATED) && self.is_valid_link(link, sub) {
            self.nodes[sub].flags = flags | Flags::RECURSED | Flags::PENDING;
            flags & Flags::MUTABLE
        } else {
            Flags::empty()
        }
    }

    /// Promote the direct subscribers of a node that turned out to have
    /// changed from `PENDING` to `DIRTY`, without walking further.
    pub(crate) fn shallow_propagate(&mut self, first: LinkId, queue: &mut RunQueue) {
        let mut cursor = Some(first);
        while let Some(link) = cursor.and_then(|id| self.links.get(id)) {
            let sub = link.sub;
            cursor = link.next_sub;

            let flags = self.nodes[sub].flags;
            if flags & Flags::PROPAGATED == Flags::PENDING {
                self.nodes[sub].flags = flags | Flags::DIRTY;
                if flags & (Flags::WATCHING | Flags::RECURSED_CHECK) == Flags::WATCHING {
                    self.notify(sub, queue);
                }
            }
        }
    }

    /// Queue `effect`, preceded by every still-watching effect that owns it.
    /// Scopes between two effects are climbed through, never queued.
    ///
    /// The chain is collected innermost first and then reversed in place, so
    /// the outermost effect runs first.
    pub(crate) fn notify(&mut self, effect: NodeId, queue: &mut RunQueue) {
        let first = queue.len();
        let mut current = effect;
        loop {
            self.nodes[current].flags.remove(Flags::WATCHING);
            queue.push(current);

            match self.watching_owner(current) {
                Some(owner) => current = owner,
                None => break,
            }
        }
        queue.reverse_from(first);
    }

    /// The nearest effect above `id`, skipping scopes, if it is still
    /// watching.
    fn watching_owner(&self, id: NodeId) -> Option<NodeId> {
        let mut owner = self.owner(id)?;
        while matches!(self.nodes.get(owner)?.kind, NodeKind::Scope) {
            owner = self.owner(owner)?;
        }
        let node = self.nodes.get(owner)?;
        (node.is_effect() && node.flags.contains(Flags::WATCHING)).then_some(owner)
    }
}
