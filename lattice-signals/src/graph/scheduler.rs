//! Run Queue
//!
//! The run queue holds the effects that propagation reached and that have
//! not run yet.
//!
//! # Ordering
//!
//! Effects run in the order they were queued, except that an effect is
//! always preceded by the still-watching effects that own it (see
//! [`Graph::notify`](super::Graph::notify)). That gives outer-before-inner
//! order without sorting.
//!
//! # Re-entrancy
//!
//! The queue is drained by index, not by popping. An effect that runs may
//! write signals and queue more effects; those land at the end and are picked
//! up by the same drain. The backing vector is cleared only once the cursor
//! catches up with its end.

use super::NodeId;

#[derive(Debug, Default)]
pub(crate) struct RunQueue {
    queued: Vec<NodeId>,
    cursor: usize,
}

impl RunQueue {
    pub(crate) fn push(&mut self, id: NodeId) {
        self.queued.push(id);
    }

    /// Total number of slots, including ones already handed out.
    pub(crate) fn len(&self) -> usize {
        self.queued.len()
    }

    /// Hand out the next effect to run.
    ///
    /// Resets the queue when it runs dry.
    pub(crate) fn pop_next(&mut self) -> Option<NodeId> {
        match self.queued.get(self.cursor).copied() {
            Some(id) => {
                self.cursor += 1;
                Some(id)
            }
            None => {
                self.reset();
                None
            }
        }
    }

    /// Reverse the slots queued since `first`.
    pub(crate) fn reverse_from(&mut self, first: usize) {
        if first < self.queued.len() {
            self.queued[first..].reverse();
        }
    }

    /// Drop everything not handed out yet and return it.
    pub(crate) fn abandon(&mut self) -> Vec<NodeId> {
        let rest = self.queued.split_off(self.cursor.min(self.queued.len()));
        self.reset();
        rest
    }

    fn reset(&mut self) {
        self.queued.clear();
        self.cursor = 0;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::tests::graph_with;
    use super::*;

    #[test]
    fn drains_in_order_and_resets() {
        let (_, ids) = graph_with(3);
        let mut queue = RunQueue::default();

        queue.push(ids[0]);
        queue.push(ids[1]);
        assert_eq!(queue.pop_next(), Some(ids[0]));

        // Queued while draining.
        queue.push(ids[2]);
        assert_eq!(queue.pop_next(), Some(ids[1]));
        assert_eq!(queue.pop_next(), Some(ids[2]));
        assert_eq!(queue.pop_next(), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn reverse_only_touches_the_new_segment() {
        let (_, ids) = graph_with(4);
        let mut queue = RunQueue::default();

        queue.push(ids[0]);
        let first = queue.len();
        queue.push(ids[1]);
        queue.push(ids[2]);
        queue.push(ids[3]);
        queue.reverse_from(first);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next()).collect();
        assert_eq!(order, vec![ids[0], ids[3], ids[2], ids[1]]);
    }

    #[test]
    fn abandon_returns_unprocessed_effects() {
        let (_, ids) = graph_with(3);
        let mut queue = RunQueue::default();

        for id in &ids {
            queue.push(*id);
        }
        queue.pop_next();

        assert_eq!(queue.abandon(), vec![ids[1], ids[2]]);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.pop_next(), None);
    }
}
