//! Flushing & Batching
//!
//! Writes flush immediately: the effects that propagation queued run before
//! `set` returns. Inside [`batch`] writes still propagate, but the queue is
//! drained once, when the outermost batch exits, so an effect that depends on
//! several written signals runs once and sees all of the writes.
//!
//! # Panics
//!
//! An effect that panics unwinds out of the flush that ran it. The effects
//! still waiting in the queue are not run during unwinding; they get their
//! `WATCHING` flag back so the next write reaches them again. A batch closure
//! that panics abandons the queue the same way.

use tracing::trace;

use super::runtime::Runtime;
use crate::graph::{Flags, NodeId};

impl Runtime {
    /// Drain the run queue.
    ///
    /// Re-entrant: an effect that writes signals while the queue drains
    /// appends to the same queue and the nested call keeps draining it.
    pub(crate) fn flush(&self) {
        let guard = AbandonOnUnwind(self);
        loop {
            let next = self.queue.borrow_mut().pop_next();
            let Some(id) = next else { break };
            self.run_effect(id);
        }
        drop(guard);
    }

    pub(crate) fn flush_unless_batching(&self) {
        if self.batch_depth.get() == 0 {
            self.flush();
        }
    }

    /// Queue a single effect (and its watching owners).
    pub(crate) fn enqueue(&self, id: NodeId) {
        let mut graph = self.graph.borrow_mut();
        if graph.contains(id) {
            graph.notify(id, &mut self.queue.borrow_mut());
        }
    }

    /// Mark `id` as written and push the change to its subscribers.
    pub(crate) fn propagate_write(&self, id: NodeId) {
        let reentrant = self.activation_depth.get() > 0;
        {
            let mut graph = self.graph.borrow_mut();
            graph.set_flags(id, Flags::MUTABLE | Flags::DIRTY);
            if let Some(first) = graph.first_sub(id) {
                graph.propagate(first, &mut self.queue.borrow_mut(), reentrant);
            }
        }
        self.flush_unless_batching();
    }

    /// Put every queued effect that did not run back into the watching
    /// state.
    fn abandon_queue(&self) {
        let rest = self.queue.borrow_mut().abandon();
        if rest.is_empty() {
            return;
        }
        trace!(count = rest.len(), "abandoned queued effects");
        let mut graph = self.graph.borrow_mut();
        for id in rest {
            graph.insert_flags(id, Flags::WATCHING | Flags::RECURSED);
        }
    }

    pub(crate) fn start_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    /// Close a batch. Returns `true` when it was the outermost one.
    fn close_batch(&self) -> bool {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth == 0
    }
}

/// Abandons the queue if dropped while unwinding.
struct AbandonOnUnwind<'rt>(&'rt Runtime);

impl Drop for AbandonOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abandon_queue();
        }
    }
}

/// Closes a batch opened by [`batch`] when its closure unwinds.
struct BatchGuard<'rt>(&'rt Runtime);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.0.close_batch() && std::thread::panicking() {
            self.0.abandon_queue();
        }
    }
}

/// Run `f` with effects deferred until it returns.
///
/// Batches nest; only the outermost one flushes.
///
/// ```rust,ignore
/// let a = signal(1);
/// let b = signal(2);
/// effect(move |_| println!("{}", a.get() + b.get())); // prints 3
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// }); // prints 30, once
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::with(|rt| {
        rt.start_batch();
        let result = {
            let _guard = BatchGuard(rt);
            f()
        };
        rt.flush_unless_batching();
        result
    })
}

/// Open a batch without a closure. Must be paired with [`end_batch`].
pub fn start_batch() {
    Runtime::with(Runtime::start_batch);
}

/// Close a batch opened by [`start_batch`], flushing if it was the
/// outermost one.
pub fn end_batch() {
    Runtime::with(|rt| {
        if rt.close_batch() {
            rt.flush();
        }
    });
}
