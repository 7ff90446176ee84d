//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects and scopes. It owns the dependency graph, the run queue and the
//! evaluation context.
//!
//! # How It Works
//!
//! 1. Reading a signal or computed inside an evaluation links it to the
//!    nearest tracking subscriber (`track`).
//!
//! 2. Writing a signal marks everything downstream `PENDING` and queues the
//!    effects it reaches (`Graph::propagate`), then drains the queue unless a
//!    batch is open.
//!
//! 3. Queued effects and read computeds verify their dependencies before
//!    recomputing (`check_dirty`), so unchanged values stop propagation.
//!
//! # Thread Confinement
//!
//! There is one runtime per thread, held in a thread local. Handles are
//! `!Send`, so a value can only be reached from the thread that created it.
//! All state sits in `Cell`/`RefCell`; graph borrows are released before any
//! user code runs, so closures may freely read, write, create and dispose.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use super::context::ContextGuard;
use crate::config::EngineConfig;
use crate::graph::{Flags, Graph, GraphEvent, NodeId, NodeKind, RunQueue};
use crate::timer::{ManualScheduler, TaskScheduler};

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Per-thread engine state.
pub(crate) struct Runtime {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) queue: RefCell<RunQueue>,

    /// The subscriber reads are attributed to.
    pub(crate) active_sub: Cell<Option<NodeId>>,
    /// Subscribers saved by `pause_tracking`.
    pub(crate) paused: RefCell<Vec<Option<NodeId>>>,

    /// Evaluation counter stamped on links.
    pub(crate) cycle: Cell<u64>,
    pub(crate) batch_depth: Cell<u32>,
    /// Non-zero while activation listeners run.
    pub(crate) activation_depth: Cell<u32>,

    pub(crate) scheduler: RefCell<Rc<dyn TaskScheduler>>,
    pub(crate) config: RefCell<EngineConfig>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            queue: RefCell::new(RunQueue::default()),
            active_sub: Cell::new(None),
            paused: RefCell::new(Vec::new()),
            cycle: Cell::new(0),
            batch_depth: Cell::new(0),
            activation_depth: Cell::new(0),
            scheduler: RefCell::new(Rc::new(ManualScheduler::new())),
            config: RefCell::new(EngineConfig::global_default()),
        }
    }

    /// Run `f` against this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but does nothing once the thread local has
    /// been torn down. Used from `Drop` impls.
    pub(crate) fn try_with(f: impl FnOnce(&Runtime)) {
        let _ = RUNTIME.try_with(f);
    }

    pub(crate) fn next_cycle(&self) -> u64 {
        let cycle = self.cycle.get() + 1;
        self.cycle.set(cycle);
        cycle
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Attribute a read of `dep` to the current evaluation.
    ///
    /// Scopes do not track, so the read goes to the nearest owner that does.
    /// Returns the subscriber the read was linked to.
    pub(crate) fn track(&self, dep: NodeId) -> Option<NodeId> {
        let mut sub = self.active_sub.get()?;
        let (created, active) = {
            let mut graph = self.graph.borrow_mut();
            loop {
                if graph
                    .flags(sub)
                    .intersects(Flags::MUTABLE | Flags::WATCHING | Flags::RECURSED_CHECK)
                {
                    break;
                }
                sub = graph.owner(sub)?;
            }
            let created = graph.link(dep, sub, self.cycle.get());
            let active = graph
                .nodes
                .get(sub)
                .is_some_and(|node| graph.is_active_subscriber(node));
            (created, active)
        };

        if created && active {
            self.activate(dep);
        }
        Some(sub)
    }

    /// Flag a subscriber that read a value which went stale during the read
    /// itself, so it evaluates again once it returns.
    pub(crate) fn invalidate_reader(&self, reader: NodeId) {
        let mut graph = self.graph.borrow_mut();
        let Some(node) = graph.nodes.get_mut(reader) else {
            return;
        };
        if node.is_effect() {
            node.flags.insert(Flags::RERUN);
        } else if node.flags.contains(Flags::MUTABLE) {
            node.flags.insert(Flags::DIRTY);
        }
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Start a tracked evaluation of `id`. Reads made until the returned
    /// guard drops are recorded as its dependencies; dependencies that were
    /// not read again are dropped when it does.
    pub(crate) fn begin_evaluation(&self, id: NodeId, flags: Flags) -> Evaluation<'_> {
        self.next_cycle();
        {
            let mut graph = self.graph.borrow_mut();
            if let Some(node) = graph.nodes.get_mut(id) {
                node.deps_tail = None;
                node.flags = flags;
            }
        }
        Evaluation {
            runtime: self,
            id,
            context: self.enter(Some(id)),
        }
    }

    /// Handle graph events produced by unlinking. Runs until the event
    /// queue is empty, including events raised while handling.
    pub(crate) fn settle(&self) {
        loop {
            let event = self.graph.borrow_mut().pop_event();
            match event {
                Some(GraphEvent::Orphaned(id)) => self.dispose_node(id),
                Some(GraphEvent::Unsubscribed(id)) => self.on_unsubscribed(id),
                None => break,
            }
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Dispose an effect or scope: detach it, dispose the children that it
    /// owned, then run its last teardown.
    pub(crate) fn dispose_node(&self, id: NodeId) {
        let node = {
            let mut graph = self.graph.borrow_mut();
            if !graph.contains(id) {
                return;
            }
            graph.unlink_all_deps(id);
            graph.unlink_all_subs(id);
            graph.remove(id)
        };
        trace!(?id, "disposed");
        self.settle();

        let Some(node) = node else { return };
        if let NodeKind::Effect(cell) = &node.kind {
            if let Some(teardown) = cell.take_teardown() {
                self.untracked(|| teardown.run());
            }
        }
        drop(node);
    }

    /// Remove a signal or computed whose last handle went away.
    pub(crate) fn release(&self, id: NodeId) {
        let node = {
            let mut graph = self.graph.borrow_mut();
            if !graph.contains(id) {
                return;
            }
            graph.unlink_all_subs(id);
            graph.unlink_all_deps(id);
            graph.remove(id)
        };
        trace!(?id, "released");

        if let Some(node) = node {
            self.retire(id, node);
        }
        self.settle();
    }
}

/// Guard returned by [`Runtime::begin_evaluation`].
///
/// On drop: restores the previous subscriber, clears `RECURSED_CHECK`,
/// purges unconfirmed dependencies, and leaves a computed `DIRTY` when the
/// evaluation unwound so the next read retries it.
pub(crate) struct Evaluation<'rt> {
    runtime: &'rt Runtime,
    id: NodeId,
    context: ContextGuard<'rt>,
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        let rt = self.runtime;
        rt.active_sub.set(self.context.prev());
        {
            let mut graph = rt.graph.borrow_mut();
            graph.remove_flags(self.id, Flags::RECURSED_CHECK);
            if std::thread::panicking() && graph.flags(self.id).contains(Flags::MUTABLE) {
                graph.insert_flags(self.id, Flags::DIRTY);
            }
            graph.purge_deps(self.id);
        }
        rt.settle();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
