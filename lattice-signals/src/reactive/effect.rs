//! Effect Implementation
//!
//! An effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately (with `is_first_run = true`)
//!    to establish its initial dependencies.
//!
//! 2. When a dependency changes, propagation queues the effect. The queue is
//!    drained right after the write, or when the enclosing batch closes.
//!
//! 3. A queued effect that was only marked `PENDING` first verifies its
//!    dependencies; if none really changed it does not run.
//!
//! 4. Before re-running, the previous teardown is called. Dependencies are
//!    re-collected during the run and stale ones dropped afterwards.
//!
//! # Ownership
//!
//! An effect created while another effect or a scope is evaluating belongs to
//! it: it is linked as one of the owner's dependencies. When the owner re-runs
//! without re-creating it, or is disposed, the child is disposed too. A root
//! effect lives until its [`Dispose`] handle is used.
//!
//! # Teardown
//!
//! The body may return a [`Teardown`]. It runs before the next run and when
//! the effect is disposed, untracked.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};
use crate::graph::{Flags, Node, NodeId, NodeKind};

/// Cleanup returned by an effect body or a mount callback.
pub struct Teardown(Box<dyn FnOnce()>);

impl Teardown {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown")
    }
}

/// Values an effect body may return.
pub trait IntoTeardown {
    fn into_teardown(self) -> Option<Teardown>;
}

impl IntoTeardown for () {
    fn into_teardown(self) -> Option<Teardown> {
        None
    }
}

impl IntoTeardown for Teardown {
    fn into_teardown(self) -> Option<Teardown> {
        Some(self)
    }
}

impl IntoTeardown for Option<Teardown> {
    fn into_teardown(self) -> Option<Teardown> {
        self
    }
}

type EffectBody = Box<dyn FnMut(bool) -> Option<Teardown>>;

/// The payload of an effect node.
pub(crate) struct EffectCell {
    body: RefCell<EffectBody>,
    teardown: RefCell<Option<Teardown>>,
}

impl EffectCell {
    pub(crate) fn new(body: EffectBody) -> Self {
        Self {
            body: RefCell::new(body),
            teardown: RefCell::new(None),
        }
    }

    fn call(&self, first_run: bool) -> Option<Teardown> {
        let mut body = self
            .body
            .try_borrow_mut()
            .expect("effect body re-entered while running");
        body(first_run)
    }

    pub(crate) fn take_teardown(&self) -> Option<Teardown> {
        self.teardown.borrow_mut().take()
    }
}

/// Handle that stops an effect or scope.
///
/// Handles are `Copy`; dropping one does not dispose anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dispose {
    id: NodeId,
}

impl Dispose {
    pub(crate) fn new(id: NodeId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Detach the node and everything it owns, running teardowns.
    /// Disposing twice is a no-op.
    pub fn dispose(self) {
        Runtime::with(|rt| rt.dispose_node(self.id));
    }

    /// Like [`dispose`](Self::dispose), but reports a node that is already
    /// gone.
    pub fn try_dispose(self) -> Result<()> {
        Runtime::with(|rt| {
            if !rt.graph.borrow().contains(self.id) {
                return Err(ReactiveError::Disposed(self.id));
            }
            rt.dispose_node(self.id);
            Ok(())
        })
    }

    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| !rt.graph.borrow().contains(self.id))
    }
}

impl Runtime {
    /// Insert a node owned by the current subscriber, if there is one.
    pub(crate) fn insert_owned(&self, node: Node) -> NodeId {
        let mut graph = self.graph.borrow_mut();
        let id = graph.insert(node);
        if let Some(owner) = self.active_sub.get() {
            graph.link(id, owner, self.cycle.get());
        }
        id
    }

    fn create_effect(&self, body: EffectBody) -> Dispose {
        let cell = Rc::new(EffectCell::new(body));
        let id = self.insert_owned(Node::effect(cell.clone()));
        trace!(?id, "effect created");
        let guard = DisposeOnUnwind { runtime: self, id };
        self.invoke(id, &cell, true);
        drop(guard);
        Dispose::new(id)
    }

    /// Run a queued effect if any of its dependencies really changed.
    pub(crate) fn run_effect(&self, id: NodeId) {
        let (flags, cell) = {
            let graph = self.graph.borrow();
            match graph.nodes.get(id) {
                Some(node) => match &node.kind {
                    NodeKind::Effect(cell) => (node.flags, cell.clone()),
                    _ => return,
                },
                None => return,
            }
        };

        // Queued again through an owner chain while it is still running.
        if flags.contains(Flags::RECURSED_CHECK) {
            self.graph.borrow_mut().insert_flags(id, Flags::RERUN);
            return;
        }

        let stale = flags.contains(Flags::DIRTY)
            || (flags.contains(Flags::PENDING) && self.check_dirty(id));
        if !stale {
            self.graph.borrow_mut().set_flags(id, Flags::WATCHING);
            return;
        }

        if let Some(teardown) = cell.take_teardown() {
            self.untracked(|| teardown.run());
        }
        if self.graph.borrow().contains(id) {
            self.invoke(id, &cell, false);
        }
    }

    fn invoke(&self, id: NodeId, cell: &Rc<EffectCell>, first_run: bool) {
        trace!(?id, first_run, "effect run");
        let teardown = {
            let _eval = self.begin_evaluation(id, Flags::WATCHING | Flags::RECURSED_CHECK);
            cell.call(first_run)
        };

        if self.graph.borrow().contains(id) {
            *cell.teardown.borrow_mut() = teardown;
        } else if let Some(teardown) = teardown {
            // Disposed itself while running.
            self.untracked(|| teardown.run());
            return;
        }

        let rerun = {
            let mut graph = self.graph.borrow_mut();
            match graph.nodes.get_mut(id) {
                Some(node) if node.flags.contains(Flags::RERUN) => {
                    node.flags.remove(Flags::RERUN);
                    node.flags.insert(Flags::DIRTY);
                    true
                }
                _ => false,
            }
        };
        if rerun {
            trace!(?id, "effect invalidated during its run");
            self.enqueue(id);
            self.flush_unless_batching();
        }
    }
}

/// Disposes an effect whose first run unwound; nobody holds a handle to it.
struct DisposeOnUnwind<'rt> {
    runtime: &'rt Runtime,
    id: NodeId,
}

impl Drop for DisposeOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            trace!(id = ?self.id, "first run panicked, disposing");
            self.runtime.dispose_node(self.id);
        }
    }
}

/// Run `f` now and again whenever what it read changes.
///
/// `f` receives `true` on its first run. It may return a [`Teardown`] that
/// runs before the next run and on disposal.
///
/// ```rust,ignore
/// let count = signal(0);
/// let read = count.clone();
/// let stop = effect(move |_| println!("count = {}", read.get()));
/// count.set(1); // prints "count = 1"
/// stop.dispose();
/// ```
pub fn effect<F, R>(mut f: F) -> Dispose
where
    F: FnMut(bool) -> R + 'static,
    R: IntoTeardown,
{
    let body: EffectBody = Box::new(move |first_run| f(first_run).into_teardown());
    Runtime::with(|rt| rt.create_effect(body))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal;
    use std::cell::Cell;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Rc::new(Cell::new(0));
        let seen = runs.clone();

        let _stop = effect(move |first| {
            assert!(first);
            seen.set(seen.get() + 1);
        });

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let count = signal(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();

        let read = count.clone();
        let _stop = effect(move |first| log.borrow_mut().push((first, read.get())));
        count.set(1);
        count.set(1);
        count.set(2);

        assert_eq!(*seen.borrow(), vec![(true, 0), (false, 1), (false, 2)]);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));
        let seen = runs.clone();

        let read = count.clone();
        let stop = effect(move |_| {
            read.get();
            seen.set(seen.get() + 1);
        });
        stop.dispose();
        assert!(stop.is_disposed());

        count.set(5);
        assert_eq!(runs.get(), 1);
        assert!(matches!(stop.try_dispose(), Err(ReactiveError::Disposed(_))));
    }

    #[test]
    fn teardown_runs_before_rerun_and_on_dispose() {
        let count = signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();

        let read = count.clone();
        let stop = effect(move |_| {
            let value = read.get();
            sink.borrow_mut().push(format!("run {value}"));
            let sink = sink.clone();
            Teardown::new(move || sink.borrow_mut().push(format!("teardown {value}")))
        });
        count.set(1);
        stop.dispose();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "teardown 0", "run 1", "teardown 1"]
        );
    }

    #[test]
    fn effect_disposing_itself_runs_its_teardown() {
        let teardowns = Rc::new(Cell::new(0));
        let counter = teardowns.clone();
        let handle: Rc<Cell<Option<Dispose>>> = Rc::new(Cell::new(None));
        let inner = handle.clone();
        let count = signal(0);

        let read = count.clone();
        let stop = effect(move |_| {
            if read.get() > 0 {
                if let Some(me) = inner.get() {
                    me.dispose();
                }
            }
            let counter = counter.clone();
            Teardown::new(move || counter.set(counter.get() + 1))
        });
        handle.set(Some(stop));

        count.set(1);
        assert!(stop.is_disposed());
        // One before the second run, one for the teardown it returned.
        assert_eq!(teardowns.get(), 2);
    }

    #[test]
    fn effect_that_panics_on_creation_is_discarded() {
        let source = signal(0);
        let runs = Rc::new(Cell::new(0));

        let (read, seen) = (source.clone(), runs.clone());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            effect(move |_| {
                seen.set(seen.get() + 1);
                if read.get() == 0 {
                    panic!("not ready");
                }
            })
        }));
        assert!(result.is_err());
        assert_eq!(runs.get(), 1);

        source.set(1);
        source.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(source.subscriber_count(), 0);
    }
}
