//! Activation Hooks
//!
//! A signal or computed is *active* while something effect-rooted reads it:
//! an effect directly, or a computed that is itself active. Activation is
//! what resources hang off (open a socket when someone listens, close it when
//! nobody does), so it follows live subscriber edges, not explicit calls.
//!
//! # State Machine
//!
//! ```text
//!   Inactive ──first active subscriber──▶ Active          listeners(true)
//!   Active ──last active subscriber gone──▶ PendingInactive   task scheduled
//!   PendingInactive ──re-attached──▶ Active               task cancelled, silent
//!   PendingInactive ──task fires──▶ Inactive              listeners(false)
//! ```
//!
//! The pending state absorbs churn: an effect that re-runs and drops, then
//! re-reads, a source does not unmount and remount it. Nodes without
//! listeners have nothing to debounce and go straight to `Inactive`.
//!
//! A computed activates its own dependencies before its listeners run, so a
//! listener always sees its sources mounted. Going inactive lets the
//! dependencies start their own deactivation afterwards.
//!
//! # Re-entrancy
//!
//! Listeners may write signals, including the one being activated. Those
//! writes propagate in re-entrant mode: a subscriber that is evaluating right
//! now and already read the written node is flagged to evaluate again as soon
//! as it returns.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use smallvec::SmallVec;
use tracing::{debug, warn};

use super::effect::{IntoTeardown, Teardown};
use super::runtime::Runtime;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{Activation, Listener, Node, NodeId, NodeKind};
use crate::timer::TaskScheduler;

/// Signals and computeds: the nodes that carry activation state.
pub trait Mountable {
    fn node_id(&self) -> NodeId;
}

/// Decrements the activation depth when dropped.
struct ActivationDepth<'rt>(&'rt Runtime);

impl<'rt> ActivationDepth<'rt> {
    fn enter(runtime: &'rt Runtime) -> Self {
        runtime
            .activation_depth
            .set(runtime.activation_depth.get() + 1);
        Self(runtime)
    }
}

impl Drop for ActivationDepth<'_> {
    fn drop(&mut self) {
        let depth = self.0.activation_depth.get();
        self.0.activation_depth.set(depth.saturating_sub(1));
    }
}

impl Runtime {
    /// `id` just gained a subscriber edge from an active subscriber.
    pub(crate) fn activate(&self, id: NodeId) {
        let (previous, is_computed) = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.nodes.get_mut(id) else {
                return;
            };
            if !node.kind.is_mountable() {
                return;
            }
            let previous = node.activation;
            node.activation = Activation::Active;
            (previous, matches!(node.kind, NodeKind::Computed(_)))
        };

        match previous {
            Activation::Active => {}
            Activation::PendingInactive(task) => {
                debug!(?id, "re-attached before deactivation");
                if let Some(task) = task {
                    self.scheduler().cancel(task);
                }
            }
            Activation::Inactive => {
                debug!(?id, "activated");
                if is_computed {
                    let deps = self.graph.borrow().dependencies(id);
                    for dep in deps {
                        self.activate(dep);
                    }
                }
                let listeners = self.listeners(id);
                self.fire(id, &listeners, true);
            }
        }
    }

    /// A signal or computed lost a subscriber edge.
    pub(crate) fn on_unsubscribed(&self, id: NodeId) {
        self.begin_deactivation(id);
    }

    fn begin_deactivation(&self, id: NodeId) {
        let has_listeners = {
            let mut graph = self.graph.borrow_mut();
            let still_needed = graph.has_active_subscriber(id);
            let Some(node) = graph.nodes.get_mut(id) else {
                return;
            };
            if node.activation != Activation::Active || still_needed {
                return;
            }
            if node.listeners.is_empty() {
                node.activation = Activation::Inactive;
                false
            } else {
                node.activation = Activation::PendingInactive(None);
                true
            }
        };

        if !has_listeners {
            debug!(?id, "deactivated");
            self.release_sources(id);
            self.deactivate_dependencies(id);
            return;
        }

        let delay = self.deactivation_delay();
        let task = self.scheduler().schedule(
            delay,
            Box::new(move || Runtime::try_with(|rt| rt.finish_deactivation(id))),
        );
        debug!(?id, %task, ?delay, "deactivation scheduled");

        let mut graph = self.graph.borrow_mut();
        if let Some(node) = graph.nodes.get_mut(id) {
            if node.activation == Activation::PendingInactive(None) {
                node.activation = Activation::PendingInactive(Some(task));
            }
        }
    }

    /// The deferred deactivation task fired.
    fn finish_deactivation(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            let still_needed = graph.has_active_subscriber(id);
            let Some(node) = graph.nodes.get_mut(id) else {
                return;
            };
            if !matches!(node.activation, Activation::PendingInactive(_)) {
                return;
            }
            if still_needed {
                node.activation = Activation::Active;
                return;
            }
            node.activation = Activation::Inactive;
        }

        debug!(?id, "deactivated");
        let listeners = self.listeners(id);
        self.fire(id, &listeners, false);
        self.release_sources(id);
        self.deactivate_dependencies(id);
    }

    /// An unmounted computed with no subscribers left lets go of its
    /// sources; they start deactivating from here.
    fn release_sources(&self, id: NodeId) {
        self.graph.borrow_mut().release_sources(id);
        self.settle();
    }

    fn deactivate_dependencies(&self, id: NodeId) {
        let deps = self.graph.borrow().dependencies(id);
        for dep in deps {
            self.begin_deactivation(dep);
        }
    }

    /// A mountable node was removed from the graph: cancel its pending task
    /// and unmount it if it was mounted.
    pub(crate) fn retire(&self, id: NodeId, node: Node) {
        match node.activation {
            Activation::Inactive => {}
            Activation::Active => self.fire(id, &node.listeners, false),
            Activation::PendingInactive(task) => {
                if let Some(task) = task {
                    self.scheduler().cancel(task);
                }
                self.fire(id, &node.listeners, false);
            }
        }
        drop(node);
    }

    fn listeners(&self, id: NodeId) -> SmallVec<[Listener; 1]> {
        self.graph
            .borrow()
            .nodes
            .get(id)
            .map(|node| node.listeners.clone())
            .unwrap_or_default()
    }

    fn fire(&self, id: NodeId, listeners: &[Listener], active: bool) {
        if listeners.is_empty() {
            return;
        }
        let _depth = ActivationDepth::enter(self);
        self.untracked(|| {
            for listener in listeners {
                match listener.try_borrow_mut() {
                    Ok(mut listener) => listener(active),
                    Err(_) => warn!(?id, active, "activation listener re-entered, skipped"),
                }
            }
        });
    }

    fn scheduler(&self) -> Rc<dyn TaskScheduler> {
        self.scheduler.borrow().clone()
    }

    fn deactivation_delay(&self) -> Duration {
        self.config.borrow().deactivation_delay()
    }
}

/// Call `listener(true)` when `node` becomes active and `listener(false)`
/// when it stops being active.
///
/// Registering on a node that is already active does not call the listener
/// until the next transition.
///
/// ```rust,ignore
/// let ticks = signal(0);
/// on_activate(&ticks, |active| println!("ticks mounted: {active}"));
/// let read = ticks.clone();
/// let stop = effect(move |_| { read.get(); }); // prints "ticks mounted: true"
/// ```
pub fn on_activate(node: &impl Mountable, listener: impl FnMut(bool) + 'static) {
    let id = node.node_id();
    let listener: Listener = Rc::new(RefCell::new(listener));
    Runtime::with(|rt| {
        if let Some(node) = rt.graph.borrow_mut().nodes.get_mut(id) {
            node.listeners.push(listener);
        }
    });
}

/// Run `f` each time `node` becomes active. The teardown it returns runs
/// when the node deactivates.
pub fn on_mount<F, R>(node: &impl Mountable, mut f: F)
where
    F: FnMut() -> R + 'static,
    R: IntoTeardown,
{
    let mut mounted: Option<Teardown> = None;
    on_activate(node, move |active| {
        if active {
            mounted = f().into_teardown();
        } else if let Some(teardown) = mounted.take() {
            teardown.run();
        }
    });
}

/// Whether `node` is mounted. A node waiting out its deactivation delay
/// still counts.
pub fn is_active(node: &impl Mountable) -> bool {
    let id = node.node_id();
    Runtime::with(|rt| {
        rt.graph
            .borrow()
            .nodes
            .get(id)
            .is_some_and(|node| node.activation != Activation::Inactive)
    })
}

/// Install the timer source used for deferred deactivation on this thread.
///
/// Tasks already scheduled stay with the previous scheduler.
pub fn set_scheduler(scheduler: impl TaskScheduler + 'static) {
    Runtime::with(|rt| *rt.scheduler.borrow_mut() = Rc::new(scheduler));
}

/// Replace this thread's engine configuration.
pub fn configure(config: EngineConfig) -> Result<()> {
    config.validate()?;
    debug!(?config, "engine configured");
    Runtime::with(|rt| *rt.config.borrow_mut() = config);
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
