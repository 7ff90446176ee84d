//! Effect Scopes
//!
//! A scope groups effects (and nested scopes) created while it is current so
//! they can be stopped together. Scopes never track reads themselves: a read
//! inside a scope body is attributed to the scope's nearest tracking owner,
//! if any.

use std::fmt;

use super::effect::Dispose;
use super::runtime::Runtime;
use crate::graph::{Node, NodeId};

impl Runtime {
    fn run_scope(&self, owner: Option<NodeId>, f: impl FnOnce()) -> Dispose {
        let id = {
            let mut graph = self.graph.borrow_mut();
            let id = graph.insert(Node::scope());
            if let Some(owner) = owner.filter(|owner| graph.contains(*owner)) {
                graph.link(id, owner, self.cycle.get());
            }
            id
        };
        tracing::trace!(?id, ?owner, "scope created");

        let _ctx = self.enter(Some(id));
        f();
        Dispose::new(id)
    }
}

/// Run `f` in a new scope owned by the current scope or effect.
///
/// Disposing the returned handle stops every effect and scope created
/// inside, transitively.
///
/// ```rust,ignore
/// let stop = effect_scope(|| {
///     effect(move |_| println!("a = {}", a.get()));
///     effect(move |_| println!("b = {}", b.get()));
/// });
/// stop.dispose(); // both effects stop
/// ```
pub fn effect_scope(f: impl FnOnce()) -> Dispose {
    Runtime::with(|rt| rt.run_scope(rt.active_sub.get(), f))
}

/// Capture the current owner now and build the scope later.
///
/// The scope created by [`DeferredScope::start`] belongs to whatever scope or
/// effect was current when `defer_scope` was called, so disposing that owner
/// still stops it.
pub fn defer_scope(f: impl FnOnce() + 'static) -> DeferredScope {
    DeferredScope {
        owner: Runtime::with(|rt| rt.active_sub.get()),
        body: Box::new(f),
    }
}

/// A scope whose body has not run yet. See [`defer_scope`].
pub struct DeferredScope {
    owner: Option<NodeId>,
    body: Box<dyn FnOnce()>,
}

impl DeferredScope {
    /// Create the scope and run its body.
    pub fn start(self) -> Dispose {
        let DeferredScope { owner, body } = self;
        Runtime::with(|rt| rt.run_scope(owner, body))
    }
}

impl fmt::Debug for DeferredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredScope")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
