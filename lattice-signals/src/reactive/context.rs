//! Reactive Context
//!
//! The reactive context records which subscriber is currently evaluating.
//! Reads are attributed to it, which is how dependencies are discovered
//! without being declared.
//!
//! # Implementation
//!
//! The current subscriber is a single `Cell` on the thread's runtime, not a
//! stack: every evaluation saves the previous value and a guard puts it back
//! on drop, so nesting (a computed read inside an effect read inside another
//! effect) unwinds correctly even when a closure panics.

use tracing::warn;

use super::runtime::Runtime;
use crate::graph::NodeId;

/// Restores the saved subscriber when dropped.
pub(crate) struct ContextGuard<'rt> {
    runtime: &'rt Runtime,
    prev: Option<NodeId>,
}

impl ContextGuard<'_> {
    /// The subscriber that will be restored.
    pub(crate) fn prev(&self) -> Option<NodeId> {
        self.prev
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.runtime.active_sub.set(self.prev);
    }
}

impl Runtime {
    /// Make `sub` the current subscriber until the guard drops.
    pub(crate) fn enter(&self, sub: Option<NodeId>) -> ContextGuard<'_> {
        ContextGuard {
            runtime: self,
            prev: self.active_sub.replace(sub),
        }
    }

    /// Run `f` with tracking disabled.
    pub(crate) fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(None);
        f()
    }
}

/// Run `f` without recording any of its reads as dependencies.
///
/// ```rust,ignore
/// effect(move |_| {
///     // Re-runs when `a` changes, never because of `b`.
///     println!("{} {}", a.get(), untracked(|| b.get()));
/// });
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    Runtime::with(|rt| rt.untracked(f))
}

/// Stop attributing reads to the current subscriber until the matching
/// [`resume_tracking`].
///
/// Pauses nest. Prefer [`untracked`] where a closure fits.
pub fn pause_tracking() {
    Runtime::with(|rt| {
        let prev = rt.active_sub.replace(None);
        rt.paused.borrow_mut().push(prev);
    });
}

/// Undo the most recent [`pause_tracking`].
pub fn resume_tracking() {
    Runtime::with(|rt| match rt.paused.borrow_mut().pop() {
        Some(prev) => rt.active_sub.set(prev),
        None => warn!("resume_tracking called without a matching pause_tracking"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Flags, Node, NodeKind};

    fn node(rt: &Runtime) -> NodeId {
        rt.graph
            .borrow_mut()
            .insert(Node::new(NodeKind::Scope, Flags::MUTABLE))
    }

    #[test]
    fn nested_contexts_restore_in_order() {
        Runtime::with(|rt| {
            let outer = node(rt);
            let inner = node(rt);

            {
                let _outer = rt.enter(Some(outer));
                assert_eq!(rt.active_sub.get(), Some(outer));
                {
                    let _inner = rt.enter(Some(inner));
                    assert_eq!(rt.active_sub.get(), Some(inner));
                }
                assert_eq!(rt.active_sub.get(), Some(outer));
            }
            assert_eq!(rt.active_sub.get(), None);
        });
    }

    #[test]
    fn untracked_hides_the_subscriber() {
        let sub = Runtime::with(node);
        Runtime::with(|rt| {
            let _ctx = rt.enter(Some(sub));
            assert_eq!(untracked(|| Runtime::with(|rt| rt.active_sub.get())), None);
            assert_eq!(rt.active_sub.get(), Some(sub));
        });
    }

    #[test]
    fn pause_and_resume_nest() {
        let sub = Runtime::with(node);
        Runtime::with(|rt| {
            let _ctx = rt.enter(Some(sub));

            pause_tracking();
            pause_tracking();
            assert_eq!(rt.active_sub.get(), None);
            resume_tracking();
            assert_eq!(rt.active_sub.get(), None);
            resume_tracking();
            assert_eq!(rt.active_sub.get(), Some(sub));

            // Unbalanced resume is ignored.
            resume_tracking();
            assert_eq!(rt.active_sub.get(), Some(sub));
        });
    }
}
