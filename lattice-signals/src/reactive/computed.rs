//! Computed Implementation
//!
//! A computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first read, the computed runs its function and caches the result.
//!
//! 2. When a dependency changes, the computed is marked `PENDING` (maybe
//!    stale) or `DIRTY` (definitely stale). Nothing runs yet.
//!
//! 3. On the next read, a pending computed first verifies its dependencies.
//!    It only recomputes if one of them really changed.
//!
//! 4. If the recomputed value equals the cached one, subscribers are not
//!    woken.
//!
//! # Why This Matters
//!
//! This lazy approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay stale (no wasted work)
//!
//! The function receives the previous value, which makes accumulations and
//! structural sharing easy.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::activation::Mountable;
use super::runtime::Runtime;
use crate::graph::{Flags, Node, NodeId, Refresh};

type ComputeFn<T> = Box<dyn Fn(Option<&T>) -> T>;

struct ComputedState<T> {
    id: NodeId,
    value: RefCell<Option<T>>,
    compute: ComputeFn<T>,
}

impl<T: PartialEq> Refresh for ComputedState<T> {
    fn refresh(&self) -> bool {
        Runtime::with(|rt| {
            let next = {
                let _eval = rt.begin_evaluation(self.id, Flags::MUTABLE | Flags::RECURSED_CHECK);
                let previous = self.value.borrow();
                (self.compute)(previous.as_ref())
            };

            if self.value.borrow().as_ref() == Some(&next) {
                return false;
            }
            let previous = self.value.replace(Some(next));
            drop(previous);
            true
        })
    }
}

impl<T> Drop for ComputedState<T> {
    fn drop(&mut self) {
        let id = self.id;
        Runtime::try_with(|rt| rt.release(id));
    }
}

/// A cached value derived from other signals and computeds.
///
/// Cloning clones the handle. The cached value is dropped with the last
/// handle.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(2);
/// let source = count.clone();
/// let doubled = computed(move |_| source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    state: Rc<ComputedState<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a computed. The function does not run until the first read.
    pub fn new(compute: impl Fn(Option<&T>) -> T + 'static) -> Self {
        let state = Rc::new_cyclic(|weak: &Weak<ComputedState<T>>| {
            let weak: Weak<dyn Refresh> = weak.clone();
            let id = Runtime::with(|rt| rt.graph.borrow_mut().insert(Node::computed(weak)));
            ComputedState {
                id,
                value: RefCell::new(None),
                compute: Box::new(compute),
            }
        });
        Self { state }
    }

    /// Read the value, recomputing if needed and recording a dependency.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read the value, recomputing if needed, without recording a
    /// dependency.
    pub fn get_untracked(&self) -> T {
        Runtime::with(|rt| rt.sync_computed(self.state.id));
        self.cached(T::clone)
    }

    /// Borrow the value, recomputing if needed and recording a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let id = self.state.id;
        Runtime::with(|rt| {
            rt.sync_computed(id);
            // A listener fired by this read may have invalidated the value
            // again; the reader must not keep the stale one.
            if let Some(reader) = rt.track(id) {
                if rt.graph.borrow().flags(id).contains(Flags::DIRTY) {
                    rt.invalidate_reader(reader);
                }
            }
        });
        self.cached(f)
    }

    fn cached<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.state.value.borrow();
        f(value
            .as_ref()
            .expect("computed read itself during its first evaluation"))
    }

    /// Number of computeds and effects currently reading this computed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.graph.borrow().subscriber_count(self.state.id))
    }
}

impl<T> Mountable for Computed<T> {
    fn node_id(&self) -> NodeId {
        self.state.id
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.state.id)
            .field("cached", &self.state.value.borrow())
            .finish()
    }
}

/// Create a computed.
pub fn computed<T>(compute: impl Fn(Option<&T>) -> T + 'static) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    Computed::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal;
    use std::cell::Cell;

    fn counted<T: Clone + PartialEq + 'static>(
        f: impl Fn() -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let memo = computed(move |_| {
            seen.set(seen.get() + 1);
            f()
        });
        (memo, calls)
    }

    #[test]
    fn computes_lazily_on_first_read() {
        let (memo, calls) = counted(|| 42);

        assert_eq!(calls.get(), 0);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recomputes_after_dependency_changes() {
        let count = signal(1);
        let source = count.clone();
        let (doubled, calls) = counted(move || source.get() * 2);

        assert_eq!(doubled.get(), 2);
        count.set(4);
        assert_eq!(calls.get(), 1);
        assert_eq!(doubled.get(), 8);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn receives_previous_value() {
        let step = signal(1);
        let source = step.clone();
        let total = computed(move |prev: Option<&i32>| prev.copied().unwrap_or(0) + source.get());

        assert_eq!(total.get(), 1);
        step.set(2);
        assert_eq!(total.get(), 3);
        step.set(5);
        assert_eq!(total.get(), 8);
    }

    #[test]
    fn unchanged_intermediate_stops_recomputation() {
        let count = signal(1);
        let source = count.clone();
        let parity = computed(move |_| source.get() % 2);
        let upstream = parity.clone();
        let (label, calls) = counted(move || format!("parity {}", upstream.get()));

        assert_eq!(label.get(), "parity 1");
        count.set(3);
        assert_eq!(label.get(), "parity 1");
        assert_eq!(calls.get(), 1);

        count.set(4);
        assert_eq!(label.get(), "parity 0");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn panicking_computed_stays_dirty_and_recovers() {
        let fail = signal(true);
        let source = fail.clone();
        let memo = computed(move |_| {
            if source.get() {
                panic!("boom");
            }
            7
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| memo.get()));
        assert!(result.is_err());
        assert!(Runtime::with(|rt| rt.graph.borrow().flags(memo.node_id()).contains(Flags::DIRTY)));

        fail.set(false);
        assert_eq!(memo.get(), 7);
    }

    #[test]
    fn get_untracked_does_not_subscribe() {
        let count = signal(1);
        let source = count.clone();
        let memo = computed(move |_| source.get() + 1);
        let reader = memo.clone();

        let owner = computed(move |_| reader.get_untracked());
        assert_eq!(owner.get(), 2);
        assert_eq!(memo.subscriber_count(), 0);
        assert_eq!(count.subscriber_count(), 1);
    }
}
