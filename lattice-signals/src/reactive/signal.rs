//! Signal Implementation
//!
//! A signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computed or effect evaluates, the read is
//!    recorded as a dependency of that evaluation.
//!
//! 2. A write that differs from the latest value is stored as *pending* and
//!    marks every subscriber downstream. Queued effects run before `set`
//!    returns, unless a batch is open.
//!
//! 3. The pending value is committed on the next read (or while a subscriber
//!    verifies its dependencies). Committing a value equal to the old one
//!    does not count as a change, so writing `1, 2, 1` in a batch wakes
//!    nothing.
//!
//! # Memory Layout
//!
//! A `Signal<T>` is a reference-counted handle to the value. The graph node
//! only holds a weak reference back to it; when the last handle is dropped
//! the node and all of its edges go away.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::activation::Mountable;
use super::runtime::Runtime;
use crate::graph::{Flags, Node, NodeId, Refresh};

struct SignalState<T> {
    id: NodeId,
    value: RefCell<T>,
    pending: RefCell<Option<T>>,
}

impl<T: PartialEq> Refresh for SignalState<T> {
    fn refresh(&self) -> bool {
        Runtime::with(|rt| rt.graph.borrow_mut().set_flags(self.id, Flags::MUTABLE));
        let Some(next) = self.pending.borrow_mut().take() else {
            return false;
        };
        let previous = self.value.replace(next);
        previous != *self.value.borrow()
    }
}

impl<T> Drop for SignalState<T> {
    fn drop(&mut self) {
        let id = self.id;
        Runtime::try_with(|rt| rt.release(id));
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning a signal clones the handle, not the value.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|n| n + 1);
/// ```
pub struct Signal<T: 'static> {
    state: Rc<SignalState<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new(value: T) -> Self {
        let state = Rc::new_cyclic(|weak: &Weak<SignalState<T>>| {
            let weak: Weak<dyn Refresh> = weak.clone();
            let id = Runtime::with(|rt| rt.graph.borrow_mut().insert(Node::signal(weak)));
            SignalState {
                id,
                value: RefCell::new(value),
                pending: RefCell::new(None),
            }
        });
        Self { state }
    }

    /// Read the value, recording a dependency when called inside a
    /// computed or effect.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read the value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        Runtime::with(|rt| rt.sync_signal(self.state.id));
        self.state.value.borrow().clone()
    }

    /// Borrow the value, recording a dependency.
    ///
    /// The signal must not be written from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::with(|rt| {
            rt.sync_signal(self.state.id);
            rt.track(self.state.id);
        });
        f(&self.state.value.borrow())
    }

    /// Replace the value. Equal values are ignored.
    pub fn set(&self, value: T) {
        let unchanged = match self.state.pending.borrow().as_ref() {
            Some(pending) => *pending == value,
            None => *self.state.value.borrow() == value,
        };
        if unchanged {
            return;
        }

        *self.state.pending.borrow_mut() = Some(value);
        Runtime::with(|rt| rt.propagate_write(self.state.id));
    }

    /// Compute the next value from the latest one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = match self.state.pending.borrow().as_ref() {
            Some(pending) => f(pending),
            None => f(&self.state.value.borrow()),
        };
        self.set(next);
    }

    /// Number of computeds and effects currently reading this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.graph.borrow().subscriber_count(self.state.id))
    }
}

impl<T> Mountable for Signal<T> {
    fn node_id(&self) -> NodeId {
        self.state.id
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.state.id)
            .field("value", &self.state.value.borrow())
            .field("pending", &self.state.pending.borrow())
            .finish()
    }
}

/// Create a signal.
pub fn signal<T>(initial: T) -> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    Signal::new(initial)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
