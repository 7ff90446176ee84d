//! Deferred Tasks
//!
//! Deactivation is debounced: when a node loses its last active subscriber
//! the engine schedules a task and only tears the node down if nothing
//! re-attached before the task fires. The engine does not own a clock, so the
//! host supplies one through [`TaskScheduler`].
//!
//! Two schedulers ship with the crate:
//!
//! - [`ManualScheduler`]: a virtual clock the host advances explicitly. This
//!   is what every runtime starts with, and what tests use.
//! - [`TokioScheduler`]: real timers on the current tokio `LocalSet`.
//!
//! Tasks are plain `FnOnce()` closures. They are not `Send`: the engine is
//! confined to one thread, and so are its timers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::trace;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Handle to a scheduled task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Host timer abstraction.
pub trait TaskScheduler {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> TaskId;

    /// Drop a task that has not fired yet. Unknown ids are ignored.
    fn cancel(&self, id: TaskId);
}

// ----------------------------------------------------------------------------
// Manual scheduler
// ----------------------------------------------------------------------------

struct Pending {
    deadline: Duration,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    tasks: IndexMap<TaskId, Pending>,
}

impl ManualState {
    /// The earliest task due at or before `limit`. Ties go to the task
    /// scheduled first.
    fn take_due(&mut self, limit: Option<Duration>) -> Option<(Duration, Task)> {
        let (index, _) = self
            .tasks
            .values()
            .enumerate()
            .filter(|(_, pending)| limit.map_or(true, |limit| pending.deadline <= limit))
            .min_by_key(|(index, pending)| (pending.deadline, *index))?;
        let (_, pending) = self.tasks.shift_remove_index(index)?;
        Some((pending.deadline, pending.task))
    }
}

/// A virtual clock driven by the host.
///
/// Cloning shares the clock, so the host keeps one clone and installs
/// another with [`set_scheduler`](crate::set_scheduler).
///
/// ```rust,ignore
/// let timers = ManualScheduler::new();
/// set_scheduler(timers.clone());
/// // ...
/// timers.advance(Duration::from_millis(1000));
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of tasks that have not fired yet.
    pub fn pending(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Move the clock forward by `by` and run every task that became due,
    /// in deadline order. Tasks scheduled by running tasks are honored if
    /// they fall inside the window. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().take_due(Some(target));
            let Some((deadline, task)) = next else { break };
            {
                let mut state = self.state.borrow_mut();
                state.now = state.now.max(deadline);
            }
            task();
            ran += 1;
        }
        self.state.borrow_mut().now = target;
        ran
    }

    /// Run every task, including ones scheduled while draining, moving the
    /// clock to the last deadline. Returns the number of tasks run.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().take_due(None);
            let Some((deadline, task)) = next else { break };
            {
                let mut state = self.state.borrow_mut();
                state.now = state.now.max(deadline);
            }
            task();
            ran += 1;
        }
        ran
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        let deadline = state.now + delay;
        state.tasks.insert(id, Pending { deadline, task });
        trace!(%id, ?deadline, "scheduled deferred task");
        id
    }

    fn cancel(&self, id: TaskId) {
        if self.state.borrow_mut().tasks.shift_remove(&id).is_some() {
            trace!(%id, "cancelled deferred task");
        }
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.tasks.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tokio scheduler
// ----------------------------------------------------------------------------

#[derive(Default)]
struct TokioState {
    next_id: u64,
    handles: HashMap<TaskId, tokio::task::JoinHandle<()>>,
}

/// Timers backed by `tokio::time`.
///
/// Tasks are spawned with `tokio::task::spawn_local`, so scheduling must
/// happen inside a `LocalSet`.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    state: Rc<RefCell<TokioState>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks that have not fired yet.
    pub fn pending(&self) -> usize {
        self.state.borrow().handles.len()
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskId {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = TaskId(state.next_id);
            state.next_id += 1;
            id
        };

        let state = Rc::downgrade(&self.state);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(state) = state.upgrade() {
                state.borrow_mut().handles.remove(&id);
            }
            task();
        });

        self.state.borrow_mut().handles.insert(id, handle);
        trace!(%id, ?delay, "spawned deferred task");
        id
    }

    fn cancel(&self, id: TaskId) {
        if let Some(handle) = self.state.borrow_mut().handles.remove(&id) {
            handle.abort();
            trace!(%id, "aborted deferred task");
        }
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
