//! Reactive Primitives
//!
//! This module implements the public reactive system on top of the
//! dependency graph: signals, computeds, effects and scopes, plus batching,
//! untracked reads and activation hooks.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. Reading it while a computed
//! or effect evaluates records a dependency; writing it marks everything
//! downstream.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when it is read and one of its dependencies really changed.
//!
//! ## Effects
//!
//! An effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects synchronize reactive state with the outside
//! world. Effects created inside another effect or a scope are owned by it.
//!
//! ## Scopes
//!
//! A scope groups effects so they can be disposed together.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: the runtime remembers which subscriber is
//! evaluating and attributes every read to it. The runtime is confined to a
//! thread, and the graph is never borrowed while user code runs.

mod activation;
mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod scope;
mod signal;
mod verify;

pub use activation::{configure, is_active, on_activate, on_mount, set_scheduler, Mountable};
pub use batch::{batch, end_batch, start_batch};
pub use computed::{computed, Computed};
pub use context::{pause_tracking, resume_tracking, untracked};
pub use effect::{effect, Dispose, IntoTeardown, Teardown};
pub use scope::{defer_scope, effect_scope, DeferredScope};
pub use signal::{signal, Signal};

pub(crate) use effect::EffectCell;
