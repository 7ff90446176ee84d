//! Lattice Signals
//!
//! This crate provides a fine-grained reactive engine. It implements:
//!
//! - Reactive primitives (signals, computeds, effects, effect scopes)
//! - Push-pull propagation with value-equality bailout
//! - Batching with outer-before-inner effect ordering
//! - Activation hooks driven by live subscriber counts
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: nodes, edges, edge management and the propagation walk. Pure
//!   data structure code that never calls user closures.
//! - `reactive`: the per-thread runtime and the public primitives built on it.
//! - `timer`: deferred tasks used to debounce deactivation.
//! - `config` / `error`: engine tunables and the error type.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_signals::{batch, computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = computed(move |_| source.get() * 2);
//!
//! // Create an effect
//! let read = doubled.clone();
//! let stop = effect(move |_| println!("doubled: {}", read.get()));
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "doubled: 10"
//!
//! stop.dispose();
//! ```

pub mod config;
pub mod error;
mod graph;
pub mod reactive;
pub mod timer;

pub use config::EngineConfig;
pub use error::{ReactiveError, Result};
pub use graph::NodeId;
pub use reactive::{
    batch, computed, configure, defer_scope, effect, effect_scope, end_batch, is_active,
    on_activate, on_mount, pause_tracking, resume_tracking, set_scheduler, signal, start_batch,
    untracked, Computed, DeferredScope, Dispose, IntoTeardown, Mountable, Signal, Teardown,
};
pub use timer::{ManualScheduler, TaskId, TaskScheduler, TokioScheduler};
