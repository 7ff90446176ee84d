//! Error Types
//!
//! Most failures in the engine are panics raised by user closures; those
//! unwind to whoever triggered the evaluation and are not translated. The
//! errors here cover the recoverable cases: misuse of a handle after its node
//! is gone, and configuration that does not parse or validate.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors reported by the public API.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The node behind a dispose handle no longer exists.
    #[error("reactive node {0:?} has already been disposed")]
    Disposed(NodeId),

    /// Configuration text that is not valid JSON for [`EngineConfig`].
    ///
    /// [`EngineConfig`]: crate::EngineConfig
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// Configuration that parsed but holds an unusable value.
    #[error("engine configuration field `{field}` {reason}")]
    ConfigOutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
