//! Engine Configuration
//!
//! The engine has a single tunable today: how long a node that lost its last
//! active subscriber waits before it deactivates. The debounce absorbs
//! subscriber churn (an effect re-running and re-reading the same source)
//! without firing unmount/mount pairs.
//!
//! Every thread runtime is seeded from a process-wide default. Hosts change
//! the default with [`EngineConfig::set_global_default`] before spawning
//! threads, or adjust one thread with [`configure`](crate::configure).

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Upper bound for the deactivation delay: one hour.
const MAX_DEACTIVATION_DELAY_MS: u64 = 60 * 60 * 1000;

static GLOBAL_DEFAULT: RwLock<EngineConfig> = RwLock::new(EngineConfig::DEFAULT);

/// Runtime tunables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds between losing the last active subscriber and the
    /// deactivation callback. Zero still defers to the task scheduler.
    pub deactivation_delay_ms: u64,
}

impl EngineConfig {
    const DEFAULT: Self = Self {
        deactivation_delay_ms: 1000,
    };

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deactivation_delay_ms > MAX_DEACTIVATION_DELAY_MS {
            return Err(ReactiveError::ConfigOutOfRange {
                field: "deactivation_delay_ms",
                reason: "must not exceed one hour",
            });
        }
        Ok(())
    }

    pub fn deactivation_delay(&self) -> Duration {
        Duration::from_millis(self.deactivation_delay_ms)
    }

    /// The configuration new thread runtimes start with.
    pub fn global_default() -> Self {
        GLOBAL_DEFAULT.read().clone()
    }

    /// Replace the process-wide default. Runtimes that already exist keep
    /// their configuration.
    pub fn set_global_default(config: Self) -> Result<()> {
        config.validate()?;
        tracing::debug!(?config, "global engine configuration replaced");
        *GLOBAL_DEFAULT.write() = config;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
