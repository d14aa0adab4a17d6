//! Engine and orchestrator configuration.

use serde::{Deserialize, Serialize};
use tws_store::DEFAULT_REFERENCE_PREFIX;

/// Configuration for recomputation passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Re-apply Reference outputs as `ComputedPersistent` after both passes
    /// when the module displays the Reference universe.
    pub reassert_reference: bool,
    /// Turn a panicking pass into a failed pass instead of unwinding.
    pub catch_panics: bool,
    /// Extra rounds of both passes allowed when an upstream value changes
    /// while the module is recalculating.
    pub max_reruns: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reassert_reference: true,
            catch_panics: true,
            max_reruns: 8,
        }
    }
}

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix marking Reference keys in the external namespace.
    pub reference_prefix: String,
    /// Save a module universe whenever a user edit lands in it.
    pub persist_user_edits: bool,
    /// Pass behavior shared by every module.
    pub orchestrator: OrchestratorConfig,
    /// Capacity of each event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
            persist_user_edits: true,
            orchestrator: OrchestratorConfig::default(),
            event_capacity: 100,
        }
    }
}

/// Builder for engine configuration.
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn reference_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.reference_prefix = prefix.into();
        self
    }

    pub fn persist_user_edits(mut self, enabled: bool) -> Self {
        self.config.persist_user_edits = enabled;
        self
    }

    pub fn reassert_reference(mut self, enabled: bool) -> Self {
        self.config.orchestrator.reassert_reference = enabled;
        self
    }

    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.config.orchestrator.catch_panics = enabled;
        self
    }

    pub fn max_reruns(mut self, reruns: usize) -> Self {
        self.config.orchestrator.max_reruns = reruns;
        self
    }

    /// Zero is raised to one; broadcast channels need room for an event.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
