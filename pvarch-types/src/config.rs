//! Configuration types for the retrieval orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One mebibyte, the unit post-processor cost estimates are expressed in.
pub const MIB: u64 = 1024 * 1024;

/// How retrieval units for one PV are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ExecutionMode {
    /// Units are deferred and run one after another on the caller's task.
    #[default]
    Serial,
    /// Units run concurrently on a semaphore-bounded set of tokio tasks.
    BoundedParallel,
}

/// Global configuration for the `Archiver` orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// How often the engine flushes its in-memory buffer to the first store.
    pub engine_flush_interval: Duration,
    /// Multiple of the flush interval during which the engine still holds
    /// samples for a span that ended in the past.
    pub engine_window_factor: u32,
    /// Post-processor memory estimate (bytes) at or above which units for a
    /// PV run on the bounded pool instead of serially.
    pub parallel_cost_threshold: u64,
    /// Maximum number of units in flight for one PV. `None` disables the pool
    /// and forces serial execution.
    pub max_parallel_units: Option<usize>,
    /// Upper bound on a single unit's fetch (connect plus first response).
    pub unit_timeout: Duration,
    /// Timeout for proxied requests and small federation lookups.
    pub proxy_timeout: Duration,
    /// Post-processor used when a request sets `usereduced`.
    pub default_reduced_processor: String,
    /// Ask external appliances whether they archive PVs that have no local descriptor.
    pub lookup_external_servers: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            engine_flush_interval: Duration::from_secs(60),
            engine_window_factor: 2,
            parallel_cost_threshold: 60 * MIB,
            max_parallel_units: Some(4),
            unit_timeout: Duration::from_secs(30),
            proxy_timeout: Duration::from_secs(60),
            default_reduced_processor: "firstSample".to_string(),
            lookup_external_servers: true,
        }
    }
}

impl RetrievalConfig {
    /// Window after a span's end during which the engine tier is still consulted.
    #[must_use]
    pub fn engine_window(&self) -> Duration {
        self.engine_flush_interval
            .saturating_mul(self.engine_window_factor)
    }

    /// Pick the execution mode for a PV given its post-processor cost estimate.
    ///
    /// Serial whenever no pool is configured, regardless of cost.
    #[must_use]
    pub fn execution_mode(&self, estimated_cost: u64) -> ExecutionMode {
        match self.max_parallel_units {
            Some(n) if n > 0 && estimated_cost >= self.parallel_cost_threshold => {
                ExecutionMode::BoundedParallel
            }
            _ => ExecutionMode::Serial,
        }
    }
}
