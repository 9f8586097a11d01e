//! Report envelopes produced by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::ArchiverError;

/// Cumulative merge counters for one request.
///
/// `conflicts` counts equal-timestamp events whose value disagreed with the
/// event already emitted; each conflict is also counted in `skipped` and
/// `compared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeStats {
    /// Events handed to the post-processor/sink.
    pub emitted: u64,
    /// Events discarded as older than, or duplicates of, the last emitted event.
    pub skipped: u64,
    /// Events whose timestamp equalled the last emitted one and needed a value compare.
    pub compared: u64,
    /// Equal-timestamp events with a different value; the earlier tier won.
    pub conflicts: u64,
}

/// How a single requested PV was served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PvDisposition {
    /// Merged locally from the listed number of retrieval units.
    Local {
        /// Units resolved for the PV across all requested time ranges.
        units: usize,
    },
    /// Forwarded to another node or external appliance.
    Proxied {
        /// Base URL of the node that served the PV.
        target: String,
    },
    /// Rejected during planning or failed while proxying.
    Failed(ArchiverError),
}

/// Outcome for one requested PV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvOutcome {
    /// PV name after alias and `.VAL` normalization.
    pub pv: String,
    /// What happened to it.
    pub disposition: PvDisposition,
}

/// Summary of a retrieval request.
///
/// Carries the request's merge counters, the per-PV dispositions and any
/// non-fatal warnings (tier failures, rejected PVs in a partially served batch).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Cumulative merge counters.
    pub stats: MergeStats,
    /// One entry per requested PV, in request order.
    pub pvs: Vec<PvOutcome>,
    /// Non-fatal issues encountered while serving the request.
    pub warnings: Vec<ArchiverError>,
}

impl RetrievalReport {
    /// Number of PVs that ended up in the `Failed` disposition.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.pvs
            .iter()
            .filter(|o| matches!(o.disposition, PvDisposition::Failed(_)))
            .count()
    }
}
