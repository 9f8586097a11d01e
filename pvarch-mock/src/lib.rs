//! In-memory collaborators for exercising the pvarch orchestrator without a cluster.

mod directory;
mod sink;
mod source;

pub use directory::MockDirectory;
pub use sink::{RecordingProxySink, RecordingSink, SinkRecord};
pub use source::{MockRegistry, MockSource, SourceBehavior};

use chrono::{DateTime, Utc};
use pvarch_core::NodeInfo;

/// Node description with `http://<identity>` style URLs.
#[must_use]
pub fn node(identity: &str) -> NodeInfo {
    NodeInfo {
        identity: identity.to_string(),
        engine_url: format!("http://{identity}/engine"),
        retrieval_url: format!("http://{identity}/retrieval"),
    }
}

/// Timestamp `secs` seconds after the epoch.
///
/// # Panics
/// Panics for seconds outside chrono's representable range; fixtures only use
/// small values.
#[must_use]
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(|| panic!("timestamp {secs} out of range"))
}
