//! pvarch federates retrieval across the tiers of a PV archiving appliance.
//!
//! Overview
//! - Resolves which tiers hold a PV's samples for a time range: the live
//!   engine, the configured stores and any legacy servers.
//! - Runs one retrieval unit per tier, serially or on a bounded pool chosen
//!   from the post-processor's cost estimate.
//! - Merges the unit streams into one strictly ordered, duplicate-free
//!   sequence per PV and hands it to an `EventSink`.
//! - Forwards PVs owned by other nodes or external appliances and relays the
//!   upstream bytes unchanged.
//!
//! Key behaviors and trade-offs
//! - Tier priority: units drain in tier order, so for equal timestamps the
//!   more recent tier wins and later tiers only fill gaps after it.
//! - Execution: serial below the cost threshold keeps small requests on one
//!   task; the bounded pool overlaps slow tiers without changing output order.
//! - Failure isolation: a failing or slow tier is logged and treated as
//!   empty; a client disconnect stops the request and aborts in-flight units.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use pvarch::Archiver;
//!
//! let archiver = Archiver::builder()
//!     .directory(Arc::new(directory))
//!     .sources(Arc::new(sources))
//!     .max_parallel_units(Some(4))
//!     .build()?;
//!
//! let query = [("pv", "SIM:PV1"), ("from", "2024-01-01T00:00:00Z"), ("to", "2024-01-02T00:00:00Z")];
//! let report = archiver.get_data("json", &query, &mut sink, &mut relay).await?;
//! println!("emitted {}", report.stats.emitted);
//! ```
#![warn(missing_docs)]

pub(crate) mod core;
mod router;

pub use core::{Archiver, ArchiverBuilder};
pub use router::consumer::{DrainOutcome, MergeConsumer};
pub use router::executor::{PendingUnit, RetrievalResult, UnitExecutor};
pub use router::proxy::PROXIED_HEADERS;
pub use router::request::{PvSelector, RetrievalRequest, parse_time, parse_time_ranges};
pub use router::resolver::{ResolveContext, resolve_units};

// Re-export core types for convenience
pub use pvarch_core::{
    ArchiverError, ClusterDirectory, DataSource, Event, EventSink, EventStream, ExecutionMode,
    MergeStats, NodeInfo, OutputFormat, PostProcessor, PostProcessorCaps, PostProcessorRegistry,
    ProxySink, PvDisposition, PvHeader, PvOutcome, PvTypeDescriptor, RetrievalConfig,
    RetrievalReport, RetrievalUnit, SampleType, SampleValue, SamplingMode, SourceLocator,
    SourceRegistry, StreamDesc, TierRank, TimeSpan, Trailer,
};
