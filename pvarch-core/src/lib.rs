//! pvarch-core
//!
//! Core types, collaborator traits and merge utilities shared across pvarch.
//!
//! - `event`: timestamped samples and tier ranks.
//! - `descriptor`: PV type metadata, cluster nodes, source locators, retrieval units.
//! - `source`: the `DataSource`, `ClusterDirectory`, `EventSink` and `ProxySink` seams.
//! - `merge`: the merge-dedup admission state machine.
//! - `postprocess`: post-processor hook points and the built-in processors.
//!
//! Data sources hand back `futures` streams so a unit's events are pulled
//! lazily by the consumer; nothing in this crate spawns tasks.
#![warn(missing_docs)]

/// PV metadata, nodes, locators and retrieval units.
pub mod descriptor;
/// Events and tier ranks.
pub mod event;
/// Merge-dedup admission.
pub mod merge;
/// Post-processors.
pub mod postprocess;
/// Collaborator traits.
pub mod source;

pub use descriptor::{
    NodeInfo, PvHeader, PvTypeDescriptor, RetrievalUnit, SampleType, SamplingMode, SourceLocator,
    StreamDesc, Trailer,
};
pub use event::{Event, SampleValue, TierRank};
pub use merge::{Admission, MergeDedup, merge_units};
pub use postprocess::{PostProcessor, PostProcessorRegistry};
pub use source::{ClusterDirectory, DataSource, EventSink, EventStream, ProxySink, SourceRegistry};

pub use pvarch_types::{
    ArchiverError, ExecutionMode, MergeStats, OutputFormat, PostProcessorCaps, PvDisposition,
    PvOutcome, RetrievalConfig, RetrievalReport, TimeSpan,
};
