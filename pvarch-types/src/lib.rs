//! pvarch data transfer objects and configuration primitives.
#![warn(missing_docs)]

mod capability;
mod config;
/// Error types shared across the pvarch workspace.
pub mod error;
mod format;
mod report;
mod span;

pub use capability::PostProcessorCaps;
pub use config::{ExecutionMode, MIB, RetrievalConfig};
pub use error::{ACCESS_CONTROL_ALLOW_ORIGIN, ArchiverError};
pub use format::OutputFormat;
pub use report::{MergeStats, PvDisposition, PvOutcome, RetrievalReport};
pub use span::TimeSpan;
