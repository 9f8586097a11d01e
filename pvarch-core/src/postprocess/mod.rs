//! Post-processor hook points and the built-in processors.

mod binned;
mod count;
mod field;
mod raw;

use std::collections::BTreeMap;
use std::sync::Arc;

use pvarch_types::{ArchiverError, PostProcessorCaps, TimeSpan};

use crate::descriptor::{PvTypeDescriptor, Trailer};
use crate::event::Event;

pub use binned::{FirstSample, LastSample, Mean};
pub use count::Count;
pub use field::FieldProjection;
pub use raw::Raw;

/// Default bin width for binning processors invoked without `_N`.
pub const DEFAULT_BIN_SECS: i64 = 900;

/// Processor applied to the merged events of one PV.
///
/// A fresh instance is created per PV. The consumer calls [`process`] for each
/// merged event, then [`consolidated`] when `CONSOLIDATING` is set, then
/// [`trailer`] when `HAS_TRAILER` is set.
///
/// [`process`]: PostProcessor::process
/// [`consolidated`]: PostProcessor::consolidated
/// [`trailer`]: PostProcessor::trailer
pub trait PostProcessor: Send {
    /// Identifier as given in the request (`mean_3600`, `raw`, ...).
    fn identity(&self) -> &str;

    /// Capability flags the consumer branches on.
    fn caps(&self) -> PostProcessorCaps;

    /// Parse arguments from the request identifier.
    ///
    /// # Errors
    /// Returns `ArchiverError::PostProcessor` when arguments are malformed.
    fn initialize(&mut self, user_arg: &str, pv: &str) -> Result<(), ArchiverError>;

    /// Approximate memory this processor needs for the span, in bytes.
    fn estimate_cost(&self, descriptor: &PvTypeDescriptor, span: TimeSpan) -> u64 {
        raw_cost(descriptor, span)
    }

    /// Offer one merged event. Pass-through processors return what the sink
    /// should see; consolidating processors accumulate and return `None`.
    fn process(&mut self, event: Event) -> Option<Event>;

    /// Accumulated result, for `CONSOLIDATING` processors.
    fn consolidated(&mut self) -> Vec<Event> {
        Vec::new()
    }

    /// Trailing record, for `HAS_TRAILER` processors.
    fn trailer(&mut self) -> Option<Trailer> {
        None
    }
}

/// Bytes needed to hold every raw sample of `descriptor` over `span`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn raw_cost(descriptor: &PvTypeDescriptor, span: TimeSpan) -> u64 {
    let secs = (span.end() - span.start()).num_seconds().max(0);
    (descriptor.storage_rate_bytes_per_sec.max(0.0) * secs as f64) as u64
}

/// Split `name_N` into its name and optional numeric argument.
///
/// # Errors
/// Returns `ArchiverError::PostProcessor` when the argument is present but is
/// not a positive integer.
pub fn parse_identity(user_arg: &str, pv: &str) -> Result<(String, Option<i64>), ArchiverError> {
    match user_arg.split_once('_') {
        None => Ok((user_arg.to_string(), None)),
        Some((name, arg)) => {
            let n: i64 = arg.parse().map_err(|_| {
                ArchiverError::post_processor(user_arg, pv, format!("invalid argument '{arg}'"))
            })?;
            if n <= 0 {
                return Err(ArchiverError::post_processor(
                    user_arg,
                    pv,
                    "bin size must be positive",
                ));
            }
            Ok((name.to_string(), Some(n)))
        }
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn PostProcessor> + Send + Sync>;

/// Lookup table from processor name to factory.
#[derive(Clone)]
pub struct PostProcessorRegistry {
    factories: BTreeMap<String, Factory>,
}

impl core::fmt::Debug for PostProcessorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostProcessorRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PostProcessorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PostProcessorRegistry {
    /// Registry with no processors.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with `raw`, `firstSample`, `lastSample`, `mean` and `count`.
    #[must_use]
    pub fn builtin() -> Self {
        Self::empty()
            .with("raw", || Box::new(Raw::default()))
            .with("firstSample", || Box::new(FirstSample::default()))
            .with("lastSample", || Box::new(LastSample::default()))
            .with("mean", || Box::new(Mean::default()))
            .with("count", || Box::new(Count::default()))
    }

    /// Register (or replace) a processor factory under `name`.
    #[must_use]
    pub fn with<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn PostProcessor> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Whether a processor is registered under the name part of `user_arg`.
    #[must_use]
    pub fn knows(&self, user_arg: &str) -> bool {
        let name = user_arg.split_once('_').map_or(user_arg, |(n, _)| n);
        self.factories.contains_key(name)
    }

    /// Create and initialize the processor for `user_arg` on `pv`.
    ///
    /// # Errors
    /// Returns `ArchiverError::PostProcessor` for unknown names or when the
    /// processor rejects its arguments.
    pub fn instantiate(
        &self,
        user_arg: &str,
        pv: &str,
    ) -> Result<Box<dyn PostProcessor>, ArchiverError> {
        let (name, _) = parse_identity(user_arg, pv)?;
        let factory = self.factories.get(&name).ok_or_else(|| {
            ArchiverError::post_processor(user_arg, pv, "unknown post processor")
        })?;
        let mut processor = factory();
        processor.initialize(user_arg, pv)?;
        Ok(processor)
    }

    /// Extra-field projection for `pv.FIELD` requests.
    ///
    /// # Errors
    /// Propagates initialization failures.
    pub fn field_projection(
        &self,
        field: &str,
        pv: &str,
    ) -> Result<Box<dyn PostProcessor>, ArchiverError> {
        let mut processor = FieldProjection::default();
        processor.initialize(field, pv)?;
        Ok(Box::new(processor))
    }
}

/// Bin index of `event` for a bin width of `secs`.
pub(crate) fn bin_of(event: &Event, secs: i64) -> i64 {
    event.ts.timestamp().div_euclid(secs)
}
