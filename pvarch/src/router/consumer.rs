use futures::StreamExt;
use pvarch_core::{
    ArchiverError, EventSink, MergeDedup, MergeStats, PostProcessor, PostProcessorCaps, PvHeader,
    SampleType, SourceLocator,
};

use super::executor::RetrievalResult;

/// What happened to one unit's result while draining.
#[derive(Debug)]
pub enum DrainOutcome {
    /// The stream was read to its end.
    Drained,
    /// The source had nothing for the span.
    NoData,
    /// The unit failed before or while streaming; any earlier output stands.
    Failed(ArchiverError),
    /// The stream's sample type disagreed with the descriptor and was skipped.
    Skipped(ArchiverError),
}

enum ConsumerState {
    Idle,
    Streaming {
        pv: String,
        expected: Option<SampleType>,
        processor: Box<dyn PostProcessor>,
    },
    Done,
}

/// Drives the sink from merged unit outputs: `Idle -> Streaming(pv) -> ... -> Done`.
///
/// One consumer serves a whole request so merge counters accumulate across PVs.
pub struct MergeConsumer<'s> {
    sink: &'s mut dyn EventSink,
    merge: MergeDedup,
    state: ConsumerState,
}

impl<'s> MergeConsumer<'s> {
    /// Consumer writing to `sink`.
    pub fn new(sink: &'s mut dyn EventSink) -> Self {
        Self {
            sink,
            merge: MergeDedup::new(),
            state: ConsumerState::Idle,
        }
    }

    /// Start a PV: reset per-PV merge state and fire the new-PV hook.
    ///
    /// # Errors
    /// Propagates sink errors (`ClientGone`).
    pub async fn begin_pv(
        &mut self,
        header: &PvHeader,
        processor: Box<dyn PostProcessor>,
    ) -> Result<(), ArchiverError> {
        if !matches!(self.state, ConsumerState::Idle) {
            return Err(ArchiverError::Other(format!(
                "begin_pv({}) while another PV is open or the request is finished",
                header.pv_name
            )));
        }
        self.merge.begin_pv(&header.pv_name);
        self.sink.on_new_pv(header).await?;
        self.state = ConsumerState::Streaming {
            pv: header.pv_name.clone(),
            expected: header.sample_type,
            processor,
        };
        Ok(())
    }

    /// Merge one unit's result into the open PV.
    ///
    /// Tier failures are returned as outcomes, not errors; only sink errors
    /// (`ClientGone`) abort.
    ///
    /// # Errors
    /// Propagates sink errors.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub async fn drain(
        &mut self,
        locator: &SourceLocator,
        result: RetrievalResult,
    ) -> Result<DrainOutcome, ArchiverError> {
        let ConsumerState::Streaming {
            pv,
            expected,
            processor,
        } = &mut self.state
        else {
            return Err(ArchiverError::Other("drain called with no open PV".into()));
        };

        let mut stream = match result {
            RetrievalResult::NoData => return Ok(DrainOutcome::NoData),
            RetrievalResult::Failed(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(pv = %pv, source = %locator, error = %e, "tier failed; treating as empty");
                return Ok(DrainOutcome::Failed(e));
            }
            RetrievalResult::Stream(stream) => stream,
        };

        if let Some(expected) = *expected
            && stream.desc.sample_type != expected
        {
            let e = ArchiverError::MismatchedType {
                pv: pv.clone(),
                expected: expected.to_string(),
                found: stream.desc.sample_type.to_string(),
            };
            #[cfg(feature = "tracing")]
            tracing::error!(pv = %pv, source = %locator, error = %e, "skipping stream");
            return Ok(DrainOutcome::Skipped(e));
        }

        let consolidating = processor.caps().contains(PostProcessorCaps::CONSOLIDATING);
        while let Some(item) = stream.events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(pv = %pv, source = %locator, error = %e, "stream failed mid-way");
                    return Ok(DrainOutcome::Failed(e));
                }
            };
            if !self.merge.admit(&event).is_emit() {
                continue;
            }
            if consolidating {
                let _ = processor.process(event);
            } else if let Some(out) = processor.process(event) {
                self.sink.on_event(&out).await?;
            }
        }
        Ok(DrainOutcome::Drained)
    }

    /// Close the open PV: hand over consolidated output and the trailer.
    ///
    /// # Errors
    /// Propagates sink errors.
    pub async fn end_pv(&mut self) -> Result<(), ArchiverError> {
        let ConsumerState::Streaming {
            pv, mut processor, ..
        } = std::mem::replace(&mut self.state, ConsumerState::Idle)
        else {
            return Err(ArchiverError::Other("end_pv called with no open PV".into()));
        };
        let caps = processor.caps();
        if caps.contains(PostProcessorCaps::CONSOLIDATING) {
            let events = processor.consolidated();
            self.sink.on_consolidated(&pv, events).await?;
        }
        if caps.contains(PostProcessorCaps::HAS_TRAILER)
            && let Some(trailer) = processor.trailer()
        {
            self.sink.on_trailer(&pv, trailer).await?;
        }
        Ok(())
    }

    /// Finish the request and return the cumulative counters.
    ///
    /// # Errors
    /// Propagates sink errors.
    pub async fn finish(&mut self) -> Result<MergeStats, ArchiverError> {
        if matches!(self.state, ConsumerState::Streaming { .. }) {
            self.end_pv().await?;
        }
        if !matches!(self.state, ConsumerState::Done) {
            self.state = ConsumerState::Done;
            self.sink.finish().await?;
        }
        Ok(self.merge.stats())
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> MergeStats {
        self.merge.stats()
    }
}
