use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};
use pvarch_core::{
    ArchiverError, EventStream, ExecutionMode, RetrievalUnit, SourceLocator, SourceRegistry,
    TierRank,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::Archiver;

/// Outcome of running one retrieval unit.
#[derive(Debug)]
pub enum RetrievalResult {
    /// The source has no samples for the unit's span.
    NoData,
    /// A lazy stream with at least one pending item, events tagged with the unit's tier.
    Stream(EventStream),
    /// The unit failed; the consumer logs it and treats the tier as empty.
    Failed(ArchiverError),
}

/// Runs retrieval units either deferred on the caller's task or on a bounded
/// set of tokio tasks.
pub struct UnitExecutor {
    sources: Arc<dyn SourceRegistry>,
    permits: Option<Arc<Semaphore>>,
    unit_timeout: Duration,
}

impl UnitExecutor {
    /// Executor for one PV.
    ///
    /// `BoundedParallel` without a positive `max_parallel` degrades to serial.
    pub fn new(
        sources: Arc<dyn SourceRegistry>,
        mode: ExecutionMode,
        max_parallel: Option<usize>,
        unit_timeout: Duration,
    ) -> Self {
        let permits = match (mode, max_parallel) {
            (ExecutionMode::BoundedParallel, Some(n)) if n > 0 => Some(Arc::new(Semaphore::new(n))),
            _ => None,
        };
        Self {
            sources,
            permits,
            unit_timeout,
        }
    }

    /// Mode actually in effect.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        if self.permits.is_some() {
            ExecutionMode::BoundedParallel
        } else {
            ExecutionMode::Serial
        }
    }

    /// Schedule `units`, returning one pending result per unit in the same order.
    ///
    /// In serial mode nothing runs until the pending result is awaited. In
    /// bounded mode every unit is spawned immediately and waits for a permit.
    pub fn submit(&self, units: Vec<RetrievalUnit>) -> Vec<PendingUnit> {
        units
            .into_iter()
            .map(|unit| {
                let locator = unit.locator().clone();
                let tier = unit.tier();
                let sources = Arc::clone(&self.sources);
                let timeout = self.unit_timeout;
                let state = match &self.permits {
                    None => PendingState::Deferred(Some(
                        run_unit(sources, unit, timeout).boxed(),
                    )),
                    Some(permits) => {
                        let permits = Arc::clone(permits);
                        PendingState::Spawned(Some(tokio::spawn(async move {
                            let Ok(_permit) = permits.acquire_owned().await else {
                                return RetrievalResult::Failed(ArchiverError::source(
                                    unit.locator().to_string(),
                                    "executor closed before the unit started",
                                ));
                            };
                            run_unit(sources, unit, timeout).await
                        })))
                    }
                };
                PendingUnit {
                    locator,
                    tier,
                    state,
                }
            })
            .collect()
    }

    /// Stop admitting queued units. Units already running finish; queued ones fail.
    pub fn close(&self) {
        if let Some(permits) = &self.permits {
            permits.close();
        }
    }
}

impl Drop for UnitExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

enum PendingState {
    Deferred(Option<BoxFuture<'static, RetrievalResult>>),
    Spawned(Option<JoinHandle<RetrievalResult>>),
}

/// Result of a submitted unit, consumed exactly once.
///
/// Dropping a pending unit whose task is still running aborts the task.
pub struct PendingUnit {
    locator: SourceLocator,
    tier: TierRank,
    state: PendingState,
}

impl PendingUnit {
    /// Source the unit reads from.
    #[must_use]
    pub const fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Tier rank of the unit.
    #[must_use]
    pub const fn tier(&self) -> TierRank {
        self.tier
    }

    /// Wait for the unit's result.
    pub async fn wait(mut self) -> RetrievalResult {
        match &mut self.state {
            PendingState::Deferred(fut) => match fut.take() {
                Some(fut) => fut.await,
                None => RetrievalResult::NoData,
            },
            PendingState::Spawned(slot) => {
                let Some(handle) = slot.as_mut() else {
                    return RetrievalResult::NoData;
                };
                let joined = handle.await;
                *slot = None;
                joined.unwrap_or_else(|e| {
                    RetrievalResult::Failed(ArchiverError::source(
                        self.locator.to_string(),
                        format!("unit task ended abnormally: {e}"),
                    ))
                })
            }
        }
    }
}

impl Drop for PendingUnit {
    fn drop(&mut self) {
        if let PendingState::Spawned(slot) = &mut self.state
            && let Some(handle) = slot.take()
            && !handle.is_finished()
        {
            handle.abort();
        }
    }
}

/// Fetch one unit: open the source under the per-unit timeout and pull the
/// first item so empty streams surface as `NoData`.
async fn run_unit(
    sources: Arc<dyn SourceRegistry>,
    unit: RetrievalUnit,
    timeout: Duration,
) -> RetrievalResult {
    let locator = unit.locator().clone();
    let source = match sources.source_for(&locator) {
        Ok(source) => source,
        Err(e) => return RetrievalResult::Failed(e),
    };
    let tier = unit.tier();

    let opened = Archiver::unit_call_with_timeout(&locator, timeout, async {
        let Some(EventStream { desc, mut events }) = source
            .fetch(unit.pv_name(), unit.span())
            .await
            .map_err(|e| Archiver::tag_err(&locator, e))?
        else {
            return Ok(None);
        };
        match events.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(Archiver::tag_err(&locator, e)),
            Some(Ok(first)) => Ok(Some(EventStream {
                desc,
                events: stream::iter([Ok(first)]).chain(events).boxed(),
            })),
        }
    })
    .await;

    match opened {
        Ok(None) => RetrievalResult::NoData,
        Ok(Some(EventStream { desc, events })) => RetrievalResult::Stream(EventStream {
            desc,
            events: events
                .map(move |item| item.map(|e| e.with_tier(tier)))
                .boxed(),
        }),
        Err(e) => RetrievalResult::Failed(e),
    }
}
