use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use pvarch_core::{
    ArchiverError, DataSource, Event, EventStream, SampleType, SourceLocator, SourceRegistry,
    StreamDesc, TimeSpan,
};
use tokio::sync::Mutex;

/// Instruction for how a source answers a fetch for one PV.
#[derive(Clone, Debug)]
pub enum SourceBehavior {
    /// Stream these events (clipped to the requested span).
    Events(Vec<Event>),
    /// Answer with an explicit "no data".
    NoData,
    /// Fail the fetch immediately.
    Fail(ArchiverError),
    /// Never answer (simulate a stalled tier).
    Hang,
    /// Stream these events, then fail mid-stream.
    FailAfter(Vec<Event>, ArchiverError),
    /// Wait before answering with these events.
    Delayed(Duration, Vec<Event>),
}

/// Scripted data source that records every fetch it receives.
pub struct MockSource {
    sample_type: SampleType,
    rules: HashMap<String, SourceBehavior>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, TimeSpan)>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Source reporting scalar doubles with no rules; every PV gets `NoData`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sample_type: SampleType::ScalarDouble,
            rules: HashMap::new(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Report a different sample type in stream descriptions.
    #[must_use]
    pub fn reporting(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    /// Script the behavior for `pv`.
    #[must_use]
    pub fn with(mut self, pv: &str, behavior: SourceBehavior) -> Self {
        self.rules.insert(pv.to_string(), behavior);
        self
    }

    /// Number of fetches received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `(pv, span)` fetched so far, in arrival order.
    pub async fn requests(&self) -> Vec<(String, TimeSpan)> {
        self.requests.lock().await.clone()
    }

    fn open(
        &self,
        pv: &str,
        span: TimeSpan,
        events: Vec<Event>,
        tail: Option<ArchiverError>,
    ) -> Option<EventStream> {
        let events: Vec<Result<Event, ArchiverError>> = events
            .into_iter()
            .filter(|e| span.contains(e.ts))
            .map(Ok)
            .chain(tail.map(Err))
            .collect();
        if events.is_empty() {
            return None;
        }
        Some(EventStream {
            desc: StreamDesc::new(pv, self.sample_type),
            events: stream::iter(events).boxed(),
        })
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch(&self, pv: &str, span: TimeSpan) -> Result<Option<EventStream>, ArchiverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push((pv.to_string(), span));
        match self.rules.get(pv).cloned() {
            None | Some(SourceBehavior::NoData) => Ok(None),
            Some(SourceBehavior::Events(events)) => Ok(self.open(pv, span, events, None)),
            Some(SourceBehavior::Fail(e)) => Err(e),
            Some(SourceBehavior::Hang) => {
                futures::future::pending::<()>().await;
                Ok(None)
            }
            Some(SourceBehavior::FailAfter(events, e)) => Ok(self.open(pv, span, events, Some(e))),
            Some(SourceBehavior::Delayed(d, events)) => {
                tokio::time::sleep(d).await;
                Ok(self.open(pv, span, events, None))
            }
        }
    }
}

/// Registry mapping locator URLs to mock sources.
#[derive(Default, Clone)]
pub struct MockRegistry {
    sources: HashMap<String, Arc<MockSource>>,
}

impl MockRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve locators whose URL is `url` from `source`.
    #[must_use]
    pub fn with(mut self, url: &str, source: Arc<MockSource>) -> Self {
        self.sources.insert(url.to_string(), source);
        self
    }
}

impl SourceRegistry for MockRegistry {
    fn source_for(&self, locator: &SourceLocator) -> Result<Arc<dyn DataSource>, ArchiverError> {
        self.sources
            .get(locator.url())
            .map(|s| Arc::clone(s) as Arc<dyn DataSource>)
            .ok_or_else(|| ArchiverError::source(locator.to_string(), "no source registered"))
    }
}
