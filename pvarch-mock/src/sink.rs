use async_trait::async_trait;
use pvarch_core::{ArchiverError, Event, EventSink, ProxySink, PvHeader, Trailer};

/// One call observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    /// `on_new_pv`.
    NewPv(PvHeader),
    /// `on_event`.
    Event(Event),
    /// `on_consolidated`.
    Consolidated(String, Vec<Event>),
    /// `on_trailer`.
    Trailer(String, Trailer),
    /// `finish`.
    Finish,
}

/// Sink that records every call, optionally disconnecting after N events.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Calls in arrival order.
    pub records: Vec<SinkRecord>,
    gone_after: Option<usize>,
    events_seen: usize,
}

impl RecordingSink {
    /// Sink that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that returns `ClientGone` once `n` events have been accepted.
    #[must_use]
    pub fn disconnecting_after(n: usize) -> Self {
        Self {
            gone_after: Some(n),
            ..Self::default()
        }
    }

    /// PV names announced through `on_new_pv`, in order.
    #[must_use]
    pub fn new_pvs(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match r {
                SinkRecord::NewPv(h) => Some(h.pv_name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Events delivered through `on_event` for `pv`.
    #[must_use]
    pub fn events_for(&self, pv: &str) -> Vec<Event> {
        let mut current = None;
        let mut out = Vec::new();
        for r in &self.records {
            match r {
                SinkRecord::NewPv(h) => current = Some(h.pv_name.as_str()),
                SinkRecord::Event(e) if current == Some(pv) => out.push(e.clone()),
                _ => {}
            }
        }
        out
    }

    /// Header passed to `on_new_pv` for `pv`.
    #[must_use]
    pub fn header_for(&self, pv: &str) -> Option<&PvHeader> {
        self.records.iter().find_map(|r| match r {
            SinkRecord::NewPv(h) if h.pv_name == pv => Some(h),
            _ => None,
        })
    }

    /// Whether `finish` was called.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.records.iter().any(|r| matches!(r, SinkRecord::Finish))
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn on_new_pv(&mut self, header: &PvHeader) -> Result<(), ArchiverError> {
        self.records.push(SinkRecord::NewPv(header.clone()));
        Ok(())
    }

    async fn on_event(&mut self, event: &Event) -> Result<(), ArchiverError> {
        if self.gone_after.is_some_and(|n| self.events_seen >= n) {
            return Err(ArchiverError::ClientGone);
        }
        self.events_seen += 1;
        self.records.push(SinkRecord::Event(event.clone()));
        Ok(())
    }

    async fn on_consolidated(&mut self, pv: &str, events: Vec<Event>) -> Result<(), ArchiverError> {
        self.records
            .push(SinkRecord::Consolidated(pv.to_string(), events));
        Ok(())
    }

    async fn on_trailer(&mut self, pv: &str, trailer: Trailer) -> Result<(), ArchiverError> {
        self.records.push(SinkRecord::Trailer(pv.to_string(), trailer));
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), ArchiverError> {
        self.records.push(SinkRecord::Finish);
        Ok(())
    }
}

/// Proxy sink capturing relayed headers and body bytes.
#[derive(Debug, Default)]
pub struct RecordingProxySink {
    /// Relayed headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Concatenated body chunks.
    pub body: Vec<u8>,
    /// Number of chunks written.
    pub chunks: usize,
}

#[async_trait]
impl ProxySink for RecordingProxySink {
    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ArchiverError> {
        self.body.extend_from_slice(chunk);
        self.chunks += 1;
        Ok(())
    }
}
