//! Collaborator traits: data sources, the cluster directory and output sinks.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use pvarch_types::{ArchiverError, TimeSpan};

use crate::descriptor::{NodeInfo, PvHeader, PvTypeDescriptor, SourceLocator, StreamDesc, Trailer};
use crate::event::Event;

/// Lazy event sequence produced by one data source for one unit.
pub struct EventStream {
    /// What the source says the stream carries.
    pub desc: StreamDesc,
    /// Events in timestamp order. An `Err` item ends the stream.
    pub events: BoxStream<'static, Result<Event, ArchiverError>>,
}

impl core::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventStream")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

/// A single tier's data for one PV.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Open a stream of events for `pv` within `span`.
    ///
    /// Returns `Ok(None)` when the source has nothing for the window.
    async fn fetch(&self, pv: &str, span: TimeSpan) -> Result<Option<EventStream>, ArchiverError>;
}

/// Maps source locators to live data sources.
pub trait SourceRegistry: Send + Sync {
    /// Data source serving `locator`.
    ///
    /// # Errors
    /// Returns an error when no source can serve the locator; the unit is then
    /// treated as failed.
    fn source_for(&self, locator: &SourceLocator) -> Result<Arc<dyn DataSource>, ArchiverError>;
}

/// Read-only view of the configuration/clustering service.
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    /// Whether the service finished starting and can take retrieval requests.
    fn startup_complete(&self) -> bool;

    /// This node.
    fn local_node(&self) -> NodeInfo;

    /// Node with the given identity.
    async fn node(&self, identity: &str) -> Option<NodeInfo>;

    /// Archiving metadata for `pv`, if the cluster archives it.
    async fn type_descriptor(&self, pv: &str) -> Option<PvTypeDescriptor>;

    /// Canonical name when `pv` is an alias.
    async fn real_name_for_alias(&self, pv: &str) -> Option<String>;

    /// Legacy archive servers that hold data for `pv`, in priority order.
    async fn legacy_servers_for(&self, pv: &str) -> Vec<String>;

    /// Base URLs of external archiver appliances federated with this cluster.
    async fn external_appliances(&self) -> Vec<String>;
}

/// Format-specific serializer receiving the merged output.
///
/// Any method may return `ArchiverError::ClientGone`, which stops the request.
#[async_trait]
pub trait EventSink: Send {
    /// A new PV begins. Called exactly once per PV, before any of its events.
    async fn on_new_pv(&mut self, header: &PvHeader) -> Result<(), ArchiverError>;

    /// One merged (and possibly post-processed) event.
    async fn on_event(&mut self, event: &Event) -> Result<(), ArchiverError>;

    /// Output of a consolidating post-processor after the PV's last unit.
    async fn on_consolidated(&mut self, pv: &str, events: Vec<Event>) -> Result<(), ArchiverError>;

    /// Trailing record after the PV.
    async fn on_trailer(&mut self, pv: &str, trailer: Trailer) -> Result<(), ArchiverError>;

    /// The request is complete.
    async fn finish(&mut self) -> Result<(), ArchiverError>;
}

/// Byte-level sink used when a request is proxied to another node.
#[async_trait]
pub trait ProxySink: Send {
    /// Relay one allow-listed upstream header.
    fn set_header(&mut self, name: &str, value: &str);

    /// Relay one chunk of the upstream body.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ArchiverError>;
}
