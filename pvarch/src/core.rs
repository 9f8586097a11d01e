use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pvarch_core::{
    ArchiverError, ClusterDirectory, EventSink, PostProcessorRegistry, ProxySink, RetrievalConfig,
    RetrievalReport, SourceLocator, SourceRegistry,
};

use crate::router::request::RetrievalRequest;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Retrieval front end for one appliance: resolves PVs against the cluster,
/// fetches their tiers, merges them and hands the result to a sink.
pub struct Archiver {
    pub(crate) directory: Arc<dyn ClusterDirectory>,
    pub(crate) sources: Arc<dyn SourceRegistry>,
    pub(crate) processors: PostProcessorRegistry,
    pub(crate) cfg: RetrievalConfig,
    pub(crate) clock: Clock,
    pub(crate) http: reqwest::Client,
}

/// Builder for constructing an `Archiver` with custom configuration.
pub struct ArchiverBuilder {
    directory: Option<Arc<dyn ClusterDirectory>>,
    sources: Option<Arc<dyn SourceRegistry>>,
    processors: PostProcessorRegistry,
    cfg: RetrievalConfig,
    clock: Clock,
    http: Option<reqwest::Client>,
}

impl Default for ArchiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiverBuilder {
    /// Create a new builder with sensible defaults.
    ///
    /// Behavior and trade-offs:
    /// - A cluster directory and a source registry are required; `build` fails
    ///   without them.
    /// - Defaults follow [`RetrievalConfig::default`]: 60 s engine flush with a
    ///   window factor of 2, parallel retrieval from 60 MiB of estimated cost
    ///   with 4 units at a time, 30 s per unit and 60 s per proxied request.
    /// - The built-in post-processors are registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            directory: None,
            sources: None,
            processors: PostProcessorRegistry::builtin(),
            cfg: RetrievalConfig::default(),
            clock: Arc::new(Utc::now),
            http: None,
        }
    }

    /// Set the cluster directory used for descriptors, ownership and aliases.
    #[must_use]
    pub fn directory(mut self, directory: Arc<dyn ClusterDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the registry that opens data sources for locators.
    #[must_use]
    pub fn sources(mut self, sources: Arc<dyn SourceRegistry>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Replace the post-processor registry.
    ///
    /// Behavior and trade-offs:
    /// - Start from [`PostProcessorRegistry::builtin`] and add to it with
    ///   `with(...)` to keep `raw`, `firstSample` and friends available.
    /// - Requests naming an unregistered processor are rejected per PV with 404.
    #[must_use]
    pub fn processors(mut self, processors: PostProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    /// Replace the whole retrieval configuration.
    #[must_use]
    pub fn config(mut self, cfg: RetrievalConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Set how often the engine flushes to the first store.
    ///
    /// Behavior and trade-offs:
    /// - Together with [`engine_window_factor`](Self::engine_window_factor) this
    ///   decides whether the engine is asked at all: a span that ended longer
    ///   ago than `flush × factor` skips the engine.
    /// - Too small a window misses samples not yet flushed; too large a window
    ///   adds an engine round trip to historical queries.
    #[must_use]
    pub const fn engine_flush_interval(mut self, interval: Duration) -> Self {
        self.cfg.engine_flush_interval = interval;
        self
    }

    /// Set the multiple of the flush interval the engine is trusted to cover.
    #[must_use]
    pub const fn engine_window_factor(mut self, factor: u32) -> Self {
        self.cfg.engine_window_factor = factor;
        self
    }

    /// Set the estimated cost in bytes from which a PV's units run in parallel.
    ///
    /// Behavior and trade-offs:
    /// - Below the threshold units run one after another on the request task,
    ///   which keeps small requests cheap.
    /// - At or above it units are spawned and bounded by
    ///   [`max_parallel_units`](Self::max_parallel_units); emission order is
    ///   unchanged.
    #[must_use]
    pub const fn parallel_cost_threshold(mut self, bytes: u64) -> Self {
        self.cfg.parallel_cost_threshold = bytes;
        self
    }

    /// Set how many units of one PV may run at once; `None` disables the pool.
    #[must_use]
    pub const fn max_parallel_units(mut self, n: Option<usize>) -> Self {
        self.cfg.max_parallel_units = n;
        self
    }

    /// Set the per-unit timeout.
    ///
    /// Behavior and trade-offs:
    /// - Bounds opening a unit's stream and reading its first sample. A unit
    ///   that times out is logged and treated as empty.
    #[must_use]
    pub const fn unit_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.unit_timeout = timeout;
        self
    }

    /// Set the timeout for proxied requests and appliance lookups.
    #[must_use]
    pub const fn proxy_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.proxy_timeout = timeout;
        self
    }

    /// Set the processor used when a request asks for reduced data.
    #[must_use]
    pub fn default_reduced_processor(mut self, identity: impl Into<String>) -> Self {
        self.cfg.default_reduced_processor = identity.into();
        self
    }

    /// Toggle asking external appliances about PVs unknown to the cluster.
    #[must_use]
    pub const fn lookup_external_servers(mut self, yes: bool) -> Self {
        self.cfg.lookup_external_servers = yes;
        self
    }

    /// Override the clock used for default request windows and engine inclusion.
    #[must_use]
    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Use a preconfigured HTTP client for proxying.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Build the `Archiver`.
    ///
    /// # Errors
    /// Returns `InvalidArg` if no directory or source registry was set, or if
    /// the engine window factor is zero.
    pub fn build(self) -> Result<Archiver, ArchiverError> {
        let directory = self.directory.ok_or_else(|| {
            ArchiverError::invalid_arg("no cluster directory; set one via directory(...)")
        })?;
        let sources = self.sources.ok_or_else(|| {
            ArchiverError::invalid_arg("no source registry; set one via sources(...)")
        })?;
        if self.cfg.engine_window_factor == 0 {
            return Err(ArchiverError::invalid_arg(
                "engine_window_factor must be at least 1",
            ));
        }
        Ok(Archiver {
            directory,
            sources,
            processors: self.processors,
            cfg: self.cfg,
            clock: self.clock,
            http: self.http.unwrap_or_default(),
        })
    }
}

impl Archiver {
    /// Start building a new `Archiver`.
    ///
    /// ```rust,ignore
    /// let archiver = pvarch::Archiver::builder()
    ///     .directory(Arc::new(my_directory))
    ///     .sources(Arc::new(my_sources))
    ///     .max_parallel_units(Some(8))
    ///     .build()?;
    /// ```
    #[must_use]
    pub fn builder() -> ArchiverBuilder {
        ArchiverBuilder::new()
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.cfg
    }

    /// Current time according to the configured clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Parse a `getData.<ext>` query against this archiver's clock.
    ///
    /// # Errors
    /// Returns `InvalidArg` for malformed parameters.
    pub fn parse_request<K, V>(
        &self,
        extension: &str,
        query: &[(K, V)],
    ) -> Result<RetrievalRequest, ArchiverError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        RetrievalRequest::from_query(extension, query, self.now())
    }

    /// Serve one `getData.<ext>` request end to end.
    ///
    /// Rejects with 503 before parsing if the cluster has not finished
    /// starting, then parses the query and runs [`retrieve`](Self::retrieve).
    ///
    /// # Errors
    /// See [`retrieve`](Self::retrieve); malformed parameters give `InvalidArg`.
    pub async fn get_data<K, V>(
        &self,
        extension: &str,
        query: &[(K, V)],
        sink: &mut dyn EventSink,
        proxy: &mut dyn ProxySink,
    ) -> Result<RetrievalReport, ArchiverError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.ensure_started()?;
        let req = self.parse_request(extension, query)?;
        self.retrieve(&req, sink, proxy).await
    }

    pub(crate) fn ensure_started(&self) -> Result<(), ArchiverError> {
        if self.directory.startup_complete() {
            Ok(())
        } else {
            Err(ArchiverError::ServiceUnavailable(
                "cluster startup has not completed".into(),
            ))
        }
    }

    /// Wrap a unit future with a timeout and standardized timeout error mapping.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "pvarch::core::unit_call_with_timeout",
            skip(fut),
            fields(
                source = %locator,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ),
        )
    )]
    pub(crate) async fn unit_call_with_timeout<T, Fut>(
        locator: &SourceLocator,
        timeout: Duration,
        fut: Fut,
    ) -> Result<T, ArchiverError>
    where
        Fut: core::future::Future<Output = Result<T, ArchiverError>>,
    {
        (tokio::time::timeout(timeout, fut).await)
            .unwrap_or_else(|_| Err(ArchiverError::source_timeout(locator.to_string())))
    }

    /// Attribute an error to the source it came from unless it already is.
    pub(crate) fn tag_err(locator: &SourceLocator, e: ArchiverError) -> ArchiverError {
        match e {
            e @ (ArchiverError::Source { .. }
            | ArchiverError::SourceTimeout { .. }
            | ArchiverError::ClientGone) => e,
            other => ArchiverError::source(locator.to_string(), other.to_string()),
        }
    }
}
