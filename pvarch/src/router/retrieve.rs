use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(feature = "tracing")]
use std::time::Instant;

use pvarch_core::{
    ArchiverError, EventSink, MergeStats, OutputFormat, PostProcessor, ProxySink, PvDisposition,
    PvHeader, PvOutcome, PvTypeDescriptor, RetrievalReport, TimeSpan,
};

use super::consumer::{DrainOutcome, MergeConsumer};
use super::executor::UnitExecutor;
use super::proxy;
use super::request::{PvSelector, RetrievalRequest};
use super::resolver::{ResolveContext, resolve_units};
use crate::Archiver;

#[cfg(feature = "tracing")]
const SLOW_REQUEST_MS: u128 = 5_000;

/// A PV served from this node's tiers.
struct LocalPlan {
    /// Name the PV is reported under.
    name: String,
    /// Name the tiers are asked for; differs for `pv.FIELD` projections.
    fetch_name: String,
    descriptor: Option<PvTypeDescriptor>,
    legacy_servers: Vec<String>,
    processor: Box<dyn PostProcessor>,
}

enum Plan {
    Local(LocalPlan),
    Remote {
        name: String,
        /// `pv` value sent upstream, inline processor syntax included.
        forwarded: String,
        target: String,
    },
    Rejected { name: String, error: ArchiverError },
}

impl Plan {
    fn name(&self) -> &str {
        match self {
            Self::Local(local) => &local.name,
            Self::Remote { name, .. } | Self::Rejected { name, .. } => name,
        }
    }
}

/// Where the data for a PV lives, before a processor is chosen.
enum Located {
    Local {
        fetch_name: String,
        descriptor: Option<PvTypeDescriptor>,
        legacy_servers: Vec<String>,
        field: Option<String>,
    },
    Remote(String),
}

impl Archiver {
    /// Serve a parsed request: proxy remotely owned PVs, then merge every
    /// local PV's tiers into `sink` in request order.
    ///
    /// Behavior and trade-offs:
    /// - PVs owned by another node, or archived only by an external appliance,
    ///   are forwarded before any local work; PVs with the same target share
    ///   one forwarded request and their bytes go to `relay` unchanged.
    /// - Local PVs run one after another. Each PV's units run serially or on a
    ///   bounded pool depending on the processor's cost estimate; output order
    ///   is tier order either way.
    /// - A failing tier is logged and treated as empty. A PV that cannot be
    ///   planned (unknown, bad processor) is reported in the returned report
    ///   while the rest of the batch continues.
    ///
    /// # Errors
    /// - `ServiceUnavailable` before cluster startup completes.
    /// - `UnsupportedFormat` for an unknown extension.
    /// - The first PV's rejection when every PV is rejected.
    /// - `ClientGone` when the sink reports a disconnect; the request stops
    ///   and in-flight units are aborted.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "pvarch::router::retrieve",
            skip(self, req, sink, relay),
            fields(ext = %req.extension, pvs = req.pvs.len(), ranges = req.spans.len()),
        )
    )]
    pub async fn retrieve(
        &self,
        req: &RetrievalRequest,
        sink: &mut dyn EventSink,
        relay: &mut dyn ProxySink,
    ) -> Result<RetrievalReport, ArchiverError> {
        self.ensure_started()?;
        OutputFormat::from_extension(&req.extension)?;
        let Some(overall) = req.overall_span() else {
            return Err(ArchiverError::invalid_arg("request has no time range"));
        };
        #[cfg(feature = "tracing")]
        let started = Instant::now();

        let mut plans = Vec::with_capacity(req.pvs.len());
        for selector in &req.pvs {
            plans.push(self.plan(req, selector).await);
        }

        if let Some(Plan::Rejected { error, .. }) = plans.first()
            && plans.iter().all(|p| matches!(p, Plan::Rejected { .. }))
        {
            return Err(error.clone());
        }

        let mut warnings = Vec::new();
        let mut outcomes: Vec<Option<PvDisposition>> = vec![None; plans.len()];

        for (i, plan) in plans.iter().enumerate() {
            if let Plan::Rejected { error, .. } = plan {
                warnings.push(error.clone());
                outcomes[i] = Some(PvDisposition::Failed(error.clone()));
            }
        }

        // Proxied PVs go out first, grouped by target in first-seen order.
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (i, plan) in plans.iter().enumerate() {
            if let Plan::Remote { target, .. } = plan {
                match groups.iter_mut().find(|(t, _)| *t == target.as_str()) {
                    Some((_, members)) => members.push(i),
                    None => groups.push((target.as_str(), vec![i])),
                }
            }
        }
        for (target, members) in groups {
            let pvs: Vec<String> = members
                .iter()
                .filter_map(|&i| match &plans[i] {
                    Plan::Remote { forwarded, .. } => Some(forwarded.clone()),
                    _ => None,
                })
                .collect();
            match proxy::forward(&self.http, target, req, &pvs, self.cfg.proxy_timeout, relay)
                .await
            {
                Ok(()) => {
                    for &i in &members {
                        outcomes[i] = Some(PvDisposition::Proxied {
                            target: target.to_string(),
                        });
                    }
                }
                Err(e) if e.is_client_gone() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(target_url = target, "client went away while proxying");
                    return Err(e);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(target_url = target, error = %e, "proxy failed");
                    for &i in &members {
                        outcomes[i] = Some(PvDisposition::Failed(e.clone()));
                    }
                    warnings.push(e);
                }
            }
        }

        let names: Vec<String> = plans.iter().map(|p| p.name().to_string()).collect();
        let mut stats = MergeStats::default();
        if plans.iter().any(|p| matches!(p, Plan::Local(_))) {
            let mut consumer = MergeConsumer::new(sink);
            for (i, plan) in plans.into_iter().enumerate() {
                let Plan::Local(local) = plan else { continue };
                match self
                    .serve_local(req, overall, local, &mut consumer, &mut warnings)
                    .await
                {
                    Ok(units) => outcomes[i] = Some(PvDisposition::Local { units }),
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        if e.is_client_gone() {
                            tracing::debug!("client went away; stopping request");
                        }
                        return Err(e);
                    }
                }
            }
            stats = consumer.finish().await?;
        }

        let pvs = names
            .into_iter()
            .zip(outcomes)
            .map(|(pv, disposition)| PvOutcome {
                pv,
                disposition: disposition.unwrap_or(PvDisposition::Local { units: 0 }),
            })
            .collect();

        #[cfg(feature = "tracing")]
        {
            let elapsed_ms = started.elapsed().as_millis();
            if elapsed_ms > SLOW_REQUEST_MS {
                tracing::warn!(
                    emitted = stats.emitted,
                    skipped = stats.skipped,
                    compared = stats.compared,
                    conflicts = stats.conflicts,
                    elapsed_ms = u64::try_from(elapsed_ms).unwrap_or(u64::MAX),
                    "slow retrieval"
                );
            } else {
                tracing::info!(
                    emitted = stats.emitted,
                    skipped = stats.skipped,
                    compared = stats.compared,
                    conflicts = stats.conflicts,
                    elapsed_ms = u64::try_from(elapsed_ms).unwrap_or(u64::MAX),
                    "retrieval done"
                );
            }
        }

        Ok(RetrievalReport {
            stats,
            pvs,
            warnings,
        })
    }

    async fn plan(&self, req: &RetrievalRequest, selector: &PvSelector) -> Plan {
        let name = self
            .directory
            .real_name_for_alias(&selector.name)
            .await
            .unwrap_or_else(|| selector.name.clone());

        let located = match self.locate(req, &name).await {
            Ok(located) => located,
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(pv = %name, error = %error, "cannot serve pv");
                return Plan::Rejected { name, error };
            }
        };

        let (fetch_name, descriptor, legacy_servers, field) = match located {
            Located::Remote(target) => {
                return Plan::Remote {
                    name,
                    forwarded: selector.raw.clone(),
                    target,
                };
            }
            Located::Local {
                fetch_name,
                descriptor,
                legacy_servers,
                field,
            } => (fetch_name, descriptor, legacy_servers, field),
        };

        let processor = match &field {
            Some(field) => self.processors.field_projection(field, &name),
            None => {
                let identity = selector
                    .processor
                    .as_deref()
                    .or(req.processor.as_deref())
                    .or(req
                        .use_reduced
                        .then_some(self.cfg.default_reduced_processor.as_str()))
                    .unwrap_or("raw");
                self.processors.instantiate(identity, &name)
            }
        };
        match processor {
            Ok(processor) => Plan::Local(LocalPlan {
                name,
                fetch_name,
                descriptor,
                legacy_servers,
                processor,
            }),
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(pv = %name, error = %error, "post processor rejected");
                Plan::Rejected { name, error }
            }
        }
    }

    /// Find who holds `name`: this node (with or without a descriptor), another
    /// node, or an external appliance.
    async fn locate(&self, req: &RetrievalRequest, name: &str) -> Result<Located, ArchiverError> {
        let mut field = None;
        let mut fetch_name = name.to_string();
        let mut descriptor = self.directory.type_descriptor(name).await;

        if descriptor.is_none()
            && let Some((base, f)) = name.rsplit_once('.')
            && let Some(base_desc) = self.directory.type_descriptor(base).await
            && base_desc.archives_field(f)
        {
            fetch_name = base.to_string();
            field = Some(f.to_string());
            descriptor = Some(base_desc);
        }

        let local = self.directory.local_node();
        let descriptor = match descriptor {
            Some(d) => d,
            None => {
                let legacy_servers = self.directory.legacy_servers_for(name).await;
                if !legacy_servers.is_empty() {
                    return Ok(Located::Local {
                        fetch_name,
                        descriptor: None,
                        legacy_servers,
                        field: None,
                    });
                }
                if self.cfg.lookup_external_servers
                    && let Some(target) = self.find_external(name).await
                {
                    return Ok(Located::Remote(target));
                }
                let Some(template) = &req.retired_template else {
                    return Err(ArchiverError::not_found(format!("pv {name}")));
                };
                let Some(template_desc) = self.directory.type_descriptor(template).await else {
                    return Err(ArchiverError::not_found(format!(
                        "retired pv template {template} for {name}"
                    )));
                };
                PvTypeDescriptor::retired_from_template(&template_desc, name, &local.identity)
            }
        };

        if descriptor.owner != local.identity {
            let Some(node) = self.directory.node(&descriptor.owner).await else {
                return Err(ArchiverError::not_found(format!(
                    "owner {} of pv {name}",
                    descriptor.owner
                )));
            };
            return Ok(Located::Remote(node.retrieval_url));
        }

        let legacy_servers = self.directory.legacy_servers_for(&fetch_name).await;
        Ok(Located::Local {
            fetch_name,
            descriptor: Some(descriptor),
            legacy_servers,
            field,
        })
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn find_external(&self, name: &str) -> Option<String> {
        for url in self.directory.external_appliances().await {
            match proxy::are_we_archiving(&self.http, &url, name, self.cfg.proxy_timeout).await {
                Ok(true) => return Some(url),
                Ok(false) => {}
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(appliance = %url, pv = name, error = %e, "appliance lookup failed");
                }
            }
        }
        None
    }

    /// Merge every tier of one local PV into the consumer; returns the unit count.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn serve_local(
        &self,
        req: &RetrievalRequest,
        overall: TimeSpan,
        local: LocalPlan,
        consumer: &mut MergeConsumer<'_>,
        warnings: &mut Vec<ArchiverError>,
    ) -> Result<usize, ArchiverError> {
        let LocalPlan {
            name,
            fetch_name,
            descriptor,
            legacy_servers,
            processor,
        } = local;
        let node = self.directory.local_node();

        let mut headers = BTreeMap::new();
        if req.fetch_latest_metadata && descriptor.is_some() {
            match proxy::engine_metadata(
                &self.http,
                &node.engine_url,
                &fetch_name,
                self.cfg.proxy_timeout,
            )
            .await
            {
                Ok(meta) => headers = meta,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(pv = %name, error = %e, "cannot fetch latest metadata");
                }
            }
        }

        let cost = descriptor
            .as_ref()
            .map_or(0, |d| processor.estimate_cost(d, overall));
        let header = PvHeader {
            pv_name: name,
            sample_type: descriptor.as_ref().map(|d| d.sample_type),
            element_count: descriptor.as_ref().map(|d| d.element_count),
            processor: processor.identity().to_string(),
            headers,
        };
        consumer.begin_pv(&header, processor).await?;

        let ctx = ResolveContext {
            now: self.now(),
            engine_window: chrono::Duration::from_std(self.cfg.engine_window())
                .unwrap_or(chrono::Duration::MAX),
            engine_url: &node.engine_url,
            legacy_servers: &legacy_servers,
            legacy_count: req.legacy_count,
            legacy_how: req.legacy_how,
        };
        let units: Vec<_> = req
            .spans
            .iter()
            .flat_map(|span| resolve_units(&fetch_name, descriptor.as_ref(), *span, &ctx))
            .collect();
        let unit_count = units.len();

        let executor = UnitExecutor::new(
            Arc::clone(&self.sources),
            self.cfg.execution_mode(cost),
            self.cfg.max_parallel_units,
            self.cfg.unit_timeout,
        );
        #[cfg(feature = "tracing")]
        tracing::debug!(
            pv = %header.pv_name,
            units = unit_count,
            cost,
            mode = ?executor.mode(),
            "resolved retrieval units"
        );

        for pending in executor.submit(units) {
            let locator = pending.locator().clone();
            let result = pending.wait().await;
            match consumer.drain(&locator, result).await? {
                DrainOutcome::Failed(e) | DrainOutcome::Skipped(e) => warnings.push(e),
                DrainOutcome::Drained | DrainOutcome::NoData => {}
            }
        }
        executor.close();

        consumer.end_pv().await?;
        Ok(unit_count)
    }
}
