use chrono::{DateTime, Utc};
use pvarch_core::{PvTypeDescriptor, RetrievalUnit, SourceLocator, TierRank, TimeSpan};

/// Inputs to [`resolve_units`] that come from the environment rather than the PV.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Current time.
    pub now: DateTime<Utc>,
    /// How long after a span's end the engine may still hold its samples.
    pub engine_window: chrono::Duration,
    /// Engine base URL of the owning node.
    pub engine_url: &'a str,
    /// Legacy servers listing the PV, in priority order.
    pub legacy_servers: &'a [String],
    /// Sample limit passed to legacy servers.
    pub legacy_count: Option<u32>,
    /// Retrieval method passed to legacy servers.
    pub legacy_how: i32,
}

/// Work out which tiers hold data for `pv` over `span`.
///
/// Rules:
/// - No descriptor: one unit from the first listed legacy server, over the full span.
/// - Engine (tier 0) only when the PV is sampled and the span ends in the future
///   or less than the engine window ago.
/// - One unit per configured store, in configured order, over the full span.
/// - Legacy servers after the stores, bound to `[span.start, created_at)`
///   (clipped to `span.end`), and only when archiving began after `span.start`
///   or its start is unknown.
///
/// Returns units sorted by tier rank, then bound start. An empty result means
/// there is nothing to fetch; it is never an error.
#[must_use]
pub fn resolve_units(
    pv: &str,
    descriptor: Option<&PvTypeDescriptor>,
    span: TimeSpan,
    ctx: &ResolveContext<'_>,
) -> Vec<RetrievalUnit> {
    let legacy_locator = |url: &String| SourceLocator::Legacy {
        url: url.clone(),
        count: ctx.legacy_count,
        how: ctx.legacy_how,
    };

    let Some(descriptor) = descriptor else {
        return ctx
            .legacy_servers
            .first()
            .map(|url| RetrievalUnit::new(pv, legacy_locator(url), TierRank::legacy(0, 0), span))
            .into_iter()
            .collect();
    };

    let mut units = Vec::with_capacity(descriptor.stores.len() + 1 + ctx.legacy_servers.len());

    if descriptor.is_sampled()
        && (span.end() >= ctx.now || ctx.now - span.end() < ctx.engine_window)
    {
        units.push(RetrievalUnit::new(
            pv,
            SourceLocator::Engine {
                url: ctx.engine_url.to_string(),
            },
            TierRank::ENGINE,
            span,
        ));
    }

    for (i, url) in descriptor.stores.iter().enumerate() {
        units.push(RetrievalUnit::new(
            pv,
            SourceLocator::Store { url: url.clone() },
            TierRank::store(i),
            span,
        ));
    }

    let legacy_span = match descriptor.created_at {
        None => Some(span),
        Some(created) if created > span.start() => span.clip_end(created),
        Some(_) => None,
    };
    if let Some(bound) = legacy_span {
        let stores = descriptor.stores.len();
        for (i, url) in ctx.legacy_servers.iter().enumerate() {
            units.push(RetrievalUnit::new(
                pv,
                legacy_locator(url),
                TierRank::legacy(stores, i),
                bound,
            ));
        }
    }

    units.sort_by_key(RetrievalUnit::order_key);
    units
}
