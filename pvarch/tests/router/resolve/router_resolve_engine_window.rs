use std::sync::Arc;

use pvarch::{
    PvTypeDescriptor, ResolveContext, SamplingMode, SourceLocator, TierRank, TimeSpan,
    resolve_units,
};
use pvarch_mock::{MockRegistry, MockSource, SourceBehavior, ts};

use crate::helpers::{LTS, NOW, STS, archiver, desc, directory, engine_url, query, ramp, serve};

fn ctx(engine: &str) -> ResolveContext<'_> {
    ResolveContext {
        now: ts(NOW),
        engine_window: chrono::Duration::seconds(120),
        engine_url: engine,
        legacy_servers: &[],
        legacy_count: None,
        legacy_how: 0,
    }
}

fn span(start: i64, end: i64) -> TimeSpan {
    TimeSpan::new(ts(start), ts(end)).unwrap()
}

fn tiers(d: &PvTypeDescriptor, s: TimeSpan) -> Vec<TierRank> {
    let engine = engine_url();
    resolve_units("SIM:PV1", Some(d), s, &ctx(&engine))
        .iter()
        .map(pvarch::RetrievalUnit::tier)
        .collect()
}

#[test]
fn engine_included_only_near_now() {
    let d = desc("SIM:PV1", &[STS, LTS]);

    // Ended 200 s ago with a 60 s flush and factor 2: engine already flushed.
    assert_eq!(
        tiers(&d, span(NOW - 3_600, NOW - 200)),
        vec![TierRank::store(0), TierRank::store(1)]
    );
    // Ended 30 s ago: engine may still hold samples.
    assert_eq!(
        tiers(&d, span(NOW - 3_600, NOW - 30)),
        vec![TierRank::ENGINE, TierRank::store(0), TierRank::store(1)]
    );
    // Ends in the future.
    assert_eq!(tiers(&d, span(NOW - 10, NOW + 10))[0], TierRank::ENGINE);
}

#[test]
fn unsampled_pv_never_asks_the_engine() {
    let mut d = desc("SIM:PV1", &[STS]);
    d.sampling = SamplingMode::NotSampled;
    assert_eq!(
        tiers(&d, span(NOW - 10, NOW + 10)),
        vec![TierRank::store(0)]
    );
}

#[test]
fn units_cover_the_requested_span() {
    let d = desc("SIM:PV1", &[STS]);
    let s = span(NOW - 50, NOW + 50);
    let engine = engine_url();
    let units = resolve_units("SIM:PV1", Some(&d), s, &ctx(&engine));
    assert_eq!(units.len(), 2);
    for unit in &units {
        assert!(s.covers(&unit.span()));
        assert_eq!(unit.pv_name(), "SIM:PV1");
    }
    assert_eq!(
        units[0].locator(),
        &SourceLocator::Engine { url: engine.clone() }
    );
}

#[tokio::test]
async fn archiver_skips_engine_for_old_spans() {
    let engine = Arc::new(MockSource::new().with("SIM:PV1", SourceBehavior::Events(ramp(0..5))));
    let sts = Arc::new(MockSource::new().with("SIM:PV1", SourceBehavior::Events(ramp(0..5))));
    let registry = MockRegistry::new()
        .with(&engine_url(), Arc::clone(&engine))
        .with(STS, Arc::clone(&sts));
    let archiver = archiver(directory().with_descriptor(desc("SIM:PV1", &[STS])), registry);

    let served = serve(&archiver, "json", &query(&["SIM:PV1"], 0, NOW - 200)).await;
    assert_eq!(served.report().stats.emitted, 5);
    assert_eq!(engine.calls(), 0);
    assert_eq!(sts.calls(), 1);

    let served = serve(&archiver, "json", &query(&["SIM:PV1"], 0, NOW - 30)).await;
    assert_eq!(served.report().stats.emitted, 5);
    assert_eq!(engine.calls(), 1);
}
