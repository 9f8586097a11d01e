use std::sync::Arc;

use pvarch::{PvDisposition, ResolveContext, SourceLocator, TierRank, TimeSpan, resolve_units};
use pvarch_mock::{MockRegistry, MockSource, SourceBehavior, ts};

use crate::helpers::{
    LEGACY, NOW, STS, archiver, desc, directory, engine_url, query, ramp, serve, with_param,
};

fn span(start: i64, end: i64) -> TimeSpan {
    TimeSpan::new(ts(start), ts(end)).unwrap()
}

#[test]
fn legacy_bound_ends_where_archiving_began() {
    let legacy = vec![LEGACY.to_string()];
    let engine = engine_url();
    let ctx = ResolveContext {
        now: ts(NOW),
        engine_window: chrono::Duration::seconds(120),
        engine_url: &engine,
        legacy_servers: &legacy,
        legacy_count: Some(500),
        legacy_how: 0,
    };

    let mut d = desc("SIM:PV1", &[STS]);
    d.created_at = Some(ts(500));
    let units = resolve_units("SIM:PV1", Some(&d), span(100, 1_000), &ctx);
    let legacy_unit = units.last().unwrap();
    assert_eq!(legacy_unit.tier(), TierRank::legacy(1, 0));
    assert_eq!(legacy_unit.span(), span(100, 500));
    assert_eq!(
        legacy_unit.locator(),
        &SourceLocator::Legacy {
            url: LEGACY.to_string(),
            count: Some(500),
            how: 0
        }
    );

    // Archiving began before the span: legacy servers have nothing newer.
    d.created_at = Some(ts(50));
    let units = resolve_units("SIM:PV1", Some(&d), span(100, 1_000), &ctx);
    assert!(units.iter().all(|u| u.tier() != TierRank::legacy(1, 0)));

    // Unknown creation time: full span.
    d.created_at = None;
    let units = resolve_units("SIM:PV1", Some(&d), span(100, 1_000), &ctx);
    assert_eq!(units.last().unwrap().span(), span(100, 1_000));

    // Creation after the span end clips to the span.
    d.created_at = Some(ts(5_000));
    let units = resolve_units("SIM:PV1", Some(&d), span(100, 1_000), &ctx);
    assert_eq!(units.last().unwrap().span(), span(100, 1_000));
}

#[test]
fn no_descriptor_and_no_legacy_resolves_to_nothing() {
    let engine = engine_url();
    let ctx = ResolveContext {
        now: ts(NOW),
        engine_window: chrono::Duration::seconds(120),
        engine_url: &engine,
        legacy_servers: &[],
        legacy_count: None,
        legacy_how: 0,
    };
    assert!(resolve_units("SIM:GONE", None, span(0, 10), &ctx).is_empty());
}

#[test]
fn no_descriptor_uses_only_the_first_legacy_server() {
    let servers = vec![LEGACY.to_string(), "http://legacy2.example/archive".to_string()];
    let engine = engine_url();
    let ctx = ResolveContext {
        now: ts(NOW),
        engine_window: chrono::Duration::seconds(120),
        engine_url: &engine,
        legacy_servers: &servers,
        legacy_count: None,
        legacy_how: 0,
    };

    let units = resolve_units("OLD:PV", None, span(0, 10), &ctx);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].tier(), TierRank::legacy(0, 0));
    assert_eq!(units[0].locator().url(), LEGACY);
    assert_eq!(units[0].span(), span(0, 10));
}

#[tokio::test]
async fn pv_known_only_to_legacy_server_is_served_from_it() {
    let legacy = Arc::new(MockSource::new().with("OLD:PV", SourceBehavior::Events(ramp(0..4))));
    let registry = MockRegistry::new().with(LEGACY, Arc::clone(&legacy));
    let archiver = archiver(directory().with_legacy("OLD:PV", &[LEGACY]), registry);

    let q = with_param(query(&["OLD:PV"], 0, 1_000), "ca_count", "100");
    let served = serve(&archiver, "json", &q).await;
    let report = served.report();

    assert_eq!(served.values_for("OLD:PV").len(), 4);
    assert_eq!(report.pvs[0].disposition, PvDisposition::Local { units: 1 });
    let header = served.sink.header_for("OLD:PV").unwrap();
    assert_eq!(header.sample_type, None);
    assert_eq!(legacy.requests().await.len(), 1);
}

#[tokio::test]
async fn unknown_pv_is_not_found() {
    let archiver = archiver(directory(), MockRegistry::new());
    let served = serve(&archiver, "json", &query(&["NOPE:PV"], 0, 1_000)).await;
    assert_eq!(served.err().status_code(), 404);
    assert!(served.sink.records.is_empty());
}
