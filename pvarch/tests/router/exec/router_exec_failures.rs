use std::sync::Arc;

use pvarch::{ArchiverError, SampleType};
use pvarch_mock::{MockRegistry, MockSource, SourceBehavior};

use crate::helpers::{MTS, STS, archiver, desc, directory, query, ramp, serve};

const PV: &str = "SIM:PV1";

fn two_stores(sts: MockSource, mts: MockSource) -> pvarch::Archiver {
    let registry = MockRegistry::new()
        .with(STS, Arc::new(sts))
        .with(MTS, Arc::new(mts));
    archiver(directory().with_descriptor(desc(PV, &[STS, MTS])), registry)
}

#[tokio::test]
async fn failing_tier_is_treated_as_empty() {
    let archiver = two_stores(
        MockSource::new().with(
            PV,
            SourceBehavior::Fail(ArchiverError::source(STS, "disk unavailable")),
        ),
        MockSource::new().with(PV, SourceBehavior::Events(ramp(0..10))),
    );

    let served = serve(&archiver, "json", &query(&[PV], 0, 1_000)).await;
    let report = served.report();
    assert_eq!(served.values_for(PV).len(), 10);
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(report.warnings[0], ArchiverError::Source { .. }));
    assert_eq!(report.failed_count(), 0);
}

#[tokio::test]
async fn mid_stream_failure_keeps_earlier_output() {
    let archiver = two_stores(
        MockSource::new().with(
            PV,
            SourceBehavior::FailAfter(ramp(0..5), ArchiverError::source(STS, "truncated file")),
        ),
        MockSource::new().with(PV, SourceBehavior::Events(ramp(0..10))),
    );

    let served = serve(&archiver, "json", &query(&[PV], 0, 1_000)).await;
    let report = served.report();
    let ts: Vec<i64> = served.values_for(PV).iter().map(|v| v.0).collect();
    assert_eq!(ts, (0..10).collect::<Vec<_>>());
    assert_eq!(report.stats.emitted, 10);
    // 0..4 are older than the last emitted event, 4 is an exact duplicate.
    assert_eq!(report.stats.skipped, 5);
    assert_eq!(report.stats.compared, 1);
    assert_eq!(report.warnings.len(), 1);
}

#[tokio::test]
async fn stream_with_wrong_sample_type_is_skipped() {
    let archiver = two_stores(
        MockSource::new().with(PV, SourceBehavior::Events(ramp(0..5))),
        MockSource::new()
            .reporting(SampleType::ScalarInt)
            .with(PV, SourceBehavior::Events(ramp(5..10))),
    );

    let served = serve(&archiver, "json", &query(&[PV], 0, 1_000)).await;
    let report = served.report();
    assert_eq!(served.values_for(PV).len(), 5);
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        report.warnings[0],
        ArchiverError::MismatchedType { .. }
    ));
    assert_eq!(report.warnings[0].status_code(), 500);
}

#[tokio::test]
async fn unregistered_source_fails_only_its_unit() {
    let registry =
        MockRegistry::new().with(STS, Arc::new(MockSource::new().with(PV, SourceBehavior::Events(ramp(0..3)))));
    let archiver = archiver(directory().with_descriptor(desc(PV, &[STS, MTS])), registry);

    let served = serve(&archiver, "json", &query(&[PV], 0, 1_000)).await;
    let report = served.report();
    assert_eq!(served.values_for(PV).len(), 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].status_code(), 502);
}
