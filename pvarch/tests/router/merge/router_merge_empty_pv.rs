use std::sync::Arc;

use pvarch::{PvDisposition, SamplingMode};
use pvarch_mock::{MockRegistry, MockSource, SinkRecord, SourceBehavior};

use crate::helpers::{STS, archiver, desc, directory, query, ramp, serve};

#[tokio::test]
async fn pv_without_data_is_still_announced_once() {
    let sts = MockSource::new().with("SIM:FULL", SourceBehavior::Events(ramp(0..3)));
    let registry = MockRegistry::new().with(STS, Arc::new(sts));
    let archiver = archiver(
        directory()
            .with_descriptor(desc("SIM:EMPTY", &[STS]))
            .with_descriptor(desc("SIM:FULL", &[STS])),
        registry,
    );

    let served = serve(&archiver, "json", &query(&["SIM:EMPTY", "SIM:FULL"], 0, 1_000)).await;
    let report = served.report();

    assert_eq!(served.sink.new_pvs(), vec!["SIM:EMPTY", "SIM:FULL"]);
    assert!(served.sink.events_for("SIM:EMPTY").is_empty());
    assert_eq!(served.sink.events_for("SIM:FULL").len(), 3);
    assert_eq!(
        served
            .sink
            .records
            .iter()
            .filter(|r| matches!(r, SinkRecord::Finish))
            .count(),
        1
    );
    assert_eq!(report.pvs[0].disposition, PvDisposition::Local { units: 1 });
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn pv_with_no_units_is_still_announced_once() {
    let mut d = desc("SIM:RETIRED", &[]);
    d.sampling = SamplingMode::NotSampled;
    let archiver = archiver(directory().with_descriptor(d), MockRegistry::new());

    let served = serve(&archiver, "json", &query(&["SIM:RETIRED"], 0, 1_000)).await;
    assert_eq!(served.sink.new_pvs(), vec!["SIM:RETIRED"]);
    assert!(served.sink.finished());
    assert_eq!(
        served.report().pvs[0].disposition,
        PvDisposition::Local { units: 0 }
    );
}
