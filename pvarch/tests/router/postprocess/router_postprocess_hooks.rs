use std::sync::Arc;

use pvarch::{Event, SampleValue};
use pvarch_mock::{MockRegistry, MockSource, SinkRecord, SourceBehavior, ts};

use crate::helpers::{MTS, STS, archiver, desc, directory, query, ramp, serve, with_param};

const PV: &str = "SIM:PV1";

fn fixture(events: Vec<Event>) -> pvarch::Archiver {
    let sts = MockSource::new().with(PV, SourceBehavior::Events(events));
    archiver(
        directory().with_descriptor(desc(PV, &[STS])),
        MockRegistry::new().with(STS, Arc::new(sts)),
    )
}

#[tokio::test]
async fn trailer_follows_consolidated_output() {
    let archiver = fixture(ramp(0..10));
    let q = with_param(query(&[PV], 0, 1_000), "pp", "count");
    let served = serve(&archiver, "json", &q).await;

    let records = &served.sink.records;
    assert_eq!(records.len(), 4);
    assert!(matches!(&records[0], SinkRecord::NewPv(h) if h.processor == "count"));
    assert!(matches!(&records[1], SinkRecord::Consolidated(pv, events) if pv == PV && events.is_empty()));
    let SinkRecord::Trailer(pv, trailer) = &records[2] else {
        panic!("expected trailer, got {:?}", records[2]);
    };
    assert_eq!(pv, PV);
    assert_eq!(trailer.fields.get("count").map(String::as_str), Some("10"));
    assert_eq!(records[3], SinkRecord::Finish);
    assert_eq!(served.report().stats.emitted, 10);
}

#[tokio::test]
async fn consolidating_processor_sees_merged_events_only() {
    let sts = MockSource::new().with(PV, SourceBehavior::Events(ramp(0..10)));
    let mts = MockSource::new().with(PV, SourceBehavior::Events(ramp(5..20)));
    let archiver = archiver(
        directory().with_descriptor(desc(PV, &[STS, MTS])),
        MockRegistry::new()
            .with(STS, Arc::new(sts))
            .with(MTS, Arc::new(mts)),
    );

    let served = serve(&archiver, "json", &query(&["mean_10(SIM:PV1)"], 0, 1_000)).await;
    assert!(served.sink.events_for(PV).is_empty());
    let consolidated = served
        .sink
        .records
        .iter()
        .find_map(|r| match r {
            SinkRecord::Consolidated(_, events) => Some(events.clone()),
            _ => None,
        })
        .unwrap();
    let bins: Vec<(i64, SampleValue)> = consolidated
        .into_iter()
        .map(|e| (e.ts.timestamp(), e.value))
        .collect();
    assert_eq!(
        bins,
        vec![
            (0, SampleValue::Double(4.5)),
            (10, SampleValue::Double(14.5))
        ]
    );
}

#[tokio::test]
async fn use_reduced_falls_back_to_first_sample() {
    let archiver = fixture(ramp(0..2_000));
    let q = with_param(query(&[PV], 0, 10_000), "usereduced", "true");
    let served = serve(&archiver, "json", &q).await;

    assert_eq!(
        served.sink.header_for(PV).map(|h| h.processor.as_str()),
        Some("firstSample")
    );
    let kept: Vec<i64> = served.values_for(PV).iter().map(|v| v.0).collect();
    assert_eq!(kept, vec![0, 900, 1_800]);
    // The merge still saw every sample.
    assert_eq!(served.report().stats.emitted, 2_000);
}

#[tokio::test]
async fn inline_processor_beats_pp_parameter() {
    let archiver = fixture(vec![Event::new(ts(1), 1.0), Event::new(ts(2), 2.0)]);
    let q = with_param(query(&["lastSample_60(SIM:PV1)"], 0, 1_000), "pp", "count");
    let served = serve(&archiver, "json", &q).await;
    assert_eq!(
        served.sink.header_for(PV).map(|h| h.processor.as_str()),
        Some("lastSample_60")
    );
    assert!(
        !served
            .sink
            .records
            .iter()
            .any(|r| matches!(r, SinkRecord::Trailer(..)))
    );
}
