use std::sync::Arc;

use pvarch::TimeSpan;
use pvarch_mock::{MockRegistry, MockSource, SourceBehavior, ts};

use crate::helpers::{NOW, STS, archiver, desc, directory, iso, ramp, serve};

fn pairs(items: &[(&str, String)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn each_time_range_is_fetched_separately() {
    let sts = Arc::new(MockSource::new().with("SIM:PV1", SourceBehavior::Events(ramp(0..100))));
    let archiver = archiver(
        directory().with_descriptor(desc("SIM:PV1", &[STS])),
        MockRegistry::new().with(STS, Arc::clone(&sts)),
    );

    let ranges = [iso(10), iso(20), iso(50), iso(55)].join(",");
    let q = pairs(&[("pv", "SIM:PV1".to_string()), ("timeranges", ranges)]);
    let served = serve(&archiver, "json", &q).await;

    let kept: Vec<i64> = served.values_for("SIM:PV1").iter().map(|v| v.0).collect();
    let expected: Vec<i64> = (10..20).chain(50..55).collect();
    assert_eq!(kept, expected);

    let spans: Vec<TimeSpan> = sts.requests().await.into_iter().map(|(_, s)| s).collect();
    assert_eq!(
        spans,
        vec![
            TimeSpan::new(ts(10), ts(20)).unwrap(),
            TimeSpan::new(ts(50), ts(55)).unwrap()
        ]
    );
    assert_eq!(
        served.report().pvs[0].disposition,
        pvarch::PvDisposition::Local { units: 2 }
    );
}

#[tokio::test]
async fn overlapping_time_ranges_are_rejected() {
    let archiver = archiver(directory(), MockRegistry::new());
    let ranges = [iso(10), iso(30), iso(20), iso(40)].join(",");
    let q = pairs(&[("pv", "SIM:PV1".to_string()), ("timeranges", ranges)]);
    let served = serve(&archiver, "json", &q).await;
    assert_eq!(served.err().status_code(), 400);
}

#[test]
fn default_window_ends_an_hour_from_now() {
    let archiver = archiver(directory(), MockRegistry::new());
    let req = archiver
        .parse_request("json", &[("pv", "SIM:PV1")])
        .unwrap();
    let span = req.overall_span().unwrap();
    assert_eq!(span.end(), ts(NOW + 3_600));
    assert_eq!(span.start(), ts(NOW + 3_600 - 86_400));
}

#[test]
fn legacy_hints_and_flags_are_parsed() {
    let archiver = archiver(directory(), MockRegistry::new());
    let req = archiver
        .parse_request(
            "json",
            &[
                ("pv", "SIM:PV1"),
                ("ca_count", "250"),
                ("ca_how", "interpolated"),
                ("usereduced", "TRUE"),
                ("donotchunk", "1"),
                ("fetchLatestMetadata", "true"),
            ],
        )
        .unwrap();
    assert_eq!(req.legacy_count, Some(250));
    assert_eq!(req.legacy_how, 0);
    assert!(req.use_reduced);
    assert!(!req.chunked);
    assert!(req.fetch_latest_metadata);
    assert!(req.params.iter().all(|(k, _)| k != "pv"));
    assert_eq!(req.params.len(), 5);
}
