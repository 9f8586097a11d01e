use std::sync::Arc;

use httpmock::prelude::*;
use pvarch::{NodeInfo, PvDisposition};
use pvarch_mock::{MockDirectory, MockRegistry, MockSource, SourceBehavior, node};

use crate::helpers::{LOCAL, STS, archiver, builder, desc, directory, query, ramp, serve, with_param};

#[tokio::test]
async fn first_appliance_that_archives_the_pv_serves_it() {
    let server = MockServer::start_async().await;
    let no = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/a/bpl/areWeArchivingPV")
                .query_param("pv", "EXT:PV");
            then.status(200).json_body(serde_json::json!({ "status": false }));
        })
        .await;
    let yes = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/b/bpl/areWeArchivingPV")
                .query_param("pv", "EXT:PV");
            then.status(200).json_body(serde_json::json!({ "status": "true" }));
        })
        .await;
    let data = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/b/data/getData.csv")
                .query_param("pv", "EXT:PV");
            then.status(200)
                .header("Content-Type", "text/csv")
                .body("1,2\n3,4\n");
        })
        .await;

    let directory = directory()
        .with_external(&server.url("/a"))
        .with_external(&server.url("/b"));
    let archiver = archiver(directory, MockRegistry::new());

    let served = serve(&archiver, "csv", &query(&["EXT:PV"], 0, 1_000)).await;
    no.assert_async().await;
    yes.assert_async().await;
    data.assert_async().await;
    assert_eq!(served.relay.body, b"1,2\n3,4\n");
    assert_eq!(
        served.report().pvs[0].disposition,
        PvDisposition::Proxied {
            target: server.url("/b")
        }
    );
}

#[tokio::test]
async fn failing_appliance_is_skipped_during_lookup() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/down/bpl/areWeArchivingPV");
            then.status(500);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/up/bpl/areWeArchivingPV")
                .query_param("pv", "EXT:PV");
            then.status(200).json_body(serde_json::json!({ "status": true }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/up/data/getData.json");
            then.status(200).body("[]");
        })
        .await;

    let directory = directory()
        .with_external(&server.url("/down"))
        .with_external(&server.url("/up"));
    let archiver = archiver(directory, MockRegistry::new());

    let served = serve(&archiver, "json", &query(&["EXT:PV"], 0, 1_000)).await;
    assert_eq!(
        served.report().pvs[0].disposition,
        PvDisposition::Proxied {
            target: server.url("/up")
        }
    );
}

#[tokio::test]
async fn external_lookup_can_be_disabled() {
    let directory = directory().with_external("http://127.0.0.1:9/never");
    let archiver = builder(directory, MockRegistry::new())
        .lookup_external_servers(false)
        .build()
        .unwrap();
    let served = serve(&archiver, "json", &query(&["EXT:PV"], 0, 1_000)).await;
    assert_eq!(served.err().status_code(), 404);
}

#[tokio::test]
async fn latest_metadata_is_merged_into_the_header() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/engine/getMetadata")
                .query_param("pv", "SIM:PV1");
            then.status(200)
                .json_body(serde_json::json!({ "EGU": "mm", "PREC": "3", "HIHI": 5 }));
        })
        .await;

    let local = NodeInfo {
        identity: LOCAL.to_string(),
        engine_url: server.url("/engine"),
        retrieval_url: server.url("/retrieval"),
    };
    let sts = MockSource::new().with("SIM:PV1", SourceBehavior::Events(ramp(0..2)));
    let archiver = archiver(
        MockDirectory::new(local).with_descriptor(desc("SIM:PV1", &[STS])),
        MockRegistry::new().with(STS, Arc::new(sts)),
    );

    let q = with_param(query(&["SIM:PV1"], 0, 1_000), "fetchLatestMetadata", "true");
    let served = serve(&archiver, "json", &q).await;
    let header = served.sink.header_for("SIM:PV1").unwrap();
    assert_eq!(header.headers.get("EGU").map(String::as_str), Some("mm"));
    assert_eq!(header.headers.get("HIHI").map(String::as_str), Some("5"));
    assert_eq!(served.values_for("SIM:PV1").len(), 2);
}

#[tokio::test]
async fn metadata_failure_is_ignored() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/engine/getMetadata");
            then.status(503);
        })
        .await;

    let local = NodeInfo {
        engine_url: server.url("/engine"),
        ..node(LOCAL)
    };
    let sts = MockSource::new().with("SIM:PV1", SourceBehavior::Events(ramp(0..2)));
    let archiver = archiver(
        MockDirectory::new(local).with_descriptor(desc("SIM:PV1", &[STS])),
        MockRegistry::new().with(STS, Arc::new(sts)),
    );

    let q = with_param(query(&["SIM:PV1"], 0, 1_000), "fetchLatestMetadata", "true");
    let served = serve(&archiver, "json", &q).await;
    assert!(served.sink.header_for("SIM:PV1").unwrap().headers.is_empty());
    assert_eq!(served.values_for("SIM:PV1").len(), 2);
}
