use std::sync::Arc;

use httpmock::prelude::*;
use pvarch::{ArchiverError, NodeInfo, PvDisposition, PvTypeDescriptor};
use pvarch_mock::{MockDirectory, MockRegistry, MockSource, SourceBehavior, node};

use crate::helpers::{LOCAL, REMOTE, STS, archiver, desc, query, ramp, serve, with_param};

fn remote_node(server: &MockServer) -> NodeInfo {
    NodeInfo {
        identity: REMOTE.to_string(),
        engine_url: server.url("/engine"),
        retrieval_url: server.url("/retrieval"),
    }
}

fn remote_desc(pv: &str) -> PvTypeDescriptor {
    PvTypeDescriptor::scalar_double(pv, REMOTE, vec![STS.to_string()])
}

#[tokio::test]
async fn remote_pvs_are_relayed_byte_for_byte() {
    let server = MockServer::start_async().await;
    let body: &[u8] = b"\x01\x02binary-pb-payload\n\xff";
    let upstream = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/retrieval/data/getData.raw")
                .query_param("pv", "SIM:R1")
                .query_param("pv", "SIM:R2")
                .query_param("donotchunk", "true");
            then.status(200)
                .header("Content-Type", "application/x-protobuf")
                .header("X-Upstream-Only", "secret")
                .body(body);
        })
        .await;

    let local_source = Arc::new(MockSource::new().with("SIM:R1", SourceBehavior::Events(ramp(0..5))));
    let directory = MockDirectory::new(node(LOCAL))
        .with_node(remote_node(&server))
        .with_descriptor(remote_desc("SIM:R1"))
        .with_descriptor(remote_desc("SIM:R2"));
    let archiver = archiver(
        directory,
        MockRegistry::new().with(STS, Arc::clone(&local_source)),
    );

    let q = with_param(query(&["SIM:R1", "SIM:R2"], 0, 1_000), "donotchunk", "true");
    let served = serve(&archiver, "raw", &q).await;
    let report = served.report();

    upstream.assert_async().await;
    assert_eq!(served.relay.body, body);
    assert!(
        served
            .relay
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/x-protobuf")
    );
    assert!(
        !served
            .relay
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("X-Upstream-Only"))
    );

    // Nothing was merged locally.
    assert!(served.sink.records.is_empty());
    assert_eq!(local_source.calls(), 0);
    assert_eq!(report.stats.emitted, 0);
    for outcome in &report.pvs {
        assert_eq!(
            outcome.disposition,
            PvDisposition::Proxied {
                target: server.url("/retrieval")
            }
        );
    }
}

#[tokio::test]
async fn upstream_error_fails_only_the_proxied_pvs() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/retrieval/data/getData.json");
            then.status(500).body("store offline");
        })
        .await;

    let sts = MockSource::new().with("SIM:LOCAL", SourceBehavior::Events(ramp(0..3)));
    let directory = MockDirectory::new(node(LOCAL))
        .with_node(remote_node(&server))
        .with_descriptor(remote_desc("SIM:R1"))
        .with_descriptor(desc("SIM:LOCAL", &[STS]));
    let archiver = archiver(directory, MockRegistry::new().with(STS, Arc::new(sts)));

    let served = serve(&archiver, "json", &query(&["SIM:R1", "SIM:LOCAL"], 0, 1_000)).await;
    let report = served.report();

    let PvDisposition::Failed(ArchiverError::Proxy { status, body, .. }) = &report.pvs[0].disposition
    else {
        panic!("expected proxy failure, got {:?}", report.pvs[0]);
    };
    assert_eq!(*status, 500);
    assert_eq!(body, "store offline");
    assert_eq!(served.values_for("SIM:LOCAL").len(), 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].status_code(), 500);
}

#[tokio::test]
async fn unknown_owner_is_not_found() {
    let directory = MockDirectory::new(node(LOCAL)).with_descriptor(remote_desc("SIM:R1"));
    let archiver = archiver(directory, MockRegistry::new());
    let served = serve(&archiver, "json", &query(&["SIM:R1"], 0, 1_000)).await;
    assert_eq!(served.err().status_code(), 404);
}

#[tokio::test]
async fn inline_processor_travels_with_the_proxied_pv() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/retrieval/data/getData.json")
                .query_param("pv", "mean_600(SIM:R1)");
            then.status(200).body("[]");
        })
        .await;

    let directory = MockDirectory::new(node(LOCAL))
        .with_node(remote_node(&server))
        .with_descriptor(remote_desc("SIM:R1"));
    let archiver = archiver(directory, MockRegistry::new());

    let served = serve(&archiver, "json", &query(&["mean_600(SIM:R1)"], 0, 1_000)).await;
    upstream.assert_async().await;
    assert_eq!(served.relay.body, b"[]");

    let report = served.report();
    assert_eq!(report.pvs[0].pv, "SIM:R1");
    assert_eq!(
        report.pvs[0].disposition,
        PvDisposition::Proxied {
            target: server.url("/retrieval")
        }
    );
}
