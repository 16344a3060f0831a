mod support;

use std::sync::Arc;

use dashlink_core::{
    ApiProfile, Method, StreamRouter, StreamSession, StreamTag, StreamTarget,
};
use serde_json::{json, Value};
use support::{engine_connection, origin, FakeEngine, ScriptedChannel};
use tokio::time::{timeout, Duration};

fn parse(data: &str) -> Value {
    serde_json::from_str(data).expect("event json")
}

#[tokio::test]
async fn traffic_stream_reports_deltas_in_order() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::named())));
    let channel = ScriptedChannel::new([
        r#"{"full": {"total_upload": 100, "total_download": 50}}"#,
        r#"{"patch": [{"op": "replace", "path": "/total_upload", "value": 130}]}"#,
        r#"{"patch": [{"op": "replace", "path": "/total_download", "value": 80}]}"#,
    ]);
    let engine = FakeEngine::new();
    let session = StreamSession::open(router.clone(), &origin(), "/traffic", None).expect("open");

    let mut samples = Vec::new();
    session
        .pump(&origin(), &engine, &channel, |event| {
            samples.push(parse(&event.data));
            async { true }
        })
        .await
        .expect("pump");

    assert_eq!(
        samples,
        vec![
            json!({"up": 0, "down": 0}),
            json!({"up": 30, "down": 0}),
            json!({"up": 0, "down": 30}),
        ]
    );
    assert_eq!(
        channel.opened()[0].as_str(),
        "ws://127.0.0.1:9999/api/stream/connection?patch=true&without_connections=true"
    );
}

#[tokio::test]
async fn connection_stream_rebuilds_document() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::named())));
    let full = json!({"full": {"total_upload": 100, "total_download": 50, "connections": {}}});
    let add = json!({"patch": [
        {"op": "add", "path": "/connections/c1", "value": engine_connection(&["socks5", "tls", "tcp"])},
        {"op": "replace", "path": "/total_upload", "value": 130}
    ]});
    let channel = ScriptedChannel::new([full.to_string(), add.to_string()]);
    let engine = FakeEngine::new();
    let session =
        StreamSession::open(router.clone(), &origin(), "/connections", None).expect("open");

    let mut snapshots = Vec::new();
    session
        .pump(&origin(), &engine, &channel, |event| {
            snapshots.push(parse(&event.data));
            async { true }
        })
        .await
        .expect("pump");

    assert_eq!(
        snapshots[0],
        json!({"downloadTotal": 50, "uploadTotal": 100, "connections": []})
    );
    assert_eq!(snapshots[1]["uploadTotal"], json!(130));
    let conn = &snapshots[1]["connections"][0];
    assert_eq!(conn["id"], json!("c1"));
    assert_eq!(conn["chains"], json!(["tcp", "tls"]));
    assert_eq!(conn["metadata"]["sourcePort"], json!("50000"));
}

#[tokio::test]
async fn desynchronized_stream_stops_emitting() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::named())));
    let channel = ScriptedChannel::new([
        r#"{"patch": [{"op": "replace", "path": "/total_upload", "value": 1}]}"#,
        r#"{"full": {"total_upload": 5, "total_download": 5}}"#,
    ]);
    let engine = FakeEngine::new();
    let session = StreamSession::open(router.clone(), &origin(), "/traffic", None).expect("open");

    let mut delivered = 0usize;
    session
        .pump(&origin(), &engine, &channel, |_| {
            delivered += 1;
            async { true }
        })
        .await
        .expect("transport unaffected");
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn malformed_log_records_are_skipped() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::named())));
    let channel = ScriptedChannel::new([
        json!({"level": "INFO", "fields": {}, "target": "rd"}).to_string(),
        json!({
            "level": "WARN",
            "fields": {"message": "slow", "ms": 900},
            "target": "rd::net",
            "span": {"name": "conn", "id": 7}
        })
        .to_string(),
    ]);
    let engine = FakeEngine::new();
    let session = StreamSession::open(router.clone(), &origin(), "/logs", None).expect("open");
    assert_eq!(session.tag(), Some(StreamTag::Logs));

    let mut logs = Vec::new();
    session
        .pump(&origin(), &engine, &channel, |event| {
            logs.push(parse(&event.data));
            async { true }
        })
        .await
        .expect("pump");
    assert_eq!(
        logs,
        vec![json!({"type": "warning", "payload": r#"conn{"id":7}: rd::net: slow {"ms":900}"#})]
    );
}

#[tokio::test]
async fn polled_connections_feed_snapshots() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::indexed())));
    let engine = FakeEngine::new().respond(
        Method::Get,
        "/api/connection",
        json!({"c1": engine_connection(&["local"])}),
    );
    let channel = ScriptedChannel::new(Vec::<String>::new());
    let session =
        StreamSession::open(router.clone(), &origin(), "/connections", None).expect("open");
    assert!(matches!(session.target(), StreamTarget::Poll { .. }));

    let mut snapshots = Vec::new();
    timeout(
        Duration::from_secs(5),
        session.pump(&origin(), &engine, &channel, |event| {
            snapshots.push(parse(&event.data));
            let more = snapshots.len() < 2;
            async move { more }
        }),
    )
    .await
    .expect("poll timeout")
    .expect("pump");

    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0]["uploadTotal"], json!(0));
    assert_eq!(snapshots[0]["connections"][0]["metadata"]["sourceIP"], json!("192.168.1.5"));
    assert_eq!(engine.calls().len(), 2);
    assert!(channel.opened().is_empty());
}

#[tokio::test]
async fn polled_session_ends_on_engine_failure() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::indexed())));
    let engine = FakeEngine::new();
    let channel = ScriptedChannel::new(Vec::<String>::new());
    let session =
        StreamSession::open(router.clone(), &origin(), "/traffic", None).expect("open");
    let result = session
        .pump(&origin(), &engine, &channel, |_| async { true })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn dropping_sessions_releases_state() {
    let router = Arc::new(StreamRouter::new(Arc::new(ApiProfile::named())));
    let a = StreamSession::open(router.clone(), &origin(), "/traffic", None).expect("a");
    let b = StreamSession::open(router.clone(), &origin(), "/memory", None).expect("b");
    assert_eq!(router.open_sessions(), 2);
    assert_eq!(b.tag(), None);
    drop(a);
    assert_eq!(router.open_sessions(), 1);
    drop(b);
    assert_eq!(router.open_sessions(), 0);
}
