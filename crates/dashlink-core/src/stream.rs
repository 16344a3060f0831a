//! Dashboard stream paths rewritten onto engine streams, with per-session
//! reconciliation state.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::dashboard::LogLevel;
use crate::delta::MetricsDeltaTracker;
use crate::engine::{document_totals, EngineLogRecord};
use crate::error::{BridgeError, Result};
use crate::host::{ChannelConnector, EngineClient, EngineRequest, Origin};
use crate::profile::{ApiProfile, ConnectionFeed, DocumentShape};
use crate::reconcile::{PatchReconciler, StreamUpdate};
use crate::translate;

/// Semantic classification of a rewritten stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTag {
    Connections,
    Traffic,
    Logs,
}

impl StreamTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamTag::Connections => "connections",
            StreamTag::Traffic => "traffic",
            StreamTag::Logs => "logs",
        }
    }

    /// Tag for a dashboard stream path, if the path is one that gets rewritten.
    pub fn from_dashboard_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/connections" => Some(StreamTag::Connections),
            "/traffic" => Some(StreamTag::Traffic),
            "/logs" => Some(StreamTag::Logs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a session's inbound messages come from.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamTarget {
    /// Engine streaming channel (or the original address for untagged sessions).
    Channel(Url),
    /// Periodic snapshot requests, each fed in as a full document.
    Poll {
        request: EngineRequest,
        interval: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamOpen {
    pub session: SessionId,
    pub tag: Option<StreamTag>,
    pub target: StreamTarget,
}

/// What the dashboard's message handler receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEvent {
    pub data: String,
}

#[derive(Debug, Default)]
struct SessionState {
    tag: Option<StreamTag>,
    reconciler: PatchReconciler,
    tracker: MetricsDeltaTracker,
    min_level: Option<LogLevel>,
    desynced: bool,
}

enum Inbound<'a> {
    Raw(&'a str),
    Update(StreamUpdate),
}

pub struct StreamRouter {
    profile: Arc<ApiProfile>,
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl StreamRouter {
    pub fn new(profile: Arc<ApiProfile>) -> Self {
        Self {
            profile,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn profile(&self) -> &ApiProfile {
        &self.profile
    }

    /// Engine path and query for a tag under the active profile.
    pub fn engine_route(&self, tag: StreamTag) -> (String, Vec<(String, String)>) {
        let paths = &self.profile.paths;
        let flag = |k: &str, v: &str| (k.to_string(), v.to_string());
        match tag {
            StreamTag::Connections => (
                paths.stream_connection.clone(),
                vec![flag("patch", "true")],
            ),
            StreamTag::Traffic => (
                paths.stream_connection.clone(),
                vec![flag("patch", "true"), flag("without_connections", "true")],
            ),
            StreamTag::Logs => (paths.stream_logs.clone(), Vec::new()),
        }
    }

    /// Register a new session for a dashboard stream and resolve its target.
    ///
    /// Unrecognized paths still get a session (without a tag) whose target is
    /// the original address on the engine origin; their messages pass through.
    pub fn open(&self, origin: &Origin, path: &str, query: Option<&str>) -> Result<StreamOpen> {
        let tag = StreamTag::from_dashboard_path(path);
        let target = match tag {
            None => {
                let pairs = query.map(parse_query).unwrap_or_default();
                StreamTarget::Channel(origin.ws_url(path, &pairs)?)
            }
            Some(StreamTag::Connections | StreamTag::Traffic)
                if self.profile.connection_feed == ConnectionFeed::Poll =>
            {
                StreamTarget::Poll {
                    request: EngineRequest::get(self.profile.paths.connection.clone()),
                    interval: self.profile.poll_interval,
                }
            }
            Some(tag) => {
                let (engine_path, pairs) = self.engine_route(tag);
                StreamTarget::Channel(origin.ws_url(&engine_path, &pairs)?)
            }
        };
        let min_level = match tag {
            Some(StreamTag::Logs) => query
                .map(parse_query)
                .unwrap_or_default()
                .into_iter()
                .find(|(k, _)| k == "level")
                .and_then(|(_, v)| LogLevel::from_query(&v)),
            _ => None,
        };
        let session = SessionId::generate();
        self.sessions.lock().insert(
            session,
            SessionState {
                tag,
                min_level,
                ..Default::default()
            },
        );
        info!(
            %session,
            path,
            tag = tag.map(StreamTag::as_str).unwrap_or("passthrough"),
            "stream session opened"
        );
        if self.traffic_without_totals(tag) {
            debug!(
                %session,
                profile = %self.profile.name,
                "flat connection document carries no totals; traffic samples stay at zero"
            );
        }
        Ok(StreamOpen {
            session,
            tag,
            target,
        })
    }

    fn traffic_without_totals(&self, tag: Option<StreamTag>) -> bool {
        tag == Some(StreamTag::Traffic) && self.profile.document_shape == DocumentShape::Flat
    }

    /// Translate one raw inbound message.
    ///
    /// `Ok(None)` means the message is dropped: filtered by log level, or the
    /// session already lost reconciliation.
    pub fn handle_message(&self, session: SessionId, raw: &str) -> Result<Option<MessageEvent>> {
        self.dispatch(session, Inbound::Raw(raw))
    }

    /// Feed a full snapshot obtained out of band (polled sessions).
    pub fn handle_snapshot(&self, session: SessionId, document: Value) -> Result<Option<MessageEvent>> {
        self.dispatch(session, Inbound::Update(StreamUpdate::Full(document)))
    }

    fn dispatch(&self, session: SessionId, inbound: Inbound<'_>) -> Result<Option<MessageEvent>> {
        let mut sessions = self.sessions.lock();
        let Some(state) = sessions.get_mut(&session) else {
            debug!(%session, "message for unknown session delivered unmodified");
            return Ok(passthrough(inbound));
        };
        let Some(tag) = state.tag else {
            return Ok(passthrough(inbound));
        };
        if state.desynced {
            debug!(%session, tag = tag.as_str(), "dropping message on desynchronized stream");
            return Ok(None);
        }
        let payload = match tag {
            StreamTag::Logs => {
                let Inbound::Raw(raw) = inbound else {
                    return Err(BridgeError::Decode("log streams take raw records".into()));
                };
                let record: EngineLogRecord = serde_json::from_str(raw)?;
                let event = translate::log_event(&record)?;
                match state.min_level {
                    Some(min) if event.level < min => return Ok(None),
                    _ => {}
                }
                serde_json::to_string(&event)?
            }
            StreamTag::Connections | StreamTag::Traffic => {
                let reconciled = match inbound {
                    Inbound::Raw(raw) => state.reconciler.reconcile_raw(raw),
                    Inbound::Update(update) => state.reconciler.reconcile(update),
                };
                let document = match reconciled {
                    Ok(doc) => doc,
                    Err(err) => {
                        state.desynced = true;
                        warn!(%session, tag = tag.as_str(), %err, "stream desynchronized");
                        return Err(err);
                    }
                };
                if tag == StreamTag::Connections {
                    let snapshot = translate::document_to_dashboard(&self.profile, document)?;
                    serde_json::to_string(&snapshot)?
                } else {
                    let totals = document_totals(document, self.profile.document_shape)?;
                    serde_json::to_string(&state.tracker.delta(totals))?
                }
            }
        };
        Ok(Some(MessageEvent { data: payload }))
    }

    /// Drop all state held for a session.
    pub fn close(&self, session: SessionId) -> bool {
        let removed = self.sessions.lock().remove(&session).is_some();
        if removed {
            info!(%session, "stream session closed");
        }
        removed
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

fn passthrough(inbound: Inbound<'_>) -> Option<MessageEvent> {
    let data = match inbound {
        Inbound::Raw(raw) => raw.to_string(),
        Inbound::Update(StreamUpdate::Full(doc)) => doc.to_string(),
        Inbound::Update(StreamUpdate::Patch(patch)) => {
            serde_json::to_string(&patch).unwrap_or_default()
        }
    };
    Some(MessageEvent { data })
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

/// A registered session that is closed when dropped.
pub struct StreamSession {
    router: Arc<StreamRouter>,
    open: StreamOpen,
}

impl StreamSession {
    pub fn open(
        router: Arc<StreamRouter>,
        origin: &Origin,
        path: &str,
        query: Option<&str>,
    ) -> Result<Self> {
        let open = router.open(origin, path, query)?;
        Ok(Self { router, open })
    }

    pub fn id(&self) -> SessionId {
        self.open.session
    }

    pub fn tag(&self) -> Option<StreamTag> {
        self.open.tag
    }

    pub fn target(&self) -> &StreamTarget {
        &self.open.target
    }

    pub fn handle_message(&self, raw: &str) -> Result<Option<MessageEvent>> {
        self.router.handle_message(self.open.session, raw)
    }

    pub fn handle_snapshot(&self, document: Value) -> Result<Option<MessageEvent>> {
        self.router.handle_snapshot(self.open.session, document)
    }

    /// Drive the session from its target until the source ends or `deliver`
    /// returns `false`.
    ///
    /// Per-message translation failures are logged and skipped; a failed
    /// engine round-trip or channel error ends the session with that error.
    pub async fn pump<F, Fut>(
        &self,
        origin: &Origin,
        client: &dyn EngineClient,
        connector: &dyn ChannelConnector,
        mut deliver: F,
    ) -> Result<()>
    where
        F: FnMut(MessageEvent) -> Fut,
        Fut: Future<Output = bool>,
    {
        let session = self.id();
        match self.target() {
            StreamTarget::Channel(url) => {
                let mut inbound = connector.open(url).await?;
                while let Some(frame) = inbound.next().await {
                    let raw = frame?;
                    match self.handle_message(&raw) {
                        Ok(Some(event)) => {
                            if !deliver(event).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(%session, %err, "dropping untranslatable message"),
                    }
                }
            }
            StreamTarget::Poll { request, interval } => {
                let mut ticker = tokio::time::interval(*interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let document = client.call(origin, request.clone()).await?;
                    match self.handle_snapshot(document) {
                        Ok(Some(event)) => {
                            if !deliver(event).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(%session, %err, "dropping untranslatable snapshot"),
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.router.close(self.open.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ApiProfile;
    use serde_json::json;

    fn router(profile: ApiProfile) -> StreamRouter {
        StreamRouter::new(Arc::new(profile))
    }

    fn origin() -> Origin {
        Origin::parse("http://127.0.0.1:9999").expect("origin")
    }

    #[test]
    fn connections_path_rewrites_to_patch_stream() {
        let r = router(ApiProfile::named());
        let open = r.open(&origin(), "/connections", None).expect("open");
        assert_eq!(open.tag, Some(StreamTag::Connections));
        let StreamTarget::Channel(url) = open.target else {
            panic!("expected channel target");
        };
        assert_eq!(url.as_str(), "ws://127.0.0.1:9999/api/stream/connection?patch=true");
    }

    #[test]
    fn traffic_path_requests_totals_only() {
        let r = router(ApiProfile::named());
        let open = r.open(&origin(), "/traffic", Some("token=abc")).expect("open");
        let StreamTarget::Channel(url) = open.target else {
            panic!("expected channel target");
        };
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9999/api/stream/connection?patch=true&without_connections=true"
        );
    }

    #[test]
    fn polled_profile_targets_snapshot_requests() {
        let r = router(ApiProfile::indexed());
        let open = r.open(&origin(), "/connections", None).expect("open");
        match open.target {
            StreamTarget::Poll { request, interval } => {
                assert_eq!(request.path, "/api/connection");
                assert_eq!(interval, Duration::from_secs(1));
            }
            other => panic!("unexpected target {other:?}"),
        }
        let open = r.open(&origin(), "/logs", None).expect("open");
        assert!(matches!(open.target, StreamTarget::Channel(_)));
    }

    #[test]
    fn unknown_paths_pass_through() {
        let r = router(ApiProfile::named());
        let open = r.open(&origin(), "/memory", Some("x=1")).expect("open");
        assert_eq!(open.tag, None);
        let StreamTarget::Channel(url) = &open.target else {
            panic!("expected channel target");
        };
        assert_eq!(url.as_str(), "ws://127.0.0.1:9999/memory?x=1");
        let event = r
            .handle_message(open.session, r#"{"inuse": 1}"#)
            .expect("passthrough")
            .expect("delivered");
        assert_eq!(event.data, r#"{"inuse": 1}"#);
    }

    #[test]
    fn traffic_session_emits_deltas() {
        let r = router(ApiProfile::named());
        let open = r.open(&origin(), "/traffic", None).expect("open");
        let first = r
            .handle_message(
                open.session,
                r#"{"full": {"total_upload": 100, "total_download": 50}}"#,
            )
            .expect("full")
            .expect("event");
        assert_eq!(first.data, r#"{"up":0,"down":0}"#);
        let second = r
            .handle_message(
                open.session,
                r#"{"patch": [{"op": "replace", "path": "/total_upload", "value": 130}]}"#,
            )
            .expect("patch")
            .expect("event");
        assert_eq!(second.data, r#"{"up":30,"down":0}"#);
    }

    #[test]
    fn desynchronized_session_goes_quiet() {
        let r = router(ApiProfile::named());
        let open = r.open(&origin(), "/connections", None).expect("open");
        let err = r
            .handle_message(open.session, r#"{"patch": []}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Reconciliation(_)));
        let later = r
            .handle_message(
                open.session,
                r#"{"full": {"total_upload": 0, "total_download": 0, "connections": {}}}"#,
            )
            .expect("dropped");
        assert_eq!(later, None);
    }

    #[test]
    fn logs_below_requested_level_are_filtered() {
        let r = router(ApiProfile::named());
        let open = r.open(&origin(), "/logs", Some("level=warning")).expect("open");
        let info = json!({"level": "INFO", "fields": {"message": "hi"}, "target": "t"});
        let error = json!({"level": "ERROR", "fields": {"message": "boom"}, "target": "t"});
        assert_eq!(
            r.handle_message(open.session, &info.to_string()).expect("info"),
            None
        );
        let event = r
            .handle_message(open.session, &error.to_string())
            .expect("error")
            .expect("event");
        let value: Value = serde_json::from_str(&event.data).expect("json");
        assert_eq!(value, json!({"type": "error", "payload": "t: boom 0"}));
    }

    #[test]
    fn close_removes_session_state() {
        let r = Arc::new(router(ApiProfile::named()));
        {
            let session =
                StreamSession::open(r.clone(), &origin(), "/traffic", None).expect("open");
            assert_eq!(session.tag(), Some(StreamTag::Traffic));
            assert_eq!(r.open_sessions(), 1);
        }
        assert_eq!(r.open_sessions(), 0);
    }

    #[test]
    fn sessions_do_not_share_baselines() {
        let r = router(ApiProfile::named());
        let a = r.open(&origin(), "/traffic", None).expect("a");
        let b = r.open(&origin(), "/traffic", None).expect("b");
        let full = |n: u64| format!(r#"{{"full": {{"total_upload": {n}, "total_download": 0}}}}"#);
        r.handle_message(a.session, &full(10)).expect("a1");
        r.handle_message(a.session, &full(25)).expect("a2");
        let first_b = r
            .handle_message(b.session, &full(100))
            .expect("b1")
            .expect("event");
        assert_eq!(first_b.data, r#"{"up":0,"down":0}"#);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_while(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).expect("utf8 logs")
    }

    #[test]
    fn flat_traffic_session_explains_zero_samples() {
        let flat = router(ApiProfile::indexed());
        let logs = logs_while(|| {
            flat.open(&origin(), "/traffic", None).expect("open");
        });
        assert!(logs.contains("traffic samples stay at zero"), "{logs}");

        let totals = router(ApiProfile::named());
        let logs = logs_while(|| {
            totals.open(&origin(), "/traffic", None).expect("open");
            flat.open(&origin(), "/connections", None).expect("open");
        });
        assert!(!logs.contains("traffic samples stay at zero"), "{logs}");
    }
}
