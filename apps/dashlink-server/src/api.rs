//! Dashboard-facing surface: every call lands in one fallback handler that
//! offers it to the core routers and delegates whatever they do not claim.

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, HeaderValue, Method as HttpMethod, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use dashlink_core::{BridgeError, DashboardRequest, Method, MessageEvent, Routed, StreamSession};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{responses, AppState};

pub(crate) fn router(state: AppState) -> Router {
    Router::new().fallback(dashboard).with_state(state)
}

async fn dashboard(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Ok(ws) = ws {
        return open_stream(state, ws, &uri);
    }
    let Ok(core_method) = method.as_str().parse::<Method>() else {
        return forward(&state, method, &uri, &headers, body).await;
    };
    let mut request = DashboardRequest::new(core_method, uri.path());
    if let Some(query) = uri.query() {
        request = request.with_query(query);
    }
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => request = request.with_body(value),
            Err(err) if state.requests().claims(core_method, uri.path()) => {
                warn!(method = %request.method, path = %request.path, %err, "undecodable body");
                return responses::bridge_error(&BridgeError::InvalidBody(err.to_string()));
            }
            Err(_) => return forward(&state, method, &uri, &headers, body).await,
        }
    }
    match state.requests().route(state.origin(), &request).await {
        Ok(Routed::Handled(reply)) => responses::reply(reply),
        Ok(Routed::Passthrough) => forward(&state, method, &uri, &headers, body).await,
        Err(err) => {
            warn!(method = %request.method, path = %request.path, %err, "dashboard call failed");
            responses::bridge_error(&err)
        }
    }
}

fn open_stream(state: AppState, ws: WebSocketUpgrade, uri: &Uri) -> Response {
    let session = match StreamSession::open(state.streams(), state.origin(), uri.path(), uri.query())
    {
        Ok(session) => session,
        Err(err) => return responses::bridge_error(&err),
    };
    ws.on_upgrade(move |socket| serve_stream(state, session, socket))
}

async fn serve_stream(state: AppState, session: StreamSession, socket: WebSocket) {
    let (mut sink, mut inbound) = socket.split();
    let (tx, mut rx) = mpsc::channel::<MessageEvent>(64);
    let deliver = move |event: MessageEvent| {
        let tx = tx.clone();
        async move { tx.send(event).await.is_ok() }
    };
    let pump = session.pump(state.origin(), state.client(), state.connector(), deliver);
    let writer = async {
        while let Some(event) = rx.recv().await {
            if sink.send(Message::Text(event.data.into())).await.is_err() {
                break;
            }
        }
    };
    let client_gone = async {
        while let Some(Ok(frame)) = inbound.next().await {
            if matches!(frame, Message::Close(_)) {
                break;
            }
        }
    };
    tokio::select! {
        result = pump => {
            if let Err(err) = result {
                warn!(session = %session.id(), %err, "engine stream ended");
            }
        }
        _ = writer => {}
        _ = client_gone => {}
    }
    info!(session = %session.id(), "dashboard stream closed");
}

/// Delegate a call to the engine origin unchanged.
async fn forward(
    state: &AppState,
    method: HttpMethod,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let target = format!(
        "{}{}",
        state.origin(),
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );
    let mut builder = state.forward().request(method, &target).body(body);
    for name in [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT] {
        if let Some(value) = headers.get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    let resp = match builder.send().await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(%target, %err, "passthrough failed");
            return responses::bridge_error(&BridgeError::backend(err.to_string()));
        }
    };
    let status = resp.status();
    let content_type = resp.headers().get(header::CONTENT_TYPE).cloned();
    match resp.bytes().await {
        Ok(bytes) => {
            let mut out = (status, bytes).into_response();
            if let Some(ct) = content_type {
                out.headers_mut().insert(header::CONTENT_TYPE, ct);
            }
            out
        }
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
            err.to_string(),
        )
            .into_response(),
    }
}
