use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;

static ENABLED: Lazy<bool> =
    Lazy::new(|| std::env::var("DASHLINK_ACCESS_LOG").ok().as_deref() == Some("1"));

pub async fn access_log_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    if !*ENABLED {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let upgrade = req.headers().contains_key(axum::http::header::UPGRADE);
    let remote = req
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip().to_string());
    let res = next.run(req).await;
    let mut obj = serde_json::json!({
        "ts": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "method": method.as_str(),
        "path": path,
        "status": res.status().as_u16(),
        "dur_ms": started.elapsed().as_millis() as u64,
        "upgrade": upgrade,
    });
    if let Some(ip) = remote {
        obj["remote"] = serde_json::Value::String(ip);
    }
    tracing::info!(
        target: dashlink_otel::ACCESS_TARGET,
        "{}",
        serde_json::to_string(&obj).unwrap_or_else(|_| "{}".into())
    );
    res
}
