use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dashlink_core::Config;
use dashlink_transport::{http_client, ReqwestEngine, TungsteniteConnector};
use tracing::info;

use crate::{access_log, api, AppState};

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpConfigError {
    #[error("invalid bind address: {0}")]
    InvalidBind(String),
}

pub(crate) struct HttpConfig {
    pub addr: SocketAddr,
    pub concurrency_limit: usize,
}

pub(crate) fn http_config(cfg: &Config) -> Result<HttpConfig, HttpConfigError> {
    let bind = cfg.bind_addr();
    let addr = bind
        .parse()
        .map_err(|_| HttpConfigError::InvalidBind(bind.clone()))?;
    Ok(HttpConfig {
        addr,
        concurrency_limit: cfg.concurrency_limit(),
    })
}

pub(crate) fn build_state(cfg: &Config) -> anyhow::Result<AppState> {
    let origin = cfg.engine_origin()?;
    let profile = cfg.profile();
    let engine = ReqwestEngine::new(
        http_client::client_with_timeout(cfg.engine_timeout()).context("building engine client")?,
    );
    let forward = http_client::builder()
        .build()
        .context("building passthrough client")?;
    info!(
        origin = %origin,
        profile = %profile.name,
        selector = ?profile.selector,
        feed = ?profile.connection_feed,
        "engine bridge configured"
    );
    Ok(AppState::new(
        origin,
        profile,
        Arc::new(engine),
        Arc::new(TungsteniteConnector),
        forward,
    ))
}

pub(crate) fn attach_http_layers(
    router: axum::Router<()>,
    concurrency_limit: usize,
) -> axum::Router<()> {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
}

pub(crate) fn attach_global_layers(router: axum::Router<()>) -> axum::Router<()> {
    router.layer(axum::middleware::from_fn(access_log::access_log_mw))
}

pub(crate) fn build_app(state: AppState, concurrency_limit: usize) -> axum::Router<()> {
    attach_global_layers(attach_http_layers(api::router(state), concurrency_limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashlink_core::config::parse_config;

    #[test]
    fn http_config_uses_config_values() {
        let cfg = parse_config("[server]\nbind = \"0.0.0.0\"\nport = 9191\nconcurrency_limit = 8\n")
            .expect("config");
        let http = http_config(&cfg).expect("http config");
        assert_eq!(http.addr, "0.0.0.0:9191".parse::<SocketAddr>().expect("addr"));
        assert_eq!(http.concurrency_limit, 8);
    }

    #[test]
    fn bad_bind_is_rejected() {
        let cfg = parse_config("[server]\nbind = \"not an ip\"\n").expect("config");
        assert!(matches!(
            http_config(&cfg),
            Err(HttpConfigError::InvalidBind(_))
        ));
    }

    #[test]
    fn state_builds_from_defaults() {
        let state = build_state(&Config::default()).expect("state");
        assert_eq!(state.origin().as_str(), "http://127.0.0.1:9999");
        assert_eq!(state.requests().profile().rule_label, "Engine");
    }
}
