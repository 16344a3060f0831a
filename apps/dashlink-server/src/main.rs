use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info};

mod access_log;
mod api;
mod app_state;
mod bootstrap;
mod responses;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dashlink_otel::init();

    let cfg = dashlink_core::config::load_effective().context("loading configuration")?;
    let http_cfg = bootstrap::http_config(&cfg)?;
    let state = bootstrap::build_state(&cfg)?;
    let app = bootstrap::build_app(state, http_cfg.concurrency_limit);

    let listener = tokio::net::TcpListener::bind(http_cfg.addr)
        .await
        .with_context(|| format!("binding {}", http_cfg.addr))?;
    info!(addr = %http_cfg.addr, "dashboard API listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(%err, "SIGTERM handler unavailable; waiting for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
