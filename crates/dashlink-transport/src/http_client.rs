use std::time::Duration;

use async_trait::async_trait;
use dashlink_core::{BridgeError, EngineClient, EngineRequest, Method, Origin, Result};
use serde_json::Value;
use tracing::debug;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

fn connect_timeout() -> Duration {
    Duration::from_secs(env_u64("DASHLINK_HTTP_CONNECT_TIMEOUT_SECS", 3).max(1))
}

fn keepalive() -> Duration {
    Duration::from_secs(env_u64("DASHLINK_HTTP_TCP_KEEPALIVE_SECS", 60).max(1))
}

fn pool_idle() -> Duration {
    Duration::from_secs(env_u64("DASHLINK_HTTP_POOL_IDLE_SECS", 90).max(1))
}

fn user_agent() -> String {
    format!("dashlink/{}", env!("CARGO_PKG_VERSION"))
}

/// Base client builder with harmonized defaults. Apply per-call `.timeout(...)` as needed.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(connect_timeout())
        .tcp_keepalive(keepalive())
        .pool_idle_timeout(pool_idle())
}

pub fn client_with_timeout(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(builder().timeout(timeout).build()?)
}

fn method(m: Method) -> reqwest::Method {
    match m {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn transport_error(err: reqwest::Error) -> BridgeError {
    BridgeError::Backend {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

/// Engine REST calls over a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestEngine {
    client: reqwest::Client,
}

impl ReqwestEngine {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EngineClient for ReqwestEngine {
    async fn call(&self, origin: &Origin, request: EngineRequest) -> Result<Value> {
        let url = origin.http_url(&request.path, &request.query)?;
        debug!(method = %request.method, %url, "engine call");
        let mut builder = self.client.request(method(request.method), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(BridgeError::Backend {
                status: Some(status.as_u16()),
                message: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(BridgeError::decode)
    }
}
