//! One-shot Dashboard API calls answered from the engine's REST surface.
//!
//! Routing is an ordered table: the first entry whose method and path pattern
//! match wins, so more specific patterns must be declared first.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::{Component, ConfigDocument, DelayReport};
use crate::error::{BridgeError, Result};
use crate::host::{EngineClient, EngineRequest, Method, Origin};
use crate::profile::{ApiProfile, MutationBody, SelectorMode};
use crate::translate;

/// A dashboard call as the host received it.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub body: Option<Value>,
}

impl DashboardRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(Value),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Handled(Reply),
    /// No route claimed the call; the host delegates it unchanged.
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    DeleteConnection,
    DeleteConnections,
    ListConnections,
    ReadSettings,
    WriteSettings,
    Rules,
    Providers,
    Delay,
    Select,
    Proxy,
    Proxies,
}

/// One entry of the route table.
#[derive(Debug, Clone, Copy)]
struct RouteSpec {
    methods: &'static [Method],
    /// Path pattern; `{}` matches exactly one segment.
    pattern: &'static str,
    handler: Handler,
}

impl RouteSpec {
    const fn new(methods: &'static [Method], pattern: &'static str, handler: Handler) -> Self {
        Self {
            methods,
            pattern,
            handler,
        }
    }

    fn capture(&self, method: Method, path: &str) -> Option<Vec<String>> {
        if !self.methods.contains(&method) {
            return None;
        }
        let mut want = self.pattern.trim_matches('/').split('/');
        let mut have = path.trim_matches('/').split('/');
        let mut captures = Vec::new();
        loop {
            match (want.next(), have.next()) {
                (None, None) => return Some(captures),
                (Some("{}"), Some(seg)) if !seg.is_empty() => {
                    captures.push(percent_decode_str(seg).decode_utf8_lossy().into_owned());
                }
                (Some(lit), Some(seg)) if lit == seg => {}
                _ => return None,
            }
        }
    }
}

static ROUTES: Lazy<Vec<RouteSpec>> = Lazy::new(|| {
    use Handler::*;
    use Method::{Delete, Get, Patch, Put};
    vec![
        RouteSpec::new(&[Delete], "/connections/{}", DeleteConnection),
        RouteSpec::new(&[Delete], "/connections", DeleteConnections),
        RouteSpec::new(&[Get], "/connections", ListConnections),
        RouteSpec::new(&[Get], "/configs", ReadSettings),
        RouteSpec::new(&[Patch, Put], "/configs", WriteSettings),
        RouteSpec::new(&[Get], "/rules", Rules),
        RouteSpec::new(&[Get], "/providers/proxies", Providers),
        RouteSpec::new(&[Get], "/proxies/{}/delay", Delay),
        RouteSpec::new(&[Put], "/proxies/{}", Select),
        RouteSpec::new(&[Get], "/proxies/{}", Proxy),
        RouteSpec::new(&[Get], "/proxies", Proxies),
    ]
});

fn find_route(method: Method, path: &str) -> Option<(Handler, Vec<String>)> {
    ROUTES
        .iter()
        .find_map(|route| route.capture(method, path).map(|c| (route.handler, c)))
}

/// Last component table fetched per engine origin.
#[derive(Debug, Default)]
pub struct ConfigCache {
    entries: Mutex<HashMap<Origin, ConfigDocument>>,
}

impl ConfigCache {
    pub fn get(&self, origin: &Origin) -> Option<ConfigDocument> {
        self.entries.lock().get(origin).cloned()
    }

    pub fn put(&self, origin: &Origin, config: ConfigDocument) {
        self.entries.lock().insert(origin.clone(), config);
    }

    fn record_selection(&self, origin: &Origin, selector: &str, value: Value) {
        if let Some(Component::Select { selected, .. }) = self
            .entries
            .lock()
            .get_mut(origin)
            .and_then(|cfg| cfg.components.get_mut(selector))
        {
            *selected = value;
        }
    }
}

/// Canned settings for `GET /configs`; the engine has no equivalent.
pub fn dashboard_settings() -> Value {
    json!({
        "port": 0,
        "socks-port": 0,
        "redir-port": 0,
        "tproxy-port": 0,
        "mixed-port": 114514,
        "authentication": [],
        "allow-lan": false,
        "bind-address": "*",
        "mode": "rule",
        "log-level": "silent",
        "ipv6": false
    })
}

pub fn dashboard_rules(rule_label: &str) -> Value {
    json!({
        "rules": [{
            "type": "Match",
            "payload": "rules are not supported",
            "proxy": rule_label
        }]
    })
}

pub struct RequestRouter {
    profile: Arc<ApiProfile>,
    client: Arc<dyn EngineClient>,
    cache: ConfigCache,
}

impl RequestRouter {
    pub fn new(profile: Arc<ApiProfile>, client: Arc<dyn EngineClient>) -> Self {
        Self {
            profile,
            client,
            cache: ConfigCache::default(),
        }
    }

    pub fn profile(&self) -> &ApiProfile {
        &self.profile
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Whether a call would be answered here rather than delegated.
    pub fn claims(&self, method: Method, path: &str) -> bool {
        find_route(method, path).is_some()
    }

    pub async fn route(&self, origin: &Origin, request: &DashboardRequest) -> Result<Routed> {
        let Some((handler, captures)) = find_route(request.method, &request.path) else {
            return Ok(Routed::Passthrough);
        };
        debug!(
            origin = %origin,
            method = %request.method,
            path = %request.path,
            ?handler,
            "dashboard call rewritten"
        );
        let arg = captures.into_iter().next().unwrap_or_default();
        let reply = match handler {
            Handler::DeleteConnection => {
                let path = self.profile.paths.connection_item(&arg);
                self.client.call(origin, EngineRequest::delete(path)).await?;
                Reply::Empty
            }
            Handler::DeleteConnections => {
                let path = self.profile.paths.connection.clone();
                self.client.call(origin, EngineRequest::delete(path)).await?;
                Reply::Empty
            }
            Handler::ListConnections => {
                let path = self.profile.paths.connection.clone();
                let document = self.client.call(origin, EngineRequest::get(path)).await?;
                let snapshot = translate::document_to_dashboard(&self.profile, &document)?;
                Reply::Json(serde_json::to_value(snapshot)?)
            }
            Handler::ReadSettings => Reply::Json(dashboard_settings()),
            Handler::WriteSettings => Reply::Empty,
            Handler::Rules => Reply::Json(dashboard_rules(&self.profile.rule_label)),
            Handler::Providers => {
                let config = self.fetch_config(origin).await?;
                let providers = translate::config_to_providers(&self.profile, &config);
                Reply::Json(json!({ "providers": providers }))
            }
            Handler::Delay => Reply::Json(self.delay(origin, &arg, request.query.as_deref()).await?),
            Handler::Select => {
                self.select(origin, &arg, request.body.as_ref()).await?;
                Reply::Empty
            }
            Handler::Proxy => {
                let config = self.fetch_config(origin).await?;
                let component = config
                    .get(&arg)
                    .ok_or_else(|| BridgeError::NotFound(format!("proxy {arg}")))?;
                let descriptor = translate::component_to_proxy(&self.profile, &arg, component);
                Reply::Json(serde_json::to_value(descriptor)?)
            }
            Handler::Proxies => {
                let config = self.fetch_config(origin).await?;
                let proxies = translate::config_to_proxies(&self.profile, &config);
                Reply::Json(json!({ "proxies": proxies }))
            }
        };
        Ok(Routed::Handled(reply))
    }

    /// Fetch the component table and refresh the origin's cache entry.
    pub async fn fetch_config(&self, origin: &Origin) -> Result<ConfigDocument> {
        let raw = self
            .client
            .call(origin, EngineRequest::get(self.profile.paths.config.clone()))
            .await?;
        let config = ConfigDocument::from_value(&raw)?;
        self.cache.put(origin, config.clone());
        Ok(config)
    }

    async fn delay(&self, origin: &Origin, name: &str, query: Option<&str>) -> Result<Value> {
        let pairs: Vec<(String, String)> = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let request = EngineRequest::get(self.profile.paths.net_delay(name)).with_query(pairs);
        let report = DelayReport::deserialize(self.client.call(origin, request).await?)?;
        match report.response {
            Some(delay) => Ok(json!({ "delay": delay })),
            None => Err(BridgeError::backend(format!("delay check for {name} timed out"))),
        }
    }

    async fn select(&self, origin: &Origin, selector: &str, body: Option<&Value>) -> Result<()> {
        let candidate = body
            .and_then(|b| b.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::MissingField("name".into()))?
            .to_string();
        let config = match self.cache.get(origin) {
            Some(config) => config,
            None => self.fetch_config(origin).await?,
        };
        let list = match config.get(selector) {
            Some(Component::Select { list, .. }) => list,
            Some(_) => return Err(BridgeError::NotSelectable(selector.to_string())),
            None => return Err(BridgeError::NotFound(format!("proxy {selector}"))),
        };
        let value = match self.profile.selector {
            SelectorMode::Index => {
                let index = list.iter().position(|c| *c == candidate).ok_or_else(|| {
                    BridgeError::UnknownCandidate {
                        selector: selector.to_string(),
                        candidate: candidate.clone(),
                    }
                })?;
                json!(index)
            }
            SelectorMode::Name => Value::String(candidate.clone()),
        };
        let payload = match self.profile.mutation_body {
            MutationBody::Wrapped => json!({ "selected": value }),
            MutationBody::Bare => value.clone(),
        };
        self.client
            .call(
                origin,
                EngineRequest::post(self.profile.paths.net_item(selector), payload),
            )
            .await?;
        self.cache.record_selection(origin, selector, value);
        info!(origin = %origin, selector, candidate = %candidate, "selector switched");
        Ok(())
    }
}
