//! Capabilities the hosting environment hands to the translation engine.
//!
//! The engine never opens sockets itself: one-shot engine calls go through an
//! [`EngineClient`], streaming channels through a [`ChannelConnector`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use url::Url;

use crate::error::{BridgeError, Result};

/// Scheme, host and port of an engine instance, e.g. `http://127.0.0.1:9999`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(String);

impl Origin {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|err| BridgeError::InvalidAddress(format!("{raw}: {err}")))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(BridgeError::InvalidAddress(format!(
                    "{raw}: unsupported scheme {other}"
                )))
            }
        }
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(BridgeError::InvalidAddress(raw.to_string()));
        }
        Ok(Origin(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn join(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.0, path))
            .map_err(|err| BridgeError::InvalidAddress(format!("{}{path}: {err}", self.0)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Request URL for a one-shot engine call.
    pub fn http_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self.join(path, query)?;
        let scheme = match url.scheme() {
            "ws" => "http",
            "wss" => "https",
            other => other,
        }
        .to_string();
        url.set_scheme(&scheme)
            .map_err(|_| BridgeError::InvalidAddress(url.to_string()))?;
        Ok(url)
    }

    /// Channel URL for an engine stream.
    pub fn ws_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self.join(path, query)?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => other,
        }
        .to_string();
        url.set_scheme(&scheme)
            .map_err(|_| BridgeError::InvalidAddress(url.to_string()))?;
        Ok(url)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("unsupported method {other}")),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call against the engine's REST surface.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl EngineRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Issue one call. A successful empty response comes back as `Value::Null`.
    async fn call(&self, origin: &Origin, request: EngineRequest) -> Result<Value>;
}

/// Inbound text frames of an engine channel.
pub type MessageStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<MessageStream>;
}
