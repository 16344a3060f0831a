#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashlink_core::{
    BridgeError, ChannelConnector, EngineClient, EngineRequest, MessageStream, Method, Origin,
    Result,
};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use url::Url;

pub fn origin() -> Origin {
    Origin::parse("http://127.0.0.1:9999").expect("origin")
}

/// In-memory engine answering canned responses and recording every call.
#[derive(Default)]
pub struct FakeEngine {
    responses: Mutex<HashMap<(Method, String), Value>>,
    calls: Mutex<Vec<EngineRequest>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, method: Method, path: &str, body: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method, path.to_string()), body);
        self
    }

    pub fn calls(&self) -> Vec<EngineRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn call(&self, _origin: &Origin, request: EngineRequest) -> Result<Value> {
        self.calls.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .get(&(request.method, request.path.clone()))
            .cloned()
            .ok_or(BridgeError::Backend {
                status: Some(404),
                message: format!("{} {}", request.method, request.path),
            })
    }
}

/// Connector replaying a fixed list of frames for any URL.
pub struct ScriptedChannel {
    frames: Vec<String>,
    opened: Mutex<Vec<Url>>,
}

impl ScriptedChannel {
    pub fn new<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelConnector for ScriptedChannel {
    async fn open(&self, url: &Url) -> Result<MessageStream> {
        self.opened.lock().unwrap().push(url.clone());
        Ok(stream::iter(self.frames.clone().into_iter().map(Ok)).boxed())
    }
}

pub fn engine_connection(net_list: &[&str]) -> Value {
    json!({
        "protocol": "tcp",
        "addr": "1.1.1.1:443",
        "start_time": 784887151,
        "ctx": {
            "net_list": net_list,
            "src_socket_addr": "192.168.1.5:50000",
            "source_address": "192.168.1.5:50000",
            "dest_domain": "one.one.one.one:443"
        },
        "upload": 10,
        "download": 20
    })
}

pub fn engine_config(selected: Value) -> Value {
    json!({
        "id": "cfg",
        "net": {
            "groupA": {"type": "select", "list": ["candidateX", "candidateY"], "selected": selected},
            "candidateX": {"type": "socks5"},
            "candidateY": {"type": "shadowsocks"},
            "leafNode": {"type": "trojan"}
        }
    })
}
