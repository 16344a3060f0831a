//! Dashboard API payload shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub download_total: u64,
    pub upload_total: u64,
    pub connections: Vec<DashboardConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConnection {
    pub id: String,
    pub upload: u64,
    pub download: u64,
    pub start: String,
    /// Outermost component first.
    pub chains: Vec<String>,
    pub rule: String,
    pub rule_payload: String,
    pub metadata: ConnectionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub network: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "sourceIP")]
    pub source_ip: String,
    #[serde(rename = "sourcePort")]
    pub source_port: String,
    #[serde(rename = "destinationIP")]
    pub destination_ip: String,
    #[serde(rename = "destinationPort")]
    pub destination_port: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub history: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
}

impl ProxyDescriptor {
    pub fn leaf(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            history: Vec::new(),
            all: None,
            now: None,
        }
    }
}

pub const SELECTOR_KIND: &str = "Selector";

pub type ProxySet = BTreeMap<String, ProxyDescriptor>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyProvider {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub vehicle_type: String,
    pub proxies: Vec<ProxyDescriptor>,
}

impl ProxyProvider {
    pub fn compatible(name: impl Into<String>, proxies: Vec<ProxyDescriptor>) -> Self {
        Self {
            name: name.into(),
            kind: "Proxy".into(),
            vehicle_type: "Compatible".into(),
            proxies,
        }
    }
}

/// Dashboard log levels, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    /// Map an engine (tracing) level name; unknown names are treated as info.
    pub fn from_engine(level: &str) -> Self {
        match level.trim().to_ascii_uppercase().as_str() {
            "ERROR" => LogLevel::Error,
            "WARN" | "WARNING" => LogLevel::Warning,
            "DEBUG" | "TRACE" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    /// Parse the dashboard's `level` query value.
    pub fn from_query(level: &str) -> Option<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "silent" => Some(LogLevel::Silent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardLog {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub payload: String,
}
