//! Engine → Dashboard schema mapping. Everything here is pure; the active
//! [`ApiProfile`] decides the version-dependent details.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::address::{parse_address, Endpoint};
use crate::dashboard::{
    ConnectionMetadata, DashboardConnection, DashboardLog, DashboardSnapshot, LogLevel,
    ProxyDescriptor, ProxyProvider, ProxySet, SELECTOR_KIND,
};
use crate::engine::{Component, ConfigDocument, ConnectionDocument, EngineConnection, EngineLogRecord};
use crate::error::{BridgeError, Result};
use crate::profile::{ApiProfile, ChainOrder, MissingSource, SelectorMode};

const UNKNOWN_KIND: &str = "Unknown";
const DEFAULT_PROVIDER: &str = "default";

/// Component kinds the dashboard knows under a different name.
const KIND_NAMES: [(&str, &str); 7] = [
    ("local", "Direct"),
    ("noop", "Reject"),
    ("shadowsocks", "Shadowsocks"),
    ("socks5", "Socks5"),
    ("http", "Http"),
    ("trojan", "Trojan"),
    ("vmess", "Vmess"),
];

/// Component names every translated proxy set must resolve.
const SENTINELS: [&str; 2] = ["local", "noop"];

pub fn dashboard_kind(kind: &str) -> &str {
    KIND_NAMES
        .iter()
        .find(|(engine, _)| *engine == kind)
        .map(|(_, dash)| *dash)
        .unwrap_or(kind)
}

fn format_start(epoch_secs: i64) -> Result<String> {
    let at = DateTime::from_timestamp(epoch_secs, 0)
        .ok_or_else(|| BridgeError::Decode(format!("start_time {epoch_secs} out of range")))?;
    Ok(at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Dashboard type and outermost-first chain for a traversal-ordered list.
fn chain_view(order: ChainOrder, net_list: &[String]) -> (String, Vec<String>) {
    match (order, net_list.split_first()) {
        (ChainOrder::HeadIsType, Some((head, rest))) => {
            (head.clone(), rest.iter().rev().cloned().collect())
        }
        (ChainOrder::HeadIsType, None) => (UNKNOWN_KIND.to_string(), Vec::new()),
        (ChainOrder::ReverseAll, _) => (
            UNKNOWN_KIND.to_string(),
            net_list.iter().rev().cloned().collect(),
        ),
    }
}

pub fn connection_to_dashboard(
    profile: &ApiProfile,
    id: &str,
    record: &EngineConnection,
) -> Result<DashboardConnection> {
    let source = match record.ctx.source(profile.source_field) {
        Some(raw) => parse_address(raw)?,
        None => match profile.missing_source {
            MissingSource::Placeholder => Endpoint {
                host: "N".into(),
                port: "A".into(),
            },
            MissingSource::Reject => {
                return Err(BridgeError::MissingField(format!(
                    "ctx.{} of connection {id}",
                    profile.source_field.key()
                )))
            }
        },
    };
    let destination = parse_address(&record.addr)?;
    let host = match record.ctx.dest_domain.as_deref() {
        Some(domain) => parse_address(domain)?.host,
        None => destination.host.clone(),
    };

    let (kind, chains) = chain_view(profile.chain_order, &record.ctx.net_list);

    Ok(DashboardConnection {
        id: id.to_string(),
        upload: record.upload,
        download: record.download,
        start: format_start(record.start_time)?,
        chains,
        rule: profile.rule_label.clone(),
        rule_payload: String::new(),
        metadata: ConnectionMetadata {
            network: record.protocol.clone(),
            kind,
            source_ip: source.host,
            source_port: source.port,
            destination_ip: destination.host,
            destination_port: destination.port,
            host,
        },
    })
}

pub fn snapshot_from_document(
    profile: &ApiProfile,
    document: &ConnectionDocument,
) -> Result<DashboardSnapshot> {
    let connections = document
        .connections
        .iter()
        .map(|(id, record)| connection_to_dashboard(profile, id, record))
        .collect::<Result<Vec<_>>>()?;
    Ok(DashboardSnapshot {
        download_total: document.totals.download,
        upload_total: document.totals.upload,
        connections,
    })
}

pub fn document_to_dashboard(profile: &ApiProfile, document: &Value) -> Result<DashboardSnapshot> {
    let document = ConnectionDocument::from_value(document, profile.document_shape)?;
    snapshot_from_document(profile, &document)
}

fn selector_now(profile: &ApiProfile, list: &[String], selected: &Value) -> Option<String> {
    match profile.selector {
        SelectorMode::Index => selected
            .as_u64()
            .and_then(|idx| usize::try_from(idx).ok())
            .and_then(|idx| list.get(idx))
            .cloned(),
        SelectorMode::Name => selected.as_str().map(str::to_string),
    }
}

pub fn component_to_proxy(profile: &ApiProfile, name: &str, component: &Component) -> ProxyDescriptor {
    match component {
        Component::Select { list, selected } => ProxyDescriptor {
            name: name.to_string(),
            kind: SELECTOR_KIND.to_string(),
            history: Vec::new(),
            all: Some(list.clone()),
            now: selector_now(profile, list, selected),
        },
        Component::Leaf { kind } => ProxyDescriptor::leaf(name, dashboard_kind(kind)),
    }
}

pub fn config_to_proxies(profile: &ApiProfile, config: &ConfigDocument) -> ProxySet {
    let mut proxies: ProxySet = config
        .components
        .iter()
        .map(|(name, component)| (name.clone(), component_to_proxy(profile, name, component)))
        .collect();
    for sentinel in SENTINELS {
        proxies
            .entry(sentinel.to_string())
            .or_insert_with(|| ProxyDescriptor::leaf(sentinel, dashboard_kind(sentinel)));
    }
    proxies
}

/// One provider holding every proxy plus one per selector holding its members.
pub fn config_to_providers(
    profile: &ApiProfile,
    config: &ConfigDocument,
) -> BTreeMap<String, ProxyProvider> {
    let proxies = config_to_proxies(profile, config);
    let mut providers = BTreeMap::new();
    for (name, component) in &config.components {
        let Some(members) = component.candidates() else {
            continue;
        };
        let resolved = members
            .iter()
            .filter_map(|member| proxies.get(member).cloned())
            .collect();
        providers.insert(name.clone(), ProxyProvider::compatible(name, resolved));
    }
    providers.insert(
        DEFAULT_PROVIDER.to_string(),
        ProxyProvider::compatible(DEFAULT_PROVIDER, proxies.into_values().collect()),
    );
    providers
}

fn render_map(map: Map<String, Value>) -> String {
    if map.is_empty() {
        "0".to_string()
    } else {
        Value::Object(map).to_string()
    }
}

pub fn log_to_dashboard(record: &EngineLogRecord) -> Result<String> {
    let mut fields = record.fields.clone();
    let message = match fields.remove("message") {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => return Err(BridgeError::MissingField("fields.message".into())),
    };
    let body = format!("{}: {} {}", record.target, message, render_map(fields));
    let Some(span) = &record.span else {
        return Ok(body);
    };
    let mut extras = span.clone();
    let span_name = match extras.remove("name") {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Ok(format!("{span_name}{}: {body}", render_map(extras)))
}

pub fn log_event(record: &EngineLogRecord) -> Result<DashboardLog> {
    Ok(DashboardLog {
        level: LogLevel::from_engine(&record.level),
        payload: log_to_dashboard(record)?,
    })
}
