//! Engine API version switches.
//!
//! Engine releases disagree on field names, selector semantics, mutation
//! bodies and endpoint paths. Each difference is an explicit switch so both
//! behaviors stay reproducible; a profile is picked once at startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Characters escaped when a component name becomes a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub(crate) fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfileName {
    /// Flat connection map, selection by index.
    Indexed,
    /// Connection map wrapped with totals, selection by name.
    Named,
}

impl ProfileName {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileName::Indexed => "indexed",
            ProfileName::Named => "named",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "indexed" | "index" => Ok(ProfileName::Indexed),
            "named" | "name" => Ok(ProfileName::Named),
            other => Err(format!("unknown engine profile '{other}'")),
        }
    }
}

/// Layout of the engine's connection document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentShape {
    /// `{id: record}`
    Flat,
    /// `{total_upload, total_download, connections: {id: record}}`
    Totals,
}

/// Which `ctx` member carries the source socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceField {
    SourceAddress,
    SrcSocketAddr,
}

impl SourceField {
    pub fn key(self) -> &'static str {
        match self {
            SourceField::SourceAddress => "source_address",
            SourceField::SrcSocketAddr => "src_socket_addr",
        }
    }
}

/// What to report when a connection has no source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissingSource {
    /// Report `N`/`A` as source IP and port.
    Placeholder,
    /// Fail the translation.
    Reject,
}

/// How a selector's `selected` member addresses its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectorMode {
    Index,
    Name,
}

/// Shape of the selection mutation body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MutationBody {
    /// `{"selected": value}`
    Wrapped,
    /// the bare value
    Bare,
}

/// How a connection's `net_list` becomes the dashboard type and chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChainOrder {
    /// Entry component is the type; the rest is reversed into the chain.
    HeadIsType,
    /// Type is always `Unknown`; the whole list is reversed into the chain.
    ReverseAll,
}

/// How the dashboard's connection listing stream is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFeed {
    /// Engine streaming channel carrying full/patch updates.
    Stream,
    /// Periodic snapshot requests.
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnginePaths {
    pub config: String,
    pub connection: String,
    pub net: String,
    pub stream_connection: String,
    pub stream_logs: String,
}

impl Default for EnginePaths {
    fn default() -> Self {
        Self {
            config: "/api/config".into(),
            connection: "/api/connection".into(),
            net: "/api/net".into(),
            stream_connection: "/api/stream/connection".into(),
            stream_logs: "/api/stream/logs".into(),
        }
    }
}

impl EnginePaths {
    pub fn connection_item(&self, id: &str) -> String {
        format!("{}/{}", self.connection, encode_segment(id))
    }

    pub fn net_item(&self, name: &str) -> String {
        format!("{}/{}", self.net, encode_segment(name))
    }

    pub fn net_delay(&self, name: &str) -> String {
        format!("{}/delay", self.net_item(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProfile {
    pub name: ProfileName,
    pub document_shape: DocumentShape,
    pub source_field: SourceField,
    pub missing_source: MissingSource,
    pub selector: SelectorMode,
    pub mutation_body: MutationBody,
    pub chain_order: ChainOrder,
    pub connection_feed: ConnectionFeed,
    pub poll_interval: Duration,
    pub paths: EnginePaths,
    /// Label shown as the matching rule of every connection.
    pub rule_label: String,
}

pub const DEFAULT_RULE_LABEL: &str = "Engine";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

impl ApiProfile {
    pub fn indexed() -> Self {
        Self {
            name: ProfileName::Indexed,
            document_shape: DocumentShape::Flat,
            source_field: SourceField::SourceAddress,
            missing_source: MissingSource::Reject,
            selector: SelectorMode::Index,
            mutation_body: MutationBody::Wrapped,
            chain_order: ChainOrder::ReverseAll,
            connection_feed: ConnectionFeed::Poll,
            poll_interval: DEFAULT_POLL_INTERVAL,
            paths: EnginePaths::default(),
            rule_label: DEFAULT_RULE_LABEL.into(),
        }
    }

    pub fn named() -> Self {
        Self {
            name: ProfileName::Named,
            document_shape: DocumentShape::Totals,
            source_field: SourceField::SrcSocketAddr,
            missing_source: MissingSource::Placeholder,
            selector: SelectorMode::Name,
            mutation_body: MutationBody::Bare,
            chain_order: ChainOrder::HeadIsType,
            connection_feed: ConnectionFeed::Stream,
            poll_interval: DEFAULT_POLL_INTERVAL,
            paths: EnginePaths::default(),
            rule_label: DEFAULT_RULE_LABEL.into(),
        }
    }

    pub fn preset(name: ProfileName) -> Self {
        match name {
            ProfileName::Indexed => Self::indexed(),
            ProfileName::Named => Self::named(),
        }
    }

    /// Apply individually configured switches on top of the preset.
    pub fn with_overrides(mut self, o: &ProfileOverrides) -> Self {
        if let Some(v) = o.document_shape {
            self.document_shape = v;
        }
        if let Some(v) = o.source_field {
            self.source_field = v;
        }
        if let Some(v) = o.missing_source {
            self.missing_source = v;
        }
        if let Some(v) = o.selector {
            self.selector = v;
        }
        if let Some(v) = o.mutation_body {
            self.mutation_body = v;
        }
        if let Some(v) = o.chain_order {
            self.chain_order = v;
        }
        if let Some(v) = o.connection_feed {
            self.connection_feed = v;
        }
        if let Some(paths) = &o.paths {
            self.paths = paths.clone();
        }
        self
    }

    pub fn with_rule_label(mut self, label: impl Into<String>) -> Self {
        self.rule_label = label.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(100));
        self
    }
}

impl Default for ApiProfile {
    fn default() -> Self {
        Self::named()
    }
}

/// Per-switch overrides read from the `[engine.overrides]` config table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileOverrides {
    #[serde(default)]
    pub document_shape: Option<DocumentShape>,
    #[serde(default)]
    pub source_field: Option<SourceField>,
    #[serde(default)]
    pub missing_source: Option<MissingSource>,
    #[serde(default)]
    pub selector: Option<SelectorMode>,
    #[serde(default)]
    pub mutation_body: Option<MutationBody>,
    #[serde(default)]
    pub chain_order: Option<ChainOrder>,
    #[serde(default)]
    pub connection_feed: Option<ConnectionFeed>,
    #[serde(default)]
    pub paths: Option<EnginePaths>,
}
