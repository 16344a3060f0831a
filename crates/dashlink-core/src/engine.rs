//! Engine API payload shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delta::Totals;
use crate::error::{BridgeError, Result};
use crate::profile::{DocumentShape, SourceField};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConnection {
    pub protocol: String,
    pub addr: String,
    pub start_time: i64,
    #[serde(default)]
    pub ctx: EngineContext,
    #[serde(default)]
    pub upload: u64,
    #[serde(default)]
    pub download: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineContext {
    /// Traversed components, entry component first.
    #[serde(default)]
    pub net_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_domain: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EngineContext {
    pub fn source(&self, field: SourceField) -> Option<&str> {
        self.extra.get(field.key()).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionDocument {
    pub totals: Totals,
    pub connections: BTreeMap<String, EngineConnection>,
}

#[derive(Deserialize)]
struct WrappedDocument {
    #[serde(default)]
    total_upload: u64,
    #[serde(default)]
    total_download: u64,
    #[serde(default)]
    connections: BTreeMap<String, EngineConnection>,
}

impl ConnectionDocument {
    pub fn from_value(value: &Value, shape: DocumentShape) -> Result<Self> {
        match shape {
            DocumentShape::Flat => {
                let connections = BTreeMap::<String, EngineConnection>::deserialize(value)?;
                Ok(Self {
                    totals: Totals::default(),
                    connections,
                })
            }
            DocumentShape::Totals => {
                let doc = WrappedDocument::deserialize(value)?;
                Ok(Self {
                    totals: Totals {
                        upload: doc.total_upload,
                        download: doc.total_download,
                    },
                    connections: doc.connections,
                })
            }
        }
    }
}

/// Read only the cumulative counters; the flat shape has none and reports zero.
pub fn document_totals(value: &Value, shape: DocumentShape) -> Result<Totals> {
    match shape {
        DocumentShape::Flat => Ok(Totals::default()),
        DocumentShape::Totals => {
            let obj = value
                .as_object()
                .ok_or_else(|| BridgeError::Decode("connection document is not an object".into()))?;
            let read = |key: &str| obj.get(key).and_then(Value::as_u64).unwrap_or(0);
            Ok(Totals {
                upload: read("total_upload"),
                download: read("total_download"),
            })
        }
    }
}

/// One entry of the engine's network component table.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Select { list: Vec<String>, selected: Value },
    Leaf { kind: String },
}

impl Component {
    pub fn kind(&self) -> &str {
        match self {
            Component::Select { .. } => "select",
            Component::Leaf { kind } => kind,
        }
    }

    pub fn candidates(&self) -> Option<&[String]> {
        match self {
            Component::Select { list, .. } => Some(list),
            Component::Leaf { .. } => None,
        }
    }

    fn from_value(name: &str, value: &Value) -> Result<Self> {
        if let Some(kind) = value.as_str() {
            return Ok(Component::Leaf {
                kind: kind.to_string(),
            });
        }
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::Decode(format!("component {name} has no type")))?;
        if kind != "select" {
            return Ok(Component::Leaf {
                kind: kind.to_string(),
            });
        }
        let list = match value.get("list") {
            Some(list) => Vec::<String>::deserialize(list)?,
            None => Vec::new(),
        };
        Ok(Component::Select {
            list,
            selected: value.get("selected").cloned().unwrap_or(Value::Null),
        })
    }
}

/// The engine's component table keyed by component name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    pub components: BTreeMap<String, Component>,
}

impl ConfigDocument {
    /// Accepts either the whole engine config (table under `net`) or the bare table.
    pub fn from_value(value: &Value) -> Result<Self> {
        let table: &Map<String, Value> = match value.get("net").and_then(Value::as_object) {
            Some(net) => net,
            None => value
                .as_object()
                .ok_or_else(|| BridgeError::Decode("config is not an object".into()))?,
        };
        let components = table
            .iter()
            .map(|(name, desc)| Ok((name.clone(), Component::from_value(name, desc)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { components })
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }
}

/// A structured record from the engine's log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineLogRecord {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Map<String, Value>>,
}

/// Engine answer to a per-component delay check. `None` means the check
/// timed out at that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayReport {
    #[serde(default)]
    pub connect: Option<u64>,
    #[serde(default)]
    pub response: Option<u64>,
}
