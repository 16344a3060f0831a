//! Rebuilds the engine's streamed document from a full snapshot plus ordered
//! JSON patches.

use json_patch::Patch;
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// One message on an engine document stream.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    Full(Value),
    Patch(Patch),
}

impl StreamUpdate {
    /// Decode the `{"full": ...}` / `{"patch": [...]}` envelope.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(BridgeError::Reconciliation(
                "update is not an object".into(),
            ));
        };
        if let Some(full) = map.remove("full") {
            return Ok(StreamUpdate::Full(full));
        }
        if let Some(ops) = map.remove("patch") {
            let patch: Patch = serde_json::from_value(ops)
                .map_err(|err| BridgeError::Reconciliation(format!("malformed patch: {err}")))?;
            return Ok(StreamUpdate::Patch(patch));
        }
        Err(BridgeError::Reconciliation(
            "update carries neither full nor patch".into(),
        ))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| BridgeError::Reconciliation(format!("undecodable update: {err}")))?;
        Self::from_value(value)
    }
}

/// Per-stream document state. Once an update is rejected the reconciler stays
/// failed for the rest of the stream.
#[derive(Debug, Clone, Default)]
pub struct PatchReconciler {
    document: Option<Value>,
    failed: bool,
    applied: u64,
}

impl PatchReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the next update and return the reconstructed document.
    pub fn reconcile(&mut self, update: StreamUpdate) -> Result<&Value> {
        if self.failed {
            return Err(BridgeError::Reconciliation(
                "stream already desynchronized".into(),
            ));
        }
        let next = match update {
            StreamUpdate::Full(doc) => doc,
            StreamUpdate::Patch(patch) => {
                let Some(mut doc) = self.document.take() else {
                    self.failed = true;
                    return Err(BridgeError::Reconciliation(
                        "patch received before any full document".into(),
                    ));
                };
                if let Err(err) = json_patch::patch(&mut doc, &patch) {
                    self.failed = true;
                    return Err(BridgeError::Reconciliation(format!(
                        "patch {} does not apply: {err}",
                        self.applied + 1
                    )));
                }
                doc
            }
        };
        self.applied += 1;
        Ok(self.document.insert(next))
    }

    /// Decode a raw message and apply it.
    pub fn reconcile_raw(&mut self, raw: &str) -> Result<&Value> {
        match StreamUpdate::parse(raw) {
            Ok(update) => self.reconcile(update),
            Err(err) => {
                self.failed = true;
                self.document = None;
                Err(err)
            }
        }
    }

    pub fn document(&self) -> Option<&Value> {
        self.document.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Number of updates applied so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}
