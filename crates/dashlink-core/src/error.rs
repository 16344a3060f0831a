/// Failure taxonomy for the translation layer.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("wrong state: {0}")]
    Reconciliation(String),
    #[error("component is not selectable: {0}")]
    NotSelectable(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("candidate {candidate} is not listed by selector {selector}")]
    UnknownCandidate { selector: String, candidate: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected engine payload: {0}")]
    Decode(String),
    #[error("engine request failed: {message}")]
    Backend {
        status: Option<u16>,
        message: String,
    },
}

impl BridgeError {
    pub fn backend(message: impl Into<String>) -> Self {
        BridgeError::Backend {
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        BridgeError::Decode(err.to_string())
    }

    /// Whether the error was caused by the dashboard's request rather than the engine.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            BridgeError::NotSelectable(_)
                | BridgeError::MissingField(_)
                | BridgeError::InvalidBody(_)
                | BridgeError::UnknownCandidate { .. }
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Decode(err.to_string())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_classified() {
        assert!(BridgeError::MissingField("name".into()).is_caller_error());
        assert!(BridgeError::NotSelectable("leaf".into()).is_caller_error());
        assert!(BridgeError::InvalidBody("eof".into()).is_caller_error());
        assert!(!BridgeError::Reconciliation("x".into()).is_caller_error());
        assert!(!BridgeError::backend("down").is_caller_error());
    }

    #[test]
    fn reconciliation_message_mentions_wrong_state() {
        let err = BridgeError::Reconciliation("patch before full document".into());
        assert_eq!(err.to_string(), "wrong state: patch before full document");
    }
}
