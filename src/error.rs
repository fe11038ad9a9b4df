//! Error taxonomy for the enhancement pipeline.
//! Every variant is `Clone` so a single deduplicated failure can be handed
//! to all callers waiting on the same fingerprint.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EnhanceError {
    /// Missing or unusable configuration (e.g. no API key). Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rejected user input, one entry per offending field.
    #[error("invalid input: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    /// Non-2xx response or network-level failure.
    #[error("transport error{}: {message}", format_status(.status))]
    Transport { status: Option<u16>, message: String },

    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// The upstream answered but reported an application-level error.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Returned content is not valid YAML after fence stripping.
    #[error("failed to parse model output: {message}")]
    Parse { message: String, raw: String },

    #[error("request cancelled")]
    Cancelled,
}

impl EnhanceError {
    /// Whether the retrying transport may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnhanceError::Transport { .. } | EnhanceError::Timeout { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            EnhanceError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_fields() {
        let err = EnhanceError::Transport {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "transport error (status 503): unavailable");

        let err = EnhanceError::Validation(vec![
            FieldError::new("text", "too short"),
            FieldError::new("selector_path", "unbalanced brackets"),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid input: text: too short; selector_path: unbalanced brackets"
        );
    }

    #[test]
    fn only_transport_and_timeout_are_retryable() {
        assert!(EnhanceError::Transport { status: None, message: String::new() }.is_retryable());
        assert!(EnhanceError::Timeout { after: Duration::from_secs(30) }.is_retryable());
        assert!(!EnhanceError::Upstream("quota".into()).is_retryable());
        assert!(!EnhanceError::Parse { message: String::new(), raw: String::new() }.is_retryable());
        assert!(!EnhanceError::Configuration("no key".into()).is_retryable());
    }
}
