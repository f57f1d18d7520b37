//! Error types for the companion engine.

use serde_json::Value;
use thiserror::Error;

use crate::types::Stage;

/// Failure of a single companion request.
///
/// The engine stays usable after any of these; nothing here is retried.
#[derive(Error, Debug)]
pub enum CompanionError {
    /// Missing credential, model or unknown provider. Raised before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-2xx response, or an error object inside the stream
    #[error("Network error: {0}")]
    Network(#[from] ProviderError),

    /// Fetch failure below HTTP (connect, TLS)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body broke off after streaming started
    #[error("Stream interrupted: {0}")]
    Interrupted(#[source] reqwest::Error),

    /// A single stream line could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl CompanionError {
    /// Stage reported on the host's error banner
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Configure,
            Self::Network(_) | Self::Transport(_) => Stage::Request,
            Self::Interrupted(_) | Self::Protocol(_) => Stage::Stream,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompanionError>;

/// Error returned by a provider backend.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("provider returned HTTP {status}: {message}")]
pub struct ProviderError {
    pub status: u16,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build from an error response body, pulling out the message if the body is JSON
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| error_message(&json))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    "no error details".to_string()
                } else {
                    trimmed.chars().take(500).collect()
                }
            });
        Self::new(status, message)
    }
}

/// Extract a provider error message from the shapes backends use:
/// `{"error": {"message": …}}`, `{"error": "…"}` or `{"message": …}` next to an error type.
pub(crate) fn error_message(json: &Value) -> Option<String> {
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }
        if let Some(message) = error.as_str() {
            return Some(message.to_string());
        }
        return Some("An error occurred during streaming".to_string());
    }
    if json.get("type").and_then(Value::as_str) == Some("error") {
        return json
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some("An error occurred during streaming".to_string()));
    }
    None
}
