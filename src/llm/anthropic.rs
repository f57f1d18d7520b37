//! Anthropic Messages API adapter.
//!
//! Streams server-sent events whose JSON payloads carry a `type`:
//! `content_block_delta` holds text, `message_stop` ends the response.

use serde::Serialize;
use serde_json::Value;

use super::provider::{require_credential, require_model, strip_data_prefix, ProviderAdapter};
use super::types::{CompletionRequest, HttpRequest, LineEvent, ProviderKind};
use crate::config::ProviderConfig;
use crate::error::{error_message, CompanionError, ProviderError, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        credential: Option<&str>,
    ) -> Result<HttpRequest> {
        let api_key = require_credential(self.kind(), credential)?;
        let model = require_model(self.kind(), config)?;

        let base = config
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .unwrap_or(ANTHROPIC_API_URL);
        let url = if base.ends_with("/v1/messages") {
            base.to_string()
        } else {
            format!("{}/v1/messages", base)
        };

        let body = MessagesRequest {
            model: model.to_string(),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: Some(request.system.clone()).filter(|s| !s.trim().is_empty()),
            messages: vec![ApiMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            stream: true,
            temperature: config.temperature,
        };

        Ok(HttpRequest {
            url,
            headers: vec![
                ("x-api-key".to_string(), api_key.to_string()),
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: serde_json::to_value(body).map_err(|e| {
                CompanionError::Configuration(format!("failed to encode request: {}", e))
            })?,
        })
    }

    fn decode_line(&self, line: &str) -> Result<LineEvent> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
            return Ok(LineEvent::skip());
        }

        let payload = strip_data_prefix(line);
        let json: Value = serde_json::from_str(payload)
            .map_err(|e| CompanionError::Protocol(format!("{}: {}", e, payload)))?;

        match json.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => {
                let text = json
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str);
                Ok(match text {
                    Some(text) => LineEvent::delta(text),
                    // input_json_delta and friends carry no display text
                    None => LineEvent::skip(),
                })
            }
            Some("message_stop") => Ok(LineEvent::done()),
            Some("error") => {
                let message = json
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| error_message(&json))
                    .unwrap_or_else(|| "An error occurred during streaming".to_string());
                Err(ProviderError::new(200, message).into())
            }
            Some(_) => Ok(LineEvent::skip()),
            None => Err(CompanionError::Protocol(format!(
                "event without type: {}",
                payload
            ))),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}
