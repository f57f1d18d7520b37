//! OpenAI and Azure OpenAI adapters.
//!
//! Both speak the Chat Completions streaming format: newline-delimited,
//! optionally `data: `-prefixed JSON chunks terminated by `data: [DONE]`.
//! They differ only in URL layout and auth header.

use serde::{Deserialize, Serialize};

use super::provider::{require_credential, require_model, strip_data_prefix, ProviderAdapter};
use super::types::{CompletionRequest, HttpRequest, LineEvent, ProviderKind};
use crate::config::ProviderConfig;
use crate::error::{error_message, CompanionError, ProviderError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const AZURE_DEFAULT_API_VERSION: &str = "2024-02-15-preview";

/// OpenAI Chat Completions
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        credential: Option<&str>,
    ) -> Result<HttpRequest> {
        let api_key = require_credential(self.kind(), credential)?;
        let model = require_model(self.kind(), config)?;

        let url = match config.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => openai_url(endpoint),
            _ => OPENAI_API_URL.to_string(),
        };

        let body = ChatRequest::new(Some(model.to_string()), request, config);

        Ok(HttpRequest {
            url,
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {}", api_key)),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: serde_json::to_value(body).map_err(|e| {
                CompanionError::Configuration(format!("failed to encode request: {}", e))
            })?,
        })
    }

    fn decode_line(&self, line: &str) -> Result<LineEvent> {
        decode_chat_completion_line(line)
    }
}

/// Azure OpenAI: deployment in the path, `api-key` header
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureOpenAiAdapter;

impl ProviderAdapter for AzureOpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureOpenAi
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        credential: Option<&str>,
    ) -> Result<HttpRequest> {
        let api_key = require_credential(self.kind(), credential)?;
        let deployment = require_model(self.kind(), config)?;
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                CompanionError::Configuration("no endpoint configured for azure-openai".into())
            })?;
        let api_version = config
            .api_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(AZURE_DEFAULT_API_VERSION);

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint, deployment, api_version
        );
        let body = ChatRequest::new(None, request, config);

        Ok(HttpRequest {
            url,
            headers: vec![
                ("api-key".to_string(), api_key.to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: serde_json::to_value(body).map_err(|e| {
                CompanionError::Configuration(format!("failed to encode request: {}", e))
            })?,
        })
    }

    fn decode_line(&self, line: &str) -> Result<LineEvent> {
        decode_chat_completion_line(line)
    }
}

/// Accept either a full `/chat/completions` URL or an API base like `http://host/v1`
fn openai_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.ends_with("/chat/completions") {
        endpoint.to_string()
    } else {
        format!("{}/chat/completions", endpoint)
    }
}

/// Decode one Chat Completions stream line
pub(crate) fn decode_chat_completion_line(line: &str) -> Result<LineEvent> {
    let line = line.trim();
    // Blank keep-alives, SSE comments and event names carry no payload
    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
        return Ok(LineEvent::skip());
    }

    let payload = strip_data_prefix(line);
    if payload == "[DONE]" {
        return Ok(LineEvent::done());
    }

    let json: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| CompanionError::Protocol(format!("{}: {}", e, payload)))?;

    if let Some(message) = error_message(&json) {
        return Err(ProviderError::new(200, message).into());
    }

    let chunk: ChunkDto = serde_json::from_value(json)
        .map_err(|e| CompanionError::Protocol(format!("unexpected chunk shape: {}", e)))?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);

    Ok(match content {
        Some(text) => LineEvent::delta(text),
        None => LineEvent::skip(),
    })
}

// -----------------------------------------------------------------------------
// Chat Completions DTOs
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl ChatRequest {
    fn new(model: Option<String>, request: &CompletionRequest, config: &ProviderConfig) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !request.system.trim().is_empty() {
            messages.push(ApiMessage {
                role: "system",
                content: request.system.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        Self {
            model,
            messages,
            stream: true,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChunkDto {
    #[serde(default)]
    choices: Vec<ChoiceDto>,
}

#[derive(Deserialize)]
struct ChoiceDto {
    delta: Option<DeltaDto>,
}

#[derive(Deserialize)]
struct DeltaDto {
    content: Option<String>,
}
