//! Local model server adapter (Ollama-style `/api/generate`).
//!
//! The body is newline-delimited JSON, one object per line with a `response`
//! fragment and a `done` flag. No credential is needed.

use serde::{Deserialize, Serialize};

use super::provider::{require_model, ProviderAdapter};
use super::types::{CompletionRequest, HttpRequest, LineEvent, ProviderKind};
use crate::config::ProviderConfig;
use crate::error::{CompanionError, ProviderError, Result};

const LOCAL_API_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAdapter;

impl ProviderAdapter for LocalAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        _credential: Option<&str>,
    ) -> Result<HttpRequest> {
        let model = require_model(self.kind(), config)?;
        let base = config
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .unwrap_or(LOCAL_API_URL);
        let url = if base.ends_with("/api/generate") {
            base.to_string()
        } else {
            format!("{}/api/generate", base)
        };

        let options = if config.temperature.is_some() || config.max_tokens.is_some() {
            Some(GenerateOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            })
        } else {
            None
        };

        let body = GenerateRequest {
            model: model.to_string(),
            prompt: request.prompt.clone(),
            system: Some(request.system.clone()).filter(|s| !s.trim().is_empty()),
            stream: true,
            options,
        };

        Ok(HttpRequest {
            url,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_value(body).map_err(|e| {
                CompanionError::Configuration(format!("failed to encode request: {}", e))
            })?,
        })
    }

    fn decode_line(&self, line: &str) -> Result<LineEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(LineEvent::skip());
        }

        let chunk: GenerateChunk = serde_json::from_str(line)
            .map_err(|e| CompanionError::Protocol(format!("{}: {}", e, line)))?;

        if let Some(message) = chunk.error {
            return Err(ProviderError::new(200, message).into());
        }

        Ok(LineEvent {
            delta: chunk.response.filter(|r| !r.is_empty()),
            done: chunk.done,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
