//! The Provider Abstraction.
//!
//! One [`ProviderAdapter`] per backend translates a generic request into the
//! backend's wire format and decodes its streamed body into text deltas.
//! Adapters are pure: the only side effect is the HTTP call the client makes
//! with the request they build.

use std::collections::HashMap;

use super::anthropic::AnthropicAdapter;
use super::local::LocalAdapter;
use super::openai::{AzureOpenAiAdapter, OpenAiAdapter};
use super::types::{CompletionRequest, DecodedChunk, HttpRequest, LineEvent, ProviderKind};
use crate::config::{Config, ProviderConfig};
use crate::error::{CompanionError, Result};

/// The core trait for backend wire formats.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Build the streaming HTTP request for `request`.
    ///
    /// Fails with a configuration error when a required credential or model is missing.
    fn build_request(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        credential: Option<&str>,
    ) -> Result<HttpRequest>;

    /// Decode one complete line of the response body.
    ///
    /// `Protocol` errors mean the line is unusable and should be skipped;
    /// `Network` errors carry an error reported by the provider mid-stream.
    fn decode_line(&self, line: &str) -> Result<LineEvent>;

    /// Decode a run of complete lines.
    ///
    /// Malformed lines are logged and skipped. Lines after the terminal marker are ignored.
    fn decode_chunk(&self, raw: &[u8]) -> Result<DecodedChunk> {
        let text = String::from_utf8_lossy(raw);
        let mut chunk = DecodedChunk::default();

        for line in text.lines() {
            if chunk.done {
                break;
            }
            match self.decode_line(line) {
                Ok(event) => {
                    if let Some(delta) = event.delta.filter(|d| !d.is_empty()) {
                        chunk.deltas.push(delta);
                    }
                    chunk.done |= event.done;
                }
                Err(CompanionError::Protocol(reason)) => {
                    tracing::warn!(provider = %self.kind(), "skipping malformed stream line: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(chunk)
    }
}

/// Reject requests that need a secret when none was supplied.
pub(crate) fn require_credential<'a>(
    kind: ProviderKind,
    credential: Option<&'a str>,
) -> Result<&'a str> {
    credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CompanionError::Configuration(format!("no credential configured for {}", kind)))
}

pub(crate) fn require_model(kind: ProviderKind, config: &ProviderConfig) -> Result<&str> {
    let model = config.model.trim();
    if model.is_empty() {
        return Err(CompanionError::Configuration(format!(
            "no model configured for {}",
            kind
        )));
    }
    Ok(model)
}

/// Strip an SSE `data:` prefix if present
pub(crate) fn strip_data_prefix(line: &str) -> &str {
    match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None => line,
    }
}

/// Adapters keyed by wire format, resolved through provider ids in [`Config`].
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with the four built-in adapters
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(OpenAiAdapter));
        registry.register(Box::new(AzureOpenAiAdapter));
        registry.register(Box::new(AnthropicAdapter));
        registry.register(Box::new(LocalAdapter));
        registry
    }

    /// Add or replace the adapter for its kind
    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn adapter(&self, kind: ProviderKind) -> Option<&dyn ProviderAdapter> {
        self.adapters.get(&kind).map(|a| a.as_ref())
    }

    /// Look up the adapter and settings for a provider id.
    ///
    /// Unknown ids are a configuration error; no network call is made.
    pub fn resolve<'a>(
        &'a self,
        provider_id: &str,
        config: &'a Config,
    ) -> Result<(&'a dyn ProviderAdapter, &'a ProviderConfig)> {
        let provider_config = config.provider(provider_id).ok_or_else(|| {
            CompanionError::Configuration(format!("unknown provider '{}'", provider_id))
        })?;
        let adapter = self.adapter(provider_config.kind).ok_or_else(|| {
            CompanionError::Configuration(format!(
                "no adapter registered for {}",
                provider_config.kind
            ))
        })?;
        Ok((adapter, provider_config))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Supplies API secrets by provider id.
pub trait CredentialSupplier: Send + Sync {
    fn credential(&self, provider_id: &str) -> Option<String>;
}

/// Reads secrets from the environment.
///
/// `COMPANION_<ID>_API_KEY` wins (id upper-cased, `-` → `_`); otherwise the
/// conventional variable for the built-in ids is used.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn conventional_var(provider_id: &str) -> Option<&'static str> {
        match provider_id {
            "openai" => Some("OPENAI_API_KEY"),
            "azure-openai" | "azure" => Some("AZURE_OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

impl CredentialSupplier for EnvCredentials {
    fn credential(&self, provider_id: &str) -> Option<String> {
        let specific = format!(
            "COMPANION_{}_API_KEY",
            provider_id.to_ascii_uppercase().replace('-', "_")
        );
        std::env::var(&specific)
            .ok()
            .or_else(|| Self::conventional_var(provider_id).and_then(|v| std::env::var(v).ok()))
            .filter(|v| !v.trim().is_empty())
    }
}

/// Fixed in-memory secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(provider_id.into(), secret.into());
        self
    }
}

impl CredentialSupplier for StaticCredentials {
    fn credential(&self, provider_id: &str) -> Option<String> {
        self.secrets.get(provider_id).cloned()
    }
}
