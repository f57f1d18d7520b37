//! Universal types for LLM interactions.
//!
//! These types isolate the engine from specific provider wire formats.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Purpose;

/// Backend wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure-openai")]
    AzureOpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "local")]
    Local,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure-openai",
            Self::Anthropic => "anthropic",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure-openai" | "azure" => Ok(Self::AzureOpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(format!("unknown provider kind '{}'", other)),
        }
    }
}

/// A provider-independent completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    /// System instructions
    pub system: String,
    /// The user turn sent to the model
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(purpose: Purpose, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// A fully built HTTP request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What one stream line contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineEvent {
    pub delta: Option<String>,
    pub done: bool,
}

impl LineEvent {
    pub fn skip() -> Self {
        Self::default()
    }

    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            delta: None,
            done: true,
        }
    }
}

/// Text deltas decoded from a chunk of the response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedChunk {
    pub deltas: Vec<String>,
    /// The provider signalled the end of the response
    pub done: bool,
}

impl DecodedChunk {
    pub fn text(&self) -> String {
        self.deltas.concat()
    }
}
