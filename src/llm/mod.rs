//! LLM Layer: provider wire formats and streamed transport
//!
//! This module handles all interactions with Large Language Models, including:
//! - Provider adapters (OpenAI, Azure OpenAI, Anthropic, local server)
//! - Line-buffered stream decoding
//! - Per-purpose prompts

pub mod anthropic;
pub mod client;
pub mod local;
pub mod openai;
pub mod prompts;
pub mod provider;
pub mod types;

// Re-export key types
pub use client::{CompletionClient, StreamDecoder};
pub use provider::{
    CredentialSupplier, EnvCredentials, ProviderAdapter, ProviderRegistry, StaticCredentials,
};
pub use types::{CompletionRequest, DecodedChunk, HttpRequest, LineEvent, ProviderKind};
