//! HTTP transport for streamed completions.
//!
//! Sends the request an adapter built, rejects non-2xx responses, and
//! re-assembles body chunks into whole lines before handing them to the
//! adapter (network chunks may split a line, or a UTF-8 sequence, anywhere).

use reqwest::Client;

use super::provider::ProviderAdapter;
use super::types::{DecodedChunk, HttpRequest};
use crate::error::{ProviderError, Result};

/// Thin wrapper around a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct CompletionClient {
    http: Client,
}

impl CompletionClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// Send `request` and return the streaming response.
    ///
    /// Non-2xx responses become a `ProviderError` carrying the status and
    /// whatever message the body contained.
    pub async fn open(&self, request: &HttpRequest) -> Result<reqwest::Response> {
        let mut builder = self.http.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %request.url, "sending completion request");
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ProviderError::from_body(status.as_u16(), &body);
            tracing::error!("provider request failed: {}", error);
            return Err(error.into());
        }

        Ok(response)
    }
}

/// Line-buffering decoder for one response body.
pub struct StreamDecoder<'a> {
    adapter: &'a dyn ProviderAdapter,
    pending: Vec<u8>,
    done: bool,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(adapter: &'a dyn ProviderAdapter) -> Self {
        Self {
            adapter,
            pending: Vec::new(),
            done: false,
        }
    }

    /// Feed raw body bytes; returns deltas from every line completed so far
    pub fn feed(&mut self, bytes: &[u8]) -> Result<DecodedChunk> {
        if self.done {
            return Ok(DecodedChunk {
                deltas: Vec::new(),
                done: true,
            });
        }

        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(DecodedChunk::default());
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        tracing::trace!(provider = %self.adapter.kind(), "stream lines: {:?}", String::from_utf8_lossy(&complete));
        let chunk = self.adapter.decode_chunk(&complete)?;
        self.done = chunk.done;
        Ok(chunk)
    }

    /// Decode whatever is left once the body ends (a last line without newline)
    pub fn finish(&mut self) -> Result<DecodedChunk> {
        if self.done || self.pending.is_empty() {
            return Ok(DecodedChunk {
                deltas: Vec::new(),
                done: self.done,
            });
        }

        let rest = std::mem::take(&mut self.pending);
        let chunk = self.adapter.decode_chunk(&rest)?;
        self.done = chunk.done;
        Ok(chunk)
    }

    /// Whether the provider's terminal marker has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }
}
