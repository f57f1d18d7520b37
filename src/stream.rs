//! Streaming Aggregator
//!
//! Owns at most one active stream session, accumulates its deltas and
//! notifies the host. Every session is identified by a [`SessionToken`];
//! calls carrying a token that is no longer active are silently ignored,
//! so late callbacks from a superseded stream cannot corrupt the current one.

use crate::types::{CompanionEvent, EventSink, SessionToken};

/// The single in-flight stream
#[derive(Debug, Clone)]
struct StreamSession {
    token: SessionToken,
    provider: String,
    text: String,
}

/// Accumulates deltas for the active session
pub struct StreamingAggregator {
    active: Option<StreamSession>,
    next_token: u64,
    sink: EventSink,
}

impl StreamingAggregator {
    pub fn new(sink: EventSink) -> Self {
        Self {
            active: None,
            next_token: 1,
            sink,
        }
    }

    /// Start a session.
    ///
    /// A session that is still active is finalized first, keeping the text it
    /// accumulated so far.
    pub fn begin(&mut self, provider: &str, initial_text: Option<&str>) -> SessionToken {
        if let Some(previous) = self.active.take() {
            tracing::debug!(token = %previous.token, "finalizing superseded stream session");
            self.finalize(previous);
        }

        let token = SessionToken(self.next_token);
        self.next_token += 1;

        let text = initial_text.unwrap_or_default().to_string();
        if !text.is_empty() {
            self.sink.emit(CompanionEvent::ContentUpdated {
                token,
                text: text.clone(),
            });
        }

        self.active = Some(StreamSession {
            token,
            provider: provider.to_string(),
            text,
        });
        token
    }

    /// Append a delta. Returns false (and does nothing) for a stale token.
    pub fn append(&mut self, token: SessionToken, delta: &str) -> bool {
        let Some(session) = self.session_mut(token) else {
            tracing::trace!(%token, "ignoring delta for inactive session");
            return false;
        };

        session.text.push_str(delta);
        let text = session.text.clone();
        self.sink.emit(CompanionEvent::ContentUpdated { token, text });
        true
    }

    /// Finalize the session: append `trailing`, notify, and clear it.
    ///
    /// Returns the final text, or None for a stale token.
    pub fn end(&mut self, token: SessionToken, trailing: Option<&str>) -> Option<String> {
        self.session_mut(token)?;
        let mut session = self.active.take()?;
        if let Some(trailing) = trailing {
            session.text.push_str(trailing);
        }
        Some(self.finalize(session))
    }

    /// Tear down without finalizing. Returns false for a stale token.
    pub fn abort(&mut self, token: SessionToken) -> bool {
        if self.session_mut(token).is_none() {
            return false;
        }
        if let Some(session) = self.active.take() {
            tracing::debug!(token = %session.token, provider = %session.provider, "stream session aborted");
        }
        true
    }

    /// Abort whatever is active (used on conversation reset)
    pub fn abort_active(&mut self) {
        if let Some(token) = self.active_token() {
            self.abort(token);
        }
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.active.as_ref().map(|s| s.token)
    }

    pub fn is_active(&self, token: SessionToken) -> bool {
        self.active_token() == Some(token)
    }

    /// Accumulated text of the active session
    pub fn current_text(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.text.as_str())
    }

    fn session_mut(&mut self, token: SessionToken) -> Option<&mut StreamSession> {
        self.active.as_mut().filter(|s| s.token == token)
    }

    fn finalize(&self, session: StreamSession) -> String {
        self.sink.emit(CompanionEvent::Finalized {
            token: session.token,
            text: session.text.clone(),
        });
        session.text
    }
}
