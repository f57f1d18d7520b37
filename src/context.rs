//! Context Window Management.
//!
//! Decides how much conversation history each companion task gets to see,
//! and defines the conversation source the engine reads that history from.

use std::collections::VecDeque;

use crate::types::{ConversationMessage, Purpose, Role};

/// The conversation store never holds more than this many messages.
pub const MAX_STORED_MESSAGES: usize = 100;

/// Size limits of a purpose's context window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowBounds {
    pub min: usize,
    pub max: usize,
    /// Fraction of the whole conversation requested before clamping
    pub scale: f64,
}

impl Purpose {
    pub fn window_bounds(&self) -> WindowBounds {
        match self {
            Self::Analysis | Self::Summary => WindowBounds {
                min: 50,
                max: 200,
                scale: 1.0,
            },
            Self::Title => WindowBounds {
                min: 15,
                max: 30,
                scale: 0.3,
            },
            Self::General => WindowBounds {
                min: 50,
                max: 150,
                scale: 0.7,
            },
        }
    }
}

/// How many recent messages to request for `purpose` when the conversation
/// has `total_messages` messages.
///
/// Never below the purpose's minimum, never above its cap, and
/// non-decreasing in `total_messages`.
pub fn select(purpose: Purpose, total_messages: usize) -> usize {
    let bounds = purpose.window_bounds();
    let scaled = (total_messages as f64 * bounds.scale).floor() as usize;
    scaled.max(bounds.min).clamp(bounds.min, bounds.max)
}

/// Result of a context query.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextWindow {
    /// Formatted `User: …` / `Agent: …` transcript
    Available(String),
    /// Nothing to show. Callers treat this as a normal state, not an error.
    NoConversation,
}

impl ContextWindow {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Available(text) => Some(text),
            Self::NoConversation => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoConversation)
    }
}

/// Read access to the observed conversation.
///
/// `get_context` is the primary query. Hosts that can reconstruct history
/// some other way (e.g. from rendered UI) implement `fallback_context`; it is
/// consulted only when the primary query comes back empty.
pub trait ConversationSource {
    /// Number of messages currently known
    fn message_count(&self) -> usize;

    /// Most recent `max_messages` messages as a transcript, or None if there are none
    fn get_context(&self, max_messages: usize) -> Option<String>;

    fn fallback_context(&self, _max_messages: usize) -> Option<String> {
        None
    }

    /// Primary query, then fallback, then the "no conversation" sentinel
    fn context_window(&self, max_messages: usize) -> ContextWindow {
        let primary = self
            .get_context(max_messages)
            .filter(|text| !text.trim().is_empty());
        if let Some(text) = primary {
            return ContextWindow::Available(text);
        }

        match self
            .fallback_context(max_messages)
            .filter(|text| !text.trim().is_empty())
        {
            Some(text) => {
                tracing::debug!("primary context query empty, using fallback");
                ContextWindow::Available(text)
            }
            None => ContextWindow::NoConversation,
        }
    }
}

type FallbackFn = Box<dyn Fn(usize) -> Option<String> + Send + Sync>;

/// In-memory, append-only conversation log capped at [`MAX_STORED_MESSAGES`].
pub struct ConversationStore {
    messages: VecDeque<ConversationMessage>,
    capacity: usize,
    fallback: Option<FallbackFn>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_STORED_MESSAGES)
    }

    /// Capacity is itself capped at [`MAX_STORED_MESSAGES`]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.clamp(1, MAX_STORED_MESSAGES),
            fallback: None,
        }
    }

    /// Install a fallback history provider
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(usize) -> Option<String> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Append a message, dropping the oldest when full
    pub fn push(&mut self, message: ConversationMessage) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    pub fn last_of(&self, role: Role) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSource for ConversationStore {
    fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn get_context(&self, max_messages: usize) -> Option<String> {
        if self.messages.is_empty() || max_messages == 0 {
            return None;
        }
        let skip = self.messages.len().saturating_sub(max_messages);
        Some(format_transcript(self.messages.iter().skip(skip)))
    }

    fn fallback_context(&self, max_messages: usize) -> Option<String> {
        self.fallback.as_ref().and_then(|f| f(max_messages))
    }
}

/// Format messages as alternating `User: …` / `Agent: …` lines
pub fn format_transcript<'a>(messages: impl IntoIterator<Item = &'a ConversationMessage>) -> String {
    messages
        .into_iter()
        .map(ConversationMessage::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}
