//! Shared types for the companion engine.
//!
//! Conversation messages, task purposes, stream session tokens and the
//! events the engine produces for its host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;

use crate::scoring::KpiSnapshot;

/// Who sent a message in the observed conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Prefix used when formatting a transcript line
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Agent",
        }
    }
}

/// A single message of the observed conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, Utc::now())
    }

    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Format as a transcript line (`User: …` / `Agent: …`)
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.label(), self.content.trim())
    }
}

/// What a companion task is for. Drives context window sizing and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Analysis,
    Summary,
    Title,
    General,
}

impl Purpose {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Summary => "summary",
            Self::Title => "title",
            Self::General => "general",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Analysis, Self::Summary, Self::Title, Self::General]
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" => Ok(Self::Analysis),
            "summary" => Ok(Self::Summary),
            "title" => Ok(Self::Title),
            "general" | "chat" => Ok(Self::General),
            other => Err(format!("unknown purpose '{}'", other)),
        }
    }
}

/// Identifies one stream session. Stale tokens are ignored by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Where a failure happened, for the host's error banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configure,
    Request,
    Stream,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Request => "request",
            Self::Stream => "stream",
        }
    }
}

/// User-visible failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub stage: Stage,
    pub message: String,
}

/// Everything the engine tells its host about.
#[derive(Debug, Clone)]
pub enum CompanionEvent {
    /// Accumulated text of the active stream changed
    ContentUpdated { token: SessionToken, text: String },
    /// A stream session was finalized with its full text
    Finalized { token: SessionToken, text: String },
    /// Cosmetic "still working" notice while no delta has arrived yet
    Progress {
        token: SessionToken,
        notice: String,
        elapsed_secs: u64,
    },
    /// A turn was scored
    Kpi(Box<KpiSnapshot>),
    /// A turn could not be scored; displayed KPI values are unchanged
    NotScored { turn: usize, reason: String },
    Error(ErrorEvent),
}

/// Outbound event channel. A disconnected sink silently drops events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<CompanionEvent>>,
}

impl EventSink {
    /// Create a sink together with the receiver the host reads from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CompanionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: CompanionEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn error(&self, stage: Stage, message: impl Into<String>) {
        self.emit(CompanionEvent::Error(ErrorEvent {
            stage,
            message: message.into(),
        }));
    }
}
