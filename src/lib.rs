//! Companion
//!
//! A chat companion engine: streams completions from several LLM backends
//! to comment on an ongoing conversation, and keeps a rolling heuristic
//! quality score (KPI) of the primary agent's replies.
//!
//! Data flow: messages are appended to a [`ConversationSource`]; the context
//! selector sizes a query; a provider adapter builds and decodes the request;
//! the streaming aggregator accumulates deltas; the efficiency timer closes
//! its record; the heuristic scorer turns the reply into a [`KpiSnapshot`].

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod llm;
pub mod progress;
pub mod scoring;
pub mod stream;
pub mod timing;
pub mod types;

pub use config::{Config, ProviderConfig};
pub use context::{select, ContextWindow, ConversationSource, ConversationStore};
pub use engine::{AnalysisOutcome, AnalysisRecord, CompanionEngine};
pub use error::{CompanionError, ProviderError, Result};
pub use llm::{
    CredentialSupplier, EnvCredentials, ProviderAdapter, ProviderKind, ProviderRegistry,
    StaticCredentials,
};
pub use scoring::{HeuristicScorer, KpiScore, KpiSnapshot, ScoreOutcome, Trend};
pub use stream::StreamingAggregator;
pub use timing::{EfficiencyScore, EfficiencyTimer, TimingRecord};
pub use types::{
    CompanionEvent, ConversationMessage, ErrorEvent, EventSink, Purpose, Role, SessionToken, Stage,
};
