//! Companion Engine
//!
//! Ties the pieces together for one hosting session:
//! - observed messages drive the efficiency timer and the scorer
//! - companion requests are sized by the context selector, sent through a
//!   provider adapter and streamed into the aggregator
//!
//! All mutable state (KPI, timing, analysis cache, active stream) is owned by
//! one engine instance; independent instances share nothing.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::context::{select, ContextWindow, ConversationSource, ConversationStore};
use crate::error::{CompanionError, Result};
use crate::llm::{prompts, CompletionClient, CredentialSupplier, DecodedChunk, ProviderRegistry, StreamDecoder};
use crate::progress::ProgressNotices;
use crate::scoring::{HeuristicScorer, KpiScore, KpiSnapshot, ScoreOutcome};
use crate::stream::StreamingAggregator;
use crate::timing::{EfficiencyScore, EfficiencyTimer, TimingRecord};
use crate::types::{CompanionEvent, ConversationMessage, EventSink, Purpose, Role, SessionToken};

/// Result of analysing one assistant reply
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Scored(Box<KpiSnapshot>),
    /// KPI values were left unchanged
    NotScored { turn: usize, reason: String },
}

impl AnalysisOutcome {
    pub fn turn(&self) -> usize {
        match self {
            Self::Scored(snapshot) => snapshot.turn,
            Self::NotScored { turn, .. } => *turn,
        }
    }
}

/// A cached analysis: the exact context it was scored against and the result
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub turn: usize,
    /// Verbatim context window, None when no conversation was available
    pub context_text: Option<String>,
    pub outcome: AnalysisOutcome,
}

impl AnalysisRecord {
    /// Details view: the scored context followed by the breakdown
    pub fn render(&self) -> String {
        let context = self
            .context_text
            .as_deref()
            .unwrap_or("(no conversation available)");
        match &self.outcome {
            AnalysisOutcome::Scored(snapshot) => {
                format!("{}\nContext scored:\n{}\n", snapshot.render_details(), context)
            }
            AnalysisOutcome::NotScored { turn, reason } => {
                format!("Turn {} not scored: {}\nContext:\n{}\n", turn, reason, context)
            }
        }
    }
}

pub struct CompanionEngine<S: ConversationSource> {
    session_id: Uuid,
    config: Config,
    source: S,
    registry: ProviderRegistry,
    credentials: Box<dyn CredentialSupplier>,
    client: CompletionClient,
    aggregator: StreamingAggregator,
    timer: EfficiencyTimer,
    scorer: HeuristicScorer,
    kpi: KpiScore,
    analyses: Vec<AnalysisRecord>,
    turns: usize,
    sink: EventSink,
}

impl<S: ConversationSource> CompanionEngine<S> {
    pub fn new(
        config: Config,
        source: S,
        credentials: impl CredentialSupplier + 'static,
        sink: EventSink,
    ) -> Result<Self> {
        let session_id = Uuid::new_v4();
        tracing::debug!(%session_id, provider = %config.active_provider, "companion engine created");

        Ok(Self {
            session_id,
            timer: EfficiencyTimer::new(config.timing.clone()),
            scorer: HeuristicScorer::new()?,
            aggregator: StreamingAggregator::new(sink.clone()),
            registry: ProviderRegistry::with_defaults(),
            credentials: Box::new(credentials),
            client: CompletionClient::new(),
            kpi: KpiScore::default(),
            analyses: Vec::new(),
            turns: 0,
            config,
            source,
            sink,
        })
    }

    /// Replace the adapter registry (custom backends)
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_client(mut self, client: CompletionClient) -> Self {
        self.client = client;
        self
    }

    /// A message was appended to the observed conversation.
    ///
    /// User messages start the response clock. Assistant messages stop it and
    /// are scored; the source must already contain the message.
    pub fn on_message(&mut self, message: &ConversationMessage) -> Option<AnalysisOutcome> {
        match message.role {
            Role::User => {
                self.timer.user_message_at(message.timestamp);
                None
            }
            Role::Assistant => {
                self.timer.assistant_finalized_at(message.timestamp);
                Some(self.analyze_at(&message.content, message.timestamp))
            }
        }
    }

    /// Score a finalized assistant reply against the analysis context window
    pub fn analyze(&mut self, assistant_message: &str) -> AnalysisOutcome {
        self.analyze_at(assistant_message, Utc::now())
    }

    /// As [`Self::analyze`], with efficiency evaluated as of `now`
    pub fn analyze_at(&mut self, assistant_message: &str, now: DateTime<Utc>) -> AnalysisOutcome {
        self.turns += 1;
        let turn = self.turns;

        let window = self.window(Purpose::Analysis);
        let context_text = window.text().map(str::to_string);

        let outcome = match self
            .scorer
            .analyze(assistant_message, context_text.as_deref().unwrap_or_default())
        {
            ScoreOutcome::Scored(delta) => {
                let previous_average = self.kpi.average();
                let efficiency = self.timer.score_at(now);
                self.kpi.apply(
                    &delta,
                    efficiency.as_ref().map(|e| e.value),
                    self.config.scoring.trend_threshold,
                );

                let snapshot = KpiSnapshot {
                    turn,
                    score: self.kpi.clone(),
                    previous_average,
                    breakdown: delta.breakdown,
                    efficiency,
                };
                tracing::info!(
                    turn,
                    average = snapshot.score.average(),
                    trend = ?snapshot.score.trend,
                    "assistant reply scored"
                );
                self.sink.emit(CompanionEvent::Kpi(Box::new(snapshot.clone())));
                AnalysisOutcome::Scored(Box::new(snapshot))
            }
            ScoreOutcome::NoData { reason } => {
                tracing::warn!(turn, "turn not scored: {}", reason);
                self.sink.emit(CompanionEvent::NotScored {
                    turn,
                    reason: reason.clone(),
                });
                AnalysisOutcome::NotScored { turn, reason }
            }
        };

        self.analyses.push(AnalysisRecord {
            turn,
            context_text,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Context window for `purpose` at the current conversation size
    pub fn window(&self, purpose: Purpose) -> ContextWindow {
        let max_messages = select(purpose, self.source.message_count());
        self.source.context_window(max_messages)
    }

    /// Run a companion request and stream the reply into the aggregator.
    ///
    /// `provider_id` defaults to the configured active provider. Any failure
    /// aborts the stream and is reported once as an error event.
    pub async fn run(
        &mut self,
        purpose: Purpose,
        provider_id: Option<&str>,
        instruction: Option<&str>,
    ) -> Result<String> {
        let provider_id = provider_id
            .unwrap_or(self.config.active_provider.as_str())
            .to_string();

        let result = self.stream_completion(purpose, &provider_id, instruction).await;
        if let Err(ref e) = result {
            tracing::error!(provider = %provider_id, %purpose, "companion request failed: {}", e);
            self.sink.error(e.stage(), e.to_string());
        }
        result
    }

    async fn stream_completion(
        &mut self,
        purpose: Purpose,
        provider_id: &str,
        instruction: Option<&str>,
    ) -> Result<String> {
        let (adapter, provider_config) = self.registry.resolve(provider_id, &self.config)?;
        let credential = self.credentials.credential(provider_id);

        let max_messages = select(purpose, self.source.message_count());
        let window = self.source.context_window(max_messages);
        let request = prompts::build(purpose, &window, instruction);
        let http_request = adapter.build_request(&request, provider_config, credential.as_deref())?;

        let token = self.aggregator.begin(provider_id, None);
        let mut notices = ProgressNotices::new(&self.config.progress, Instant::now());
        tracing::info!(%token, provider = %provider_id, %purpose, max_messages, "companion request started");

        let open = self.client.open(&http_request);
        tokio::pin!(open);
        let opened = loop {
            match notices.next_deadline() {
                Some(deadline) => tokio::select! {
                    opened = &mut open => break opened,
                    _ = tokio::time::sleep_until(deadline) => {
                        emit_notice(&self.sink, token, &mut notices);
                    }
                },
                None => break (&mut open).await,
            }
        };
        let response = match opened {
            Ok(response) => response,
            Err(e) => {
                self.aggregator.abort(token);
                return Err(e);
            }
        };

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = StreamDecoder::new(adapter);
        loop {
            let next = match notices.next_deadline() {
                Some(deadline) => tokio::select! {
                    next = body.next() => next,
                    _ = tokio::time::sleep_until(deadline) => {
                        emit_notice(&self.sink, token, &mut notices);
                        continue;
                    }
                },
                None => body.next().await,
            };
            let Some(bytes) = next else {
                break;
            };

            let decoded = bytes
                .map_err(CompanionError::Interrupted)
                .and_then(|bytes| decoder.feed(&bytes));
            match decoded {
                Ok(chunk) => apply_chunk(&mut self.aggregator, token, &chunk, &mut notices),
                Err(e) => {
                    self.aggregator.abort(token);
                    return Err(e);
                }
            }
            if decoder.is_done() {
                break;
            }
        }

        match decoder.finish() {
            Ok(chunk) => apply_chunk(&mut self.aggregator, token, &chunk, &mut notices),
            Err(e) => {
                self.aggregator.abort(token);
                return Err(e);
            }
        }
        if !decoder.is_done() {
            tracing::warn!(%token, provider = %provider_id, "stream ended without a terminal marker");
        }

        let text = self.aggregator.end(token, None).unwrap_or_default();
        tracing::info!(%token, chars = text.len(), "companion request finished");
        Ok(text)
    }

    /// Conversation reset: zero the KPI, reset timing, drop cached analyses
    /// and abort any active stream.
    pub fn reset(&mut self) {
        tracing::info!(session_id = %self.session_id, "companion state reset");
        self.kpi = KpiScore::default();
        self.timer.reset();
        self.analyses.clear();
        self.turns = 0;
        self.aggregator.abort_active();
    }

    pub fn kpi(&self) -> &KpiScore {
        &self.kpi
    }

    /// Cached analysis for `turn`
    pub fn details(&self, turn: usize) -> Option<&AnalysisRecord> {
        self.analyses.iter().find(|r| r.turn == turn)
    }

    pub fn analyses(&self) -> &[AnalysisRecord] {
        &self.analyses
    }

    pub fn timing(&self) -> &TimingRecord {
        self.timer.record()
    }

    pub fn efficiency(&self) -> Option<EfficiencyScore> {
        self.timer.score()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn aggregator(&self) -> &StreamingAggregator {
        &self.aggregator
    }
}

impl CompanionEngine<ConversationStore> {
    /// Append to the in-memory store and react to it
    pub fn push_message(&mut self, message: ConversationMessage) -> Option<AnalysisOutcome> {
        self.source.push(message.clone());
        self.on_message(&message)
    }
}

fn emit_notice(sink: &EventSink, token: SessionToken, notices: &mut ProgressNotices) {
    if let Some(notice) = notices.fire() {
        tracing::debug!(%token, elapsed_secs = notice.elapsed_secs, "still waiting on provider");
        sink.emit(CompanionEvent::Progress {
            token,
            notice: notice.message,
            elapsed_secs: notice.elapsed_secs,
        });
    }
}

fn apply_chunk(
    aggregator: &mut StreamingAggregator,
    token: SessionToken,
    chunk: &DecodedChunk,
    notices: &mut ProgressNotices,
) {
    if chunk.deltas.is_empty() {
        return;
    }
    notices.cancel();
    for delta in &chunk.deltas {
        aggregator.append(token, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::error::ProviderError;
    use crate::llm::{ProviderKind, StaticCredentials};
    use crate::types::Stage;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use chrono::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config_with(provider_id: &str, provider: ProviderConfig) -> Config {
        let mut config = Config::default();
        config.providers.insert(provider_id.to_string(), provider);
        config.active_provider = provider_id.to_string();
        config
    }

    fn engine(config: Config) -> (CompanionEngine<ConversationStore>, UnboundedReceiver<CompanionEvent>) {
        let (sink, rx) = EventSink::channel();
        let credentials = StaticCredentials::new()
            .with("openai", "sk-test")
            .with("anthropic", "ak-test");
        let engine = CompanionEngine::new(config, ConversationStore::new(), credentials, sink).unwrap();
        (engine, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<CompanionEvent>) -> Vec<CompanionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn errors(events: &[CompanionEvent]) -> Vec<(Stage, String)> {
        events
            .iter()
            .filter_map(|e| match e {
                CompanionEvent::Error(err) => Some((err.stage, err.message.clone())),
                _ => None,
            })
            .collect()
    }

    fn finalized(events: &[CompanionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                CompanionEvent::Finalized { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    async fn openai_stream(headers: HeaderMap) -> (StatusCode, String) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk-test");
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                r#"{"error":{"message":"invalid api key"}}"#.to_string(),
            );
        }
        let body = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {not json"#,
            r#"data: {"choices":[{"delta":{"content":"lo "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"world!"}}]}"#,
            "data: [DONE]",
        ]
        .join("\n\n");
        (StatusCode::OK, body)
    }

    #[tokio::test]
    async fn test_run_streams_openai_completion() {
        let base = serve(Router::new().route("/chat/completions", post(openai_stream))).await;
        let config = config_with(
            "openai",
            ProviderConfig::new(ProviderKind::OpenAi, "gpt-test").with_endpoint(base),
        );
        let (mut engine, mut rx) = engine(config);

        let text = engine.run(Purpose::Summary, None, None).await.unwrap();
        assert_eq!(text, "Hello world!");

        let events = drain(&mut rx);
        assert!(errors(&events).is_empty());
        assert_eq!(finalized(&events), vec!["Hello world!".to_string()]);
        let updates = events
            .iter()
            .filter(|e| matches!(e, CompanionEvent::ContentUpdated { .. }))
            .count();
        assert_eq!(updates, 3);
        assert!(engine.aggregator().active_token().is_none());
    }

    #[tokio::test]
    async fn test_run_local_ndjson() {
        async fn generate() -> &'static str {
            "{\"response\":\"Chat \",\"done\":false}\n{\"response\":\"title\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n"
        }
        let base = serve(Router::new().route("/api/generate", post(generate))).await;
        let config = config_with(
            "local",
            ProviderConfig::new(ProviderKind::Local, "llama-test").with_endpoint(base),
        );
        let (mut engine, mut rx) = engine(config);

        let text = engine.run(Purpose::Title, Some("local"), None).await.unwrap();
        assert_eq!(text, "Chat title");
        assert!(errors(&drain(&mut rx)).is_empty());
    }

    #[tokio::test]
    async fn test_run_anthropic_sse() {
        async fn messages(headers: HeaderMap) -> (StatusCode, &'static str) {
            if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("ak-test") {
                return (StatusCode::UNAUTHORIZED, "{}");
            }
            (
                StatusCode::OK,
                "event: message_start\ndata: {\"type\":\"message_start\"}\n\n\
                 event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Looks \"}}\n\n\
                 event: ping\ndata: {\"type\":\"ping\"}\n\n\
                 event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"good\"}}\n\n\
                 event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            )
        }
        let base = serve(Router::new().route("/v1/messages", post(messages))).await;
        let config = config_with(
            "anthropic",
            ProviderConfig::new(ProviderKind::Anthropic, "claude-test").with_endpoint(base),
        );
        let (mut engine, _rx) = engine(config);

        let text = engine.run(Purpose::Analysis, None, Some("How is it going?")).await.unwrap();
        assert_eq!(text, "Looks good");
    }

    #[tokio::test]
    async fn test_http_error_reported_once() {
        let base = serve(Router::new().route("/chat/completions", post(openai_stream))).await;
        let mut config = config_with(
            "openai",
            ProviderConfig::new(ProviderKind::OpenAi, "gpt-test").with_endpoint(base),
        );
        config.active_provider = "openai".into();
        let (sink, mut rx) = EventSink::channel();
        let credentials = StaticCredentials::new().with("openai", "wrong-key");
        let mut engine = CompanionEngine::new(config, ConversationStore::new(), credentials, sink).unwrap();

        let err = engine.run(Purpose::General, None, None).await.unwrap_err();
        match err {
            CompanionError::Network(ProviderError { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let events = drain(&mut rx);
        let errors = errors(&events);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, Stage::Request);
        assert!(finalized(&events).is_empty());
        assert!(engine.aggregator().active_token().is_none());
    }

    #[tokio::test]
    async fn test_stream_error_object_aborts() {
        async fn overloaded() -> &'static str {
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\ndata: {\"error\":{\"message\":\"overloaded\"}}\n\n"
        }
        let base = serve(Router::new().route("/chat/completions", post(overloaded))).await;
        let config = config_with(
            "openai",
            ProviderConfig::new(ProviderKind::OpenAi, "gpt-test").with_endpoint(base),
        );
        let (mut engine, mut rx) = engine(config);

        let err = engine.run(Purpose::General, None, None).await.unwrap_err();
        assert!(matches!(err, CompanionError::Network(_)));

        let events = drain(&mut rx);
        assert_eq!(errors(&events).len(), 1);
        assert!(finalized(&events).is_empty());
    }

    #[tokio::test]
    async fn test_body_cut_off_reported_at_stream_stage() {
        async fn cut_off() -> axum::body::Body {
            let parts: Vec<std::result::Result<&'static str, std::io::Error>> = vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
                Err(std::io::Error::other("connection reset")),
            ];
            axum::body::Body::from_stream(futures_util::stream::iter(parts))
        }
        let base = serve(Router::new().route("/chat/completions", post(cut_off))).await;
        let config = config_with(
            "openai",
            ProviderConfig::new(ProviderKind::OpenAi, "gpt-test").with_endpoint(base),
        );
        let (mut engine, mut rx) = engine(config);

        let err = engine.run(Purpose::General, None, None).await.unwrap_err();
        assert!(matches!(err, CompanionError::Interrupted(_)));

        let events = drain(&mut rx);
        let errors = errors(&events);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, Stage::Stream);
        assert!(finalized(&events).is_empty());
        assert!(engine.aggregator().active_token().is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_before_network() {
        let (mut engine, mut rx) = engine(Config::default());
        let err = engine.run(Purpose::General, Some("nope"), None).await.unwrap_err();
        assert!(matches!(err, CompanionError::Configuration(_)));

        let events = drain(&mut rx);
        assert_eq!(errors(&events), vec![(Stage::Configure, err.to_string())]);
        assert!(engine.aggregator().active_token().is_none());
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let (sink, mut rx) = EventSink::channel();
        let mut engine =
            CompanionEngine::new(Config::default(), ConversationStore::new(), StaticCredentials::new(), sink)
                .unwrap();

        let err = engine.run(Purpose::General, Some("openai"), None).await.unwrap_err();
        assert!(matches!(err, CompanionError::Configuration(_)));
        assert_eq!(errors(&drain(&mut rx)).len(), 1);

        // Engine stays usable
        engine.push_message(ConversationMessage::user("still here?"));
        assert_eq!(engine.source().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_notice_before_first_delta() {
        async fn slow() -> &'static str {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            "{\"response\":\"done\",\"done\":true}\n"
        }
        let base = serve(Router::new().route("/api/generate", post(slow))).await;
        let mut config = config_with(
            "local",
            ProviderConfig::new(ProviderKind::Local, "llama-test").with_endpoint(base),
        );
        config.progress.delays_secs = vec![0, 60];
        let (mut engine, mut rx) = engine(config);

        let text = engine.run(Purpose::General, None, None).await.unwrap();
        assert_eq!(text, "done");

        let events = drain(&mut rx);
        let first_progress = events
            .iter()
            .position(|e| matches!(e, CompanionEvent::Progress { .. }))
            .unwrap();
        let first_update = events
            .iter()
            .position(|e| matches!(e, CompanionEvent::ContentUpdated { .. }))
            .unwrap();
        assert!(first_progress < first_update);
        let progress = events
            .iter()
            .filter(|e| matches!(e, CompanionEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 1);
    }

    #[test]
    fn test_exchange_is_timed_and_scored() {
        let (mut engine, mut rx) = engine(Config::default());
        let start = Utc::now();
        assert!(engine
            .push_message(ConversationMessage::at(Role::User, "How do I configure the rust compiler cache?", start))
            .is_none());
        let outcome = engine
            .push_message(ConversationMessage::at(
                Role::Assistant,
                "You can configure the compiler cache for rust builds with sccache.",
                start + Duration::milliseconds(1500),
            ))
            .unwrap();

        let AnalysisOutcome::Scored(snapshot) = outcome else {
            panic!("expected a scored turn");
        };
        assert_eq!(snapshot.turn, 1);
        assert_eq!(snapshot.score.changes, 1);
        assert_eq!(snapshot.score.efficiency, 10.0);
        assert_eq!(engine.kpi(), &snapshot.score);
        assert_eq!(engine.timing().response_time_ms, Some(1500));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, CompanionEvent::Kpi(_))));
    }

    #[test]
    fn test_indented_first_reply_gets_no_tone_bonus() {
        let tone_bonus = |reply: &str| {
            let (mut engine, _rx) = engine(Config::default());
            engine.push_message(ConversationMessage::user("How do I list files?"));
            let AnalysisOutcome::Scored(snapshot) =
                engine.push_message(ConversationMessage::assistant(reply)).unwrap()
            else {
                panic!("expected a scored turn");
            };
            snapshot
                .breakdown
                .accuracy
                .contributions
                .iter()
                .any(|c| c.label.starts_with("tone consistent"))
        };

        assert!(!tone_bonus("I would use ls for that."));
        assert!(!tone_bonus("I would use ls:\n    ls -la\nthat lists everything."));
    }

    #[test]
    fn test_empty_reply_not_scored() {
        let (mut engine, mut rx) = engine(Config::default());
        engine.push_message(ConversationMessage::user("hello?"));
        engine.push_message(ConversationMessage::assistant("Hi! How can I help you today?"));
        let before = engine.kpi().clone();

        let outcome = engine.push_message(ConversationMessage::assistant("   ")).unwrap();
        assert!(matches!(outcome, AnalysisOutcome::NotScored { turn: 2, .. }));
        assert_eq!(engine.kpi(), &before);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CompanionEvent::NotScored { turn: 2, .. })));
        assert!(engine.details(2).unwrap().render().contains("not scored"));
    }

    #[test]
    fn test_context_cached_verbatim() {
        let (mut engine, _rx) = engine(Config::default());
        engine.push_message(ConversationMessage::user("What is a closure?"));
        engine.push_message(ConversationMessage::assistant("A closure is a function that captures its environment."));
        let cached = engine.details(1).unwrap().context_text.clone().unwrap();

        engine.push_message(ConversationMessage::user("And a trait object?"));
        engine.push_message(ConversationMessage::assistant("A trait object enables dynamic dispatch."));

        assert_eq!(engine.details(1).unwrap().context_text.as_deref(), Some(cached.as_str()));
        assert!(!cached.contains("trait object"));
        assert!(engine.details(2).unwrap().context_text.as_deref().unwrap().contains("trait object"));
        assert!(engine.details(1).unwrap().render().contains("What is a closure?"));
    }

    #[test]
    fn test_reset_clears_state() {
        let (mut engine, _rx) = engine(Config::default());
        engine.push_message(ConversationMessage::user("hi"));
        engine.push_message(ConversationMessage::assistant("Hello there, happy to help."));
        assert_eq!(engine.kpi().changes, 1);

        engine.reset();
        assert_eq!(engine.kpi(), &KpiScore::default());
        assert!(engine.analyses().is_empty());
        assert_eq!(engine.timing(), &TimingRecord::default());
        assert!(engine.details(1).is_none());
    }

    #[test]
    fn test_instances_are_independent() {
        let (mut first, _rx1) = engine(Config::default());
        let (second, _rx2) = engine(Config::default());
        first.push_message(ConversationMessage::user("hi"));
        first.push_message(ConversationMessage::assistant("Hello!"));

        assert_eq!(first.kpi().changes, 1);
        assert_eq!(second.kpi().changes, 0);
        assert_ne!(first.session_id(), second.session_id());
    }

    #[test]
    fn test_window_uses_selector() {
        let (mut engine, _rx) = engine(Config::default());
        assert_eq!(engine.window(Purpose::Title), ContextWindow::NoConversation);
        for i in 0..40 {
            engine.source_mut().push(ConversationMessage::user(format!("message {}", i)));
        }
        // title window is capped at 15 for 40 messages
        let window = engine.window(Purpose::Title);
        let lines = window.text().unwrap().lines().count();
        assert_eq!(lines, 15);
    }
}
