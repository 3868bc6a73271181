//! Chat service
//!
//! The produced interface of the core: takes a text message or a voice
//! transcript, routes it through the command dispatcher, wraps the resolved
//! data in a conversational reply via the LLM, and records the turn.
//! A persistence or generation failure degrades the reply, it never fails
//! the request; only programming errors surface as errors here.

use crate::dispatch::CommandDispatcher;
use crate::error::AssistantError;
use crate::gemini::GeminiClient;
use crate::market::MarketDataGateway;
use crate::models::{
    ClientMeta, HandlerResult, Message, MessageKind, QuoteRecord, VoiceMetadata,
};
use crate::sessions::{build_store, HistoryOptions, HistoryPage, SessionStore};
use crate::voice::{self, Intent, IntentType};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_MESSAGE_LEN: usize = 2000;
/// Recent turns handed to the LLM as conversational context
const HISTORY_CONTEXT_MESSAGES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_data: Option<QuoteRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
    pub suggestions: Vec<String>,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceReply {
    pub response: String,
    pub intent: IntentType,
    pub intent_data: serde_json::Value,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_data: Option<QuoteRecord>,
    pub session_id: Uuid,
}

/// Recognition metadata forwarded by the voice UI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceInputMeta {
    pub confidence: Option<f32>,
    pub language: Option<String>,
}

pub struct ChatService {
    dispatcher: CommandDispatcher,
    store: Arc<dyn SessionStore>,
    llm: GeminiClient,
}

impl ChatService {
    pub fn new(
        dispatcher: CommandDispatcher,
        store: Arc<dyn SessionStore>,
        llm: GeminiClient,
    ) -> Self {
        Self {
            dispatcher,
            store,
            llm,
        }
    }

    /// Wire up the whole core from environment configuration
    pub fn from_env() -> Result<Self> {
        let gateway = Arc::new(MarketDataGateway::from_env()?);
        Ok(Self::new(
            CommandDispatcher::new(gateway),
            build_store(),
            GeminiClient::from_env(),
        ))
    }

    /// Handle one chat turn: dispatch, compose, persist, reply
    pub async fn chat(
        &self,
        message: &str,
        user_id: Uuid,
        session_id: Uuid,
        user_email: &str,
        meta: &ClientMeta,
    ) -> Result<ChatReply> {
        let text = validate_message(message)?;

        let history = self.recent_history(user_id, session_id).await;
        let handled = self.dispatcher.dispatch(text).await?;
        let response = self.compose_reply(text, &handled, &history).await;

        let user_msg = Message::user(text, MessageKind::Text);
        let assistant_msg = Message::assistant(response.clone(), MessageKind::Text)
            .with_stock_data(handled.stock_data.clone())
            .with_additional_data(handled.additional_data.clone());

        self.persist_turn(user_id, session_id, user_email, user_msg, assistant_msg, meta)
            .await;

        let suggestions = suggestions_for(&handled);
        Ok(ChatReply {
            response,
            stock_data: handled.stock_data,
            additional_data: handled.additional_data,
            suggestions,
            session_id,
        })
    }

    /// Handle one voice turn. Navigation and action intents answer with a
    /// short confirmation for the UI; everything else flows through the same
    /// command dispatcher as typed chat.
    pub async fn voice(
        &self,
        transcript: &str,
        user_id: Uuid,
        session_id: Uuid,
        user_email: &str,
        voice_meta: &VoiceInputMeta,
        meta: &ClientMeta,
    ) -> Result<VoiceReply> {
        let text = validate_message(transcript)?;

        let intent = voice::classify(text, None);
        info!(intent = ?intent.intent_type, confidence = intent.confidence, "voice intent");

        let (response, stock_data, additional_data) = match intent.intent_type {
            IntentType::Navigate => (navigation_response(&intent), None, None),
            IntentType::Action => (action_response(&intent), None, None),
            _ => {
                let history = self.recent_history(user_id, session_id).await;
                let handled = self.dispatcher.dispatch(text).await?;
                let response = self.compose_reply(text, &handled, &history).await;
                (response, handled.stock_data, handled.additional_data)
            }
        };

        let voice_metadata = VoiceMetadata {
            is_voice_input: true,
            confidence: voice_meta.confidence.unwrap_or(intent.confidence),
            language: voice_meta.language.clone(),
        };

        let user_msg =
            Message::user(text, MessageKind::VoiceInput).with_voice_metadata(voice_metadata);
        let assistant_msg = Message::assistant(response.clone(), MessageKind::VoiceResponse)
            .with_stock_data(stock_data.clone())
            .with_additional_data(additional_data);

        self.persist_turn(user_id, session_id, user_email, user_msg, assistant_msg, meta)
            .await;

        Ok(VoiceReply {
            response,
            intent: intent.intent_type,
            intent_data: intent.data,
            confidence: intent.confidence,
            stock_data,
            session_id,
        })
    }

    pub async fn history(&self, user_id: Uuid, opts: &HistoryOptions) -> Result<HistoryPage> {
        self.store.get_history(user_id, opts).await
    }

    pub async fn end_session(&self, user_id: Uuid, session_id: Uuid) -> Result<()> {
        self.store.end_session(user_id, session_id).await
    }

    /// Most recent turns of this session, or nothing if the read fails.
    /// A history miss only costs context, never the request.
    async fn recent_history(&self, user_id: Uuid, session_id: Uuid) -> Vec<Message> {
        let opts = HistoryOptions {
            session_id: Some(session_id),
            page: 1,
            limit: 1,
            include_messages: true,
            message_limit: Some(HISTORY_CONTEXT_MESSAGES),
        };

        match self.store.get_history(user_id, &opts).await {
            Ok(page) => page
                .sessions
                .into_iter()
                .next()
                .map(|s| s.messages)
                .unwrap_or_default(),
            Err(error) => {
                warn!("History load failed, continuing without context: {}", error);
                Vec::new()
            }
        }
    }

    /// Let the LLM phrase the reply around the resolved data; fall back to
    /// the handler narrative, then to canned keyword replies, when it can't.
    async fn compose_reply(
        &self,
        text: &str,
        handled: &HandlerResult,
        history: &[Message],
    ) -> String {
        let mut prompt = String::new();
        if !handled.narrative_context.is_empty() {
            prompt.push_str("Market data context:\n");
            prompt.push_str(&handled.narrative_context);
            prompt.push_str("\n\n");
        }
        prompt.push_str("User message: ");
        prompt.push_str(text);

        match self.llm.generate(&prompt, history).await {
            Ok((answer, confidence)) => {
                info!(confidence, "reply composed by LLM");
                answer
            }
            Err(error) => {
                warn!("LLM generation failed, using degraded reply: {}", error);
                if handled.narrative_context.is_empty() {
                    canned_reply(text).to_string()
                } else {
                    handled.narrative_context.clone()
                }
            }
        }
    }

    /// Persist both messages of the turn. Failure is logged and the reply is
    /// still returned; the gap shows up only on a later history read.
    async fn persist_turn(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        user_email: &str,
        user_msg: Message,
        assistant_msg: Message,
        meta: &ClientMeta,
    ) {
        if let Err(error) = self
            .store
            .append_turn(user_id, session_id, user_email, user_msg, assistant_msg, meta)
            .await
        {
            warn!(
                "Turn persistence failed, reply still returned: {}",
                error
            );
        }
    }
}

fn validate_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AssistantError::InvalidInput("Message is empty".to_string()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(AssistantError::InvalidInput(format!(
            "Message exceeds {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(trimmed)
}

/// Canned topic-aware replies for when the LLM is unavailable and the
/// dispatcher produced no narrative
fn canned_reply(text: &str) -> &'static str {
    let lowered = text.to_lowercase();

    if lowered.contains("buy") || lowered.contains("sell") {
        "Trades are simulated here. Use the trade panel to place a virtual order, \
         and I can pull up a quote for any stock first."
    } else if lowered.contains("price") || lowered.contains("stock") {
        "I can fetch live quotes when you name a stock, for example \
         \"What is the TCS stock price\"."
    } else if lowered.contains("portfolio") {
        "Your virtual holdings are in the Portfolio tab."
    } else {
        "I can look up stock prices, movers, news and comparisons, or explain \
         market terms. What would you like to know?"
    }
}

fn navigation_response(intent: &Intent) -> String {
    match intent.route.as_deref() {
        Some(route) => format!("Opening {}.", route.trim_start_matches('/')),
        None => "Opening the requested page.".to_string(),
    }
}

fn action_response(intent: &Intent) -> String {
    let action = intent.action.as_deref().unwrap_or("that action");
    match &intent.stock_symbol {
        Some(symbol) => format!(
            "Setting up {} for {}. Confirm it in the trade panel; all orders here are simulated.",
            action.replace('_', " "),
            symbol
        ),
        None => format!(
            "I can do {} once you tell me which stock.",
            action.replace('_', " ")
        ),
    }
}

fn suggestions_for(handled: &HandlerResult) -> Vec<String> {
    if handled.stock_data.is_some() {
        return vec![
            "Compare it with another stock".to_string(),
            "Any news about this stock?".to_string(),
            "Show me today's top gainers".to_string(),
        ];
    }

    match handled
        .additional_data
        .as_ref()
        .and_then(|d| d.get("type"))
        .and_then(|t| t.as_str())
    {
        Some("market_movers") => vec![
            "Show me the top losers".to_string(),
            "What is the TCS stock price?".to_string(),
            "Any market news today?".to_string(),
        ],
        Some("news") => vec![
            "What is the TCS stock price?".to_string(),
            "Show me today's top gainers".to_string(),
        ],
        Some("stock_comparison") => vec![
            "Show me news for these stocks".to_string(),
            "What is a P/E ratio?".to_string(),
        ],
        _ => vec![
            "What is the TCS stock price?".to_string(),
            "Show me today's top gainers".to_string(),
            "What is a P/E ratio?".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketDataGateway, MarketProvider};
    use crate::models::{Mover, MoverKind, NewsItem};
    use crate::sessions::{InMemorySessionStore, SessionSnapshot};
    use chrono::Utc;

    struct StubProvider;

    #[async_trait::async_trait]
    impl MarketProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn quote(&self, symbol: &str) -> Result<Option<QuoteRecord>> {
            Ok(Some(QuoteRecord {
                symbol: symbol.to_string(),
                name: format!("{} Ltd", symbol),
                price: 100.0,
                change: 1.0,
                change_percent: 1.0,
                day_low: None,
                day_high: None,
                year_low: None,
                year_high: None,
                market_cap: None,
                pe: None,
                eps: None,
                volume: None,
                sector: None,
                industry: None,
                provider: "stub".to_string(),
                resolved_at: Utc::now(),
            }))
        }

        async fn movers(&self, _kind: MoverKind) -> Result<Vec<Mover>> {
            Ok(vec![])
        }

        async fn news(&self, _symbol: Option<&str>) -> Result<Vec<NewsItem>> {
            Ok(vec![])
        }
    }

    /// Store whose every operation fails, for degradation tests
    struct FailingStore;

    #[async_trait::async_trait]
    impl SessionStore for FailingStore {
        async fn append_turn(
            &self,
            _user_id: Uuid,
            _session_id: Uuid,
            _user_email: &str,
            _user_msg: Message,
            _assistant_msg: Message,
            _meta: &ClientMeta,
        ) -> Result<SessionSnapshot> {
            Err(AssistantError::DatabaseError("db down".to_string()))
        }

        async fn get_history(
            &self,
            _user_id: Uuid,
            _opts: &HistoryOptions,
        ) -> Result<HistoryPage> {
            Err(AssistantError::DatabaseError("db down".to_string()))
        }

        async fn end_session(&self, _user_id: Uuid, _session_id: Uuid) -> Result<()> {
            Err(AssistantError::DatabaseError("db down".to_string()))
        }
    }

    fn service_with_store(store: Arc<dyn SessionStore>) -> ChatService {
        let gateway = Arc::new(MarketDataGateway::new(
            Arc::new(StubProvider),
            Arc::new(StubProvider),
        ));
        // Empty API key: the LLM client fails fast and the narrative path runs
        ChatService::new(
            CommandDispatcher::new(gateway),
            store,
            GeminiClient::new(String::new()),
        )
    }

    fn service() -> ChatService {
        service_with_store(Arc::new(InMemorySessionStore::new()))
    }

    #[tokio::test]
    async fn test_chat_turn_resolves_and_persists() {
        let svc = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        let reply = svc
            .chat(
                "What is TCS stock price",
                user,
                session,
                "t@example.com",
                &ClientMeta::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.stock_data.as_ref().unwrap().symbol, "TCS");
        assert!(reply.response.contains("TCS"));
        assert!(!reply.suggestions.is_empty());

        let history = svc
            .history(user, &HistoryOptions::default())
            .await
            .unwrap();
        assert_eq!(history.sessions.len(), 1);
        assert_eq!(history.sessions[0].messages.len(), 2);
        assert!(history.sessions[0].messages[1].stock_data.is_some());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let svc = service();
        let result = svc
            .chat(
                "   ",
                Uuid::new_v4(),
                Uuid::new_v4(),
                "t@example.com",
                &ClientMeta::default(),
            )
            .await;

        assert!(matches!(result, Err(AssistantError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let svc = service();
        let long = "a".repeat(MAX_MESSAGE_LEN + 1);
        let result = svc
            .chat(
                &long,
                Uuid::new_v4(),
                Uuid::new_v4(),
                "t@example.com",
                &ClientMeta::default(),
            )
            .await;

        assert!(matches!(result, Err(AssistantError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_chat() {
        let svc = service_with_store(Arc::new(FailingStore));

        let reply = svc
            .chat(
                "What is TCS stock price",
                Uuid::new_v4(),
                Uuid::new_v4(),
                "t@example.com",
                &ClientMeta::default(),
            )
            .await
            .unwrap();

        assert!(reply.response.contains("TCS"));
    }

    #[tokio::test]
    async fn test_voice_navigation_short_circuits() {
        let svc = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        let reply = svc
            .voice(
                "go to portfolio",
                user,
                session,
                "t@example.com",
                &VoiceInputMeta::default(),
                &ClientMeta::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.intent, IntentType::Navigate);
        assert_eq!(reply.intent_data, serde_json::json!("/portfolio"));
        assert!(reply.response.contains("portfolio"));

        // Both voice messages landed with voice kinds and metadata
        let history = svc
            .history(user, &HistoryOptions::default())
            .await
            .unwrap();
        let messages = &history.sessions[0].messages;
        assert_eq!(messages[0].kind, MessageKind::VoiceInput);
        assert!(messages[0].voice_metadata.as_ref().unwrap().is_voice_input);
        assert_eq!(messages[1].kind, MessageKind::VoiceResponse);
    }

    #[tokio::test]
    async fn test_voice_stock_query_flows_through_dispatcher() {
        let svc = service();

        let reply = svc
            .voice(
                "what is the share price of reliance",
                Uuid::new_v4(),
                Uuid::new_v4(),
                "t@example.com",
                &VoiceInputMeta::default(),
                &ClientMeta::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.stock_data.as_ref().unwrap().symbol, "RELIANCE");
    }

    #[test]
    fn test_canned_replies_are_topic_aware() {
        assert!(canned_reply("should I buy now").contains("simulated"));
        assert!(canned_reply("any price data").contains("quotes"));
        assert!(canned_reply("where is my portfolio").contains("Portfolio tab"));
        assert!(canned_reply("hello").contains("look up stock prices"));
    }
}
