//! Core data models for the trading assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    VoiceInput,
    VoiceResponse,
}

/// Voice-specific metadata attached to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMetadata {
    pub is_voice_input: bool,
    pub confidence: f32,
    pub language: Option<String>,
}

/// One conversational turn unit. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: MessageSender,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_data: Option<QuoteRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_metadata: Option<VoiceMetadata>,
}

impl Message {
    pub fn user(text: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender: MessageSender::User,
            kind,
            timestamp: Utc::now(),
            stock_data: None,
            additional_data: None,
            voice_metadata: None,
        }
    }

    pub fn assistant(text: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender: MessageSender::Assistant,
            kind,
            timestamp: Utc::now(),
            stock_data: None,
            additional_data: None,
            voice_metadata: None,
        }
    }

    pub fn with_stock_data(mut self, stock_data: Option<QuoteRecord>) -> Self {
        self.stock_data = stock_data;
        self
    }

    pub fn with_additional_data(mut self, additional_data: Option<serde_json::Value>) -> Self {
        self.additional_data = additional_data;
        self
    }

    pub fn with_voice_metadata(mut self, voice_metadata: VoiceMetadata) -> Self {
        self.voice_metadata = Some(voice_metadata);
        self
    }
}

//
// ================= Sessions =================
//

/// Client context captured when a session is created or touched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    pub platform: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub total_messages: u32,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
}

/// An ordered, append-only sequence of messages keyed by (user_id, session_id).
///
/// Invariants: messages are insertion-ordered by timestamp and
/// `metadata.total_messages` always equals `messages.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub user_email: String,
    pub messages: Vec<Message>,
    pub metadata: SessionMetadata,
}

impl ChatSession {
    pub fn new(user_id: Uuid, session_id: Uuid, user_email: &str, meta: &ClientMeta) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            session_id,
            user_email: user_email.to_string(),
            messages: Vec::new(),
            metadata: SessionMetadata {
                started_at: now,
                last_active_at: now,
                total_messages: 0,
                is_active: true,
                ended_at: None,
                platform: meta.platform.clone(),
                user_agent: meta.user_agent.clone(),
            },
        }
    }

    /// Append one message, keeping the count invariant intact.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.metadata.total_messages = self.messages.len() as u32;
        self.metadata.last_active_at = Utc::now();
    }
}

//
// ================= Market Data =================
//

/// Normalized market snapshot. Ephemeral, never persisted on its own;
/// only ever attached to a message's `stock_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub year_low: Option<f64>,
    pub year_high: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe: Option<f64>,
    pub eps: Option<f64>,
    pub volume: Option<u64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub provider: String,
    pub resolved_at: DateTime<Utc>,
}

impl QuoteRecord {
    /// A record is usable when it carries a symbol and a finite positive price.
    pub fn is_well_formed(&self) -> bool {
        !self.symbol.is_empty() && self.price.is_finite() && self.price > 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoverKind {
    Gainers,
    Losers,
}

impl MoverKind {
    pub fn label(&self) -> &'static str {
        match self {
            MoverKind::Gainers => "gainers",
            MoverKind::Losers => "losers",
        }
    }
}

/// A stock appearing in a top-gainers/top-losers list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

//
// ================= Dispatch =================
//

/// Output of a dispatched command handler.
///
/// A handler that cannot resolve its subject still returns Ok with an
/// explanatory `narrative_context` and empty data fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerResult {
    pub narrative_context: String,
    pub stock_data: Option<QuoteRecord>,
    pub additional_data: Option<serde_json::Value>,
}

impl HandlerResult {
    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            narrative_context: text.into(),
            stock_data: None,
            additional_data: None,
        }
    }
}
